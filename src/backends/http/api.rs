use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::utils::AppError;

const CLIENT_USER_AGENT: &str = concat!("media-library-client/", env!("CARGO_PKG_VERSION"));

/// Thin REST client for the media library endpoints
#[derive(Clone)]
pub struct MediaLibraryApi {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for MediaLibraryApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaLibraryApi")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl MediaLibraryApi {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AppError::Configuration(format!("invalid base url {base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Configuration(format!(
                "unsupported scheme in base url: {}",
                parsed.scheme()
            ))
            .into());
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    /// Absolute URL for a path below the API root. Paths keep their trailing slash.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.endpoint(path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder.send().await.map_err(AppError::from)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_detail(&body).unwrap_or(body);
        warn!("{} failed with {}: {}", what, status, message);

        let error = match status {
            StatusCode::NOT_FOUND => AppError::NotFound(what.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT => AppError::Rejected(message),
            _ => AppError::Backend {
                status: status.as_u16(),
                message,
            },
        };
        Err(error.into())
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let bytes = response.bytes().await.map_err(AppError::from)?;
        serde_json::from_slice(&bytes)
            .map_err(AppError::from)
            .with_context(|| format!("Failed to decode {what} response"))
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!("GET {} {:?}", path, query);
        let response = self
            .send(self.request(Method::GET, path).query(query), path)
            .await?;
        Self::decode(response, path).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {}", path);
        let response = self
            .send(self.request(Method::POST, path).json(body), path)
            .await?;
        Self::decode(response, path).await
    }

    /// POST whose response body is irrelevant
    pub async fn post_empty(&self, path: &str) -> Result<()> {
        debug!("POST {}", path);
        self.send(
            self.request(Method::POST, path).json(&serde_json::json!({})),
            path,
        )
        .await?;
        Ok(())
    }

    pub async fn patch_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("PATCH {}", path);
        let response = self
            .send(self.request(Method::PATCH, path).json(body), path)
            .await?;
        Self::decode(response, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        debug!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path), path).await?;
        Ok(())
    }
}

/// REST errors come back as `{"detail": "..."}`
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")
        .and_then(|detail| detail.as_str())
        .map(str::to_string)
}
