mod common;

use anyhow::Result;
use common::{TestContext, episode, movie, progress, show, synced};
use media_library_client::models::*;
use std::time::Duration;

fn watched(mut item: MediaItem) -> MediaItem {
    let mut record = progress(900, 600_000, 600_000);
    record.completed = true;
    item.watch_progress = Some(record);
    item
}

fn resume(position_ms: u64, duration_ms: u64, resume_allowed: Option<bool>) -> ResumeInfo {
    ResumeInfo {
        position_ms,
        duration_ms,
        percentage: None,
        remaining_ms: Some(duration_ms - position_ms),
        completed: false,
        resume_allowed,
    }
}

#[tokio::test(start_paused = true)]
async fn test_metadata_refresh_respects_cooldown() -> Result<()> {
    let ctx = TestContext::new();
    let library = LibraryId::from(5);
    ctx.backend.set_items(5u64, vec![movie(1, 5, "Alien")]);
    let media = &ctx.client.media;

    media.fetch(Some(&library)).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    media.upsert(vec![movie(1, 5, "Alien")]).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 1);

    tokio::time::advance(Duration::from_secs(31)).await;
    media.upsert(vec![movie(1, 5, "Alien")]).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_enriched_items_are_not_refreshed() {
    let ctx = TestContext::new();
    ctx.backend
        .set_items(5u64, vec![synced(movie(1, 5, "Alien")), movie(2, 5, "Brazil")]);

    ctx.client.media.fetch(Some(&LibraryId::from(5))).await;
    ctx.client.media.drain_refreshes().await;

    assert_eq!(ctx.backend.count("refresh_metadata"), 1);
    assert!(ctx.backend.calls().contains(&"refresh_metadata:2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_can_be_retried_immediately() {
    let ctx = TestContext::new();
    ctx.backend.set_items(5u64, vec![movie(1, 5, "Alien")]);
    ctx.backend.fail("refresh_metadata");
    let media = &ctx.client.media;

    media.fetch(Some(&LibraryId::from(5))).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 1);

    ctx.backend.recover("refresh_metadata");
    media.upsert(vec![movie(1, 5, "Alien")]).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_fetch_is_discarded() {
    let ctx = TestContext::new();
    let library = LibraryId::from(5);
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    ctx.backend.delay_next_lists([Duration::from_millis(200)]);

    tokio::join!(media.fetch(Some(&library)), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        ctx.backend.set_items(
            5u64,
            vec![synced(movie(1, 5, "Alien")), synced(movie(2, 5, "Brazil"))],
        );
        media.fetch(Some(&library)).await;
    });

    let cache = media.state().await;
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.total_count(), 2);
    assert!(!cache.is_loading());
}

#[tokio::test]
async fn test_upsert_ignores_other_libraries() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&LibraryId::from(5))).await;

    let mut untagged = MediaItem::new(10);
    untagged.title = Some("Brazil".into());
    let merged = media
        .upsert(vec![synced(movie(9, 6, "Elsewhere")), synced(untagged)])
        .await;

    assert_eq!(merged, vec![MediaItemId::from(10)]);
    let cache = media.state().await;
    assert_eq!(cache.total_count(), 2);
    assert!(cache.item(&MediaItemId::from(9)).is_none());
    assert_eq!(
        cache
            .item(&MediaItemId::from(10))
            .and_then(|i| i.library_id.clone()),
        Some(LibraryId::from(5))
    );
}

#[tokio::test]
async fn test_switching_library_drops_items_even_on_failure() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&LibraryId::from(5))).await;

    ctx.backend.fail("list_items");
    media.fetch(Some(&LibraryId::from(6))).await;

    let cache = media.state().await;
    assert!(cache.is_empty());
    assert_eq!(cache.selected_library(), Some(&LibraryId::from(6)));
    assert!(cache.error().is_some());
    drop(cache);

    media.fetch(None).await;
    let cache = media.state().await;
    assert!(cache.selected_library().is_none());
    assert!(cache.error().is_none());
}

#[tokio::test]
async fn test_refetch_failure_keeps_items() {
    let ctx = TestContext::new();
    let library = LibraryId::from(5);
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&library)).await;

    ctx.backend.fail("list_items");
    media.fetch(Some(&library)).await;

    let cache = media.state().await;
    assert_eq!(cache.len(), 1);
    assert!(cache.error().is_some());
    assert!(!cache.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_open_detail_forces_refresh_and_keeps_item_on_error() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![movie(1, 5, "Alien")]);
    ctx.backend.set_detail(movie(1, 5, "Alien"));
    media.fetch(Some(&LibraryId::from(5))).await;
    media.drain_refreshes().await;
    assert_eq!(ctx.backend.count("refresh_metadata"), 1);

    let item = media.open_detail(&MediaItemId::from(1)).await.unwrap();
    media.drain_refreshes().await;
    assert_eq!(item.title(), "Alien");
    assert_eq!(ctx.backend.count("refresh_metadata"), 2);

    let err = media.open_detail(&MediaItemId::from(2)).await;
    assert!(err.is_err());

    let cache = media.state().await;
    let detail = cache.detail();
    assert_eq!(detail.active_id(), Some(&MediaItemId::from(1)));
    assert!(detail.error.is_some());
    assert!(!detail.loading);
}

#[tokio::test]
async fn test_mark_watched_reloads_item() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&LibraryId::from(5))).await;

    ctx.backend.set_detail(watched(synced(movie(1, 5, "Alien"))));
    media.mark_watched(&MediaItemId::from(1)).await?;

    let calls = ctx.backend.calls();
    assert!(calls.contains(&"mark_watched:1".to_string()));
    assert!(calls.contains(&"get_item:1".to_string()));
    let cache = media.state().await;
    let item = cache.item(&MediaItemId::from(1)).unwrap();
    assert_eq!(item.watch_status(), WatchStatus::Watched);
    Ok(())
}

#[tokio::test]
async fn test_failed_mutation_leaves_cache_untouched() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&LibraryId::from(5))).await;
    ctx.backend.fail("mark_watched");

    assert!(media.mark_watched(&MediaItemId::from(1)).await.is_err());
    assert_eq!(ctx.backend.count("get_item"), 0);
}

#[tokio::test]
async fn test_show_plan_and_handoff() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    let show_id = MediaItemId::from(100);
    ctx.backend.set_items(5u64, vec![show(100, 5, "Lost")]);
    ctx.backend.set_detail(show(100, 5, "Lost"));

    let mut in_progress = episode(102, 100, 1, 2);
    in_progress.watch_progress = Some(progress(7, 60_000, 600_000));
    ctx.backend.set_children(
        100u64,
        vec![
            episode(103, 100, 1, 3),
            in_progress,
            watched(episode(101, 100, 1, 1)),
        ],
    );

    media.fetch(Some(&LibraryId::from(5))).await;
    media.open_detail(&show_id).await?;

    {
        let cache = media.state().await;
        let plan = cache.detail().plan.as_ref().unwrap();
        assert_eq!(
            plan.episode_ids(),
            vec![
                MediaItemId::from(101),
                MediaItemId::from(102),
                MediaItemId::from(103)
            ]
        );
        assert_eq!(plan.resume_episode, Some(MediaItemId::from(102)));
        assert_eq!(plan.next_episode, Some(MediaItemId::from(103)));
    }

    let handoff = media.playlist_for(None).await.unwrap();
    assert_eq!(handoff.current_index(), 1);
    assert_eq!(handoff.item_ids().len(), 3);
    let handoff = media
        .playlist_for(Some(&MediaItemId::from(103)))
        .await
        .unwrap();
    assert_eq!(handoff.current_item(), Some(MediaItemId::from(103)));

    // Finishing the in-progress episode moves the plan forward
    ctx.backend.set_detail(watched(episode(102, 100, 1, 2)));
    ctx.backend.set_children(
        100u64,
        vec![
            episode(103, 100, 1, 3),
            watched(episode(102, 100, 1, 2)),
            watched(episode(101, 100, 1, 1)),
        ],
    );
    media.mark_watched(&MediaItemId::from(102)).await?;

    let cache = media.state().await;
    let plan = cache.detail().plan.as_ref().unwrap();
    assert_eq!(plan.resume_episode, Some(MediaItemId::from(103)));
    assert_eq!(plan.next_episode, None);
    Ok(())
}

#[tokio::test]
async fn test_show_without_episodes_has_no_handoff() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_detail(show(100, 5, "Lost"));

    media.open_detail(&MediaItemId::from(100)).await?;

    let cache = media.state().await;
    assert!(cache.detail().plan.as_ref().is_some_and(PlaybackPlan::is_empty));
    drop(cache);
    assert!(media.playlist_for(None).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_episode_listing_failure_still_opens_show() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_detail(show(100, 5, "Lost"));
    ctx.backend.fail("list_children");

    let item = media.open_detail(&MediaItemId::from(100)).await?;

    assert!(item.is_show());
    let cache = media.state().await;
    assert_eq!(cache.detail().active_id(), Some(&MediaItemId::from(100)));
    assert!(cache.detail().plan.is_none());
    Ok(())
}

#[tokio::test]
async fn test_resume_prompt() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    let id = MediaItemId::from(1);
    let mut item = synced(movie(1, 5, "Alien"));
    item.watch_progress = Some(progress(7, 60_000, 600_000));
    ctx.backend.set_detail(item);
    ctx.backend.set_resume(7u64, resume(60_000, 600_000, Some(true)));

    media.open_detail(&id).await?;
    let prompt = media.prepare_resume(&id).await?;

    assert_eq!(prompt.map(|p| p.position_ms), Some(60_000));
    assert!(media.state().await.detail().resume_prompt.is_some());

    media.dismiss_resume_prompt().await;
    assert!(media.state().await.detail().resume_prompt.is_none());

    ctx.backend.set_resume(7u64, resume(60_000, 600_000, Some(false)));
    assert!(media.prepare_resume(&id).await?.is_none());

    ctx.backend.set_resume(7u64, resume(590_000, 600_000, None));
    assert!(media.prepare_resume(&id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_resume_without_progress_record_skips_backend() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_detail(synced(movie(1, 5, "Alien")));

    media.open_detail(&MediaItemId::from(1)).await?;
    let prompt = media.prepare_resume(&MediaItemId::from(1)).await?;

    assert!(prompt.is_none());
    assert_eq!(ctx.backend.count("resume_info"), 0);
    Ok(())
}

#[tokio::test]
async fn test_record_position_completes_near_end() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, vec![synced(movie(1, 5, "Alien"))]);
    media.fetch(Some(&LibraryId::from(5))).await;

    let progress = media
        .record_position(&MediaItemId::from(1), 590_000, Some(600_000))
        .await
        .unwrap();

    assert!(progress.completed);
    assert_eq!(progress.position_ms, 600_000);
    assert!(
        media
            .record_position(&MediaItemId::from(42), 1_000, None)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_delete_item_closes_detail() -> Result<()> {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(
        5u64,
        vec![synced(movie(1, 5, "Alien")), synced(movie(2, 5, "Brazil"))],
    );
    ctx.backend.set_detail(synced(movie(1, 5, "Alien")));
    media.fetch(Some(&LibraryId::from(5))).await;
    media.open_detail(&MediaItemId::from(1)).await?;

    media.delete_item(&MediaItemId::from(1)).await?;

    let cache = media.state().await;
    assert_eq!(cache.total_count(), 1);
    assert!(cache.item(&MediaItemId::from(1)).is_none());
    assert!(cache.detail().item.is_none());
    Ok(())
}

#[tokio::test]
async fn test_stream_url_passes_file() -> Result<()> {
    let ctx = TestContext::new();

    let stream = ctx
        .client
        .media
        .stream_url(&MediaItemId::from(1), Some(&FileId::from(3)))
        .await?;

    assert_eq!(stream.file_id, FileId::from(3));
    assert!(stream.url.starts_with("http://stream.local/1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_refreshes_are_bounded_in_flight() {
    let ctx = TestContext::new();
    let items: Vec<MediaItem> = (1..=20u64).map(|id| movie(id, 5, "Untitled")).collect();
    ctx.backend.set_items(5u64, items);
    ctx.backend.delay_refreshes(Duration::from_millis(500));

    ctx.client.media.fetch(Some(&LibraryId::from(5))).await;
    ctx.client.media.drain_refreshes().await;

    assert_eq!(ctx.backend.count("refresh_metadata"), 20);
    let limit = ctx.client.config.cache.max_concurrent_refreshes;
    assert!(ctx.backend.peak_refreshes() <= limit);
    assert!(ctx.backend.peak_refreshes() > 1);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_entries_do_not_accumulate() {
    let ctx = TestContext::new();
    let media = &ctx.client.media;
    ctx.backend.set_items(5u64, Vec::new());
    media.fetch(Some(&LibraryId::from(5))).await;

    for batch in 0..5u64 {
        let items: Vec<MediaItem> = (0..100u64)
            .map(|n| movie(batch * 100 + n + 1, 5, "Untitled"))
            .collect();
        media.upsert(items).await;
        media.drain_refreshes().await;
        tokio::time::advance(Duration::from_secs(120)).await;
    }
    assert_eq!(media.cooling_refreshes().await, 100);

    let ids: Vec<MediaItemId> = media.items().await.into_iter().map(|i| i.id).collect();
    media.remove(&ids).await;

    assert!(media.state().await.is_empty());
    assert_eq!(media.cooling_refreshes().await, 0);
}

#[tokio::test]
async fn test_configured_guard_band_drives_resume() -> Result<()> {
    let mut config = media_library_client::Config::default();
    config.playback.resume_guard_band = 0.2;
    let ctx = TestContext::with_config(config);
    let media = &ctx.client.media;

    let mut item = synced(movie(1, 5, "Alien"));
    item.watch_progress = Some(progress(7, 850_000, 1_000_000));
    ctx.backend.set_detail(item.clone());
    ctx.backend.set_resume(7u64, resume(850_000, 1_000_000, Some(true)));

    // 15% remains: enough for the default band, not for the configured one
    assert!(!media.planner().is_resumable(&item));
    media.open_detail(&MediaItemId::from(1)).await?;
    assert!(media.prepare_resume(&MediaItemId::from(1)).await?.is_none());
    Ok(())
}
