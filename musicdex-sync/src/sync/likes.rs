use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use musicdex_core::{LikedSong, MusicdexClient};
use tracing::Instrument;

use super::logger::{LogAction, SyncLogger};
use super::status::SyncStatus;
use super::store::{DownstreamBatch, LikeKind, LikeRecord, SyncStore};
use super::synchronizer::{SyncError, Synchronizer, finish};
use super::timestamp::now_millis;

pub const DEFAULT_PENDING_DELETE_TIMEOUT: Duration = Duration::from_secs(35 * 60);

/// Splits a segment id of the form `{video_id}_{start}`.
pub fn parse_segment_id(item_id: &str) -> Option<(&str, i64)> {
    let (video_id, start) = item_id.rsplit_once('_')?;
    if video_id.is_empty() {
        return None;
    }
    Some((video_id, start.parse().ok()?))
}

pub struct LikesSynchronizer {
    store: SyncStore,
    client: MusicdexClient,
    logger: Arc<SyncLogger>,
    pending_delete_timeout: Duration,
}

impl LikesSynchronizer {
    pub fn new(store: SyncStore, client: MusicdexClient, logger: Arc<SyncLogger>) -> Self {
        Self {
            store,
            client,
            logger,
            pending_delete_timeout: DEFAULT_PENDING_DELETE_TIMEOUT,
        }
    }

    pub fn with_pending_delete_timeout(mut self, timeout: Duration) -> Self {
        self.pending_delete_timeout = timeout;
        self
    }

    async fn run(&self) -> Result<(), SyncError> {
        self.repair_orphans().await?;
        let pushed = self.push_upstream().await?;
        self.reconcile_downstream(&pushed).await
    }

    async fn repair_orphans(&self) -> Result<(), SyncError> {
        self.logger
            .info("Phase 0: checking for orphaned local likes to repair");
        let orphans: Vec<_> = self
            .store
            .likes_by_status(SyncStatus::Dirty)
            .await?
            .into_iter()
            .filter(|like| like.server_id.is_none())
            .collect();
        if orphans.is_empty() {
            return Ok(());
        }
        self.logger
            .info(format!("  found {} orphaned likes", orphans.len()));

        for orphan in orphans {
            match orphan.kind {
                LikeKind::Channel => {
                    self.store
                        .mark_like_synced(&orphan.item_id, Some(&orphan.item_id))
                        .await?;
                    self.logger.log_item_action(
                        LogAction::ReconcileSkip,
                        &orphan.title,
                        Some(&orphan.item_id),
                        Some(&orphan.item_id),
                        Some("Channel like has no server counterpart; marked SYNCED"),
                    );
                }
                LikeKind::Video => {
                    self.store
                        .set_like_server_id(&orphan.item_id, &orphan.item_id)
                        .await?;
                    self.logger.log_item_action(
                        LogAction::ReconcileSkip,
                        &orphan.title,
                        Some(&orphan.item_id),
                        Some(&orphan.item_id),
                        Some("Repaired orphan video id"),
                    );
                }
                LikeKind::Segment => self.repair_segment(&orphan).await?,
            }
        }
        Ok(())
    }

    async fn repair_segment(&self, orphan: &LikeRecord) -> Result<(), SyncError> {
        let Some((video_id, start)) = parse_segment_id(&orphan.item_id) else {
            self.logger.warning(format!(
                "  cannot repair '{}': malformed segment id",
                orphan.item_id
            ));
            return Ok(());
        };
        let playlist = match self.client.get_video_playlist(video_id).await {
            Ok(playlist) => playlist,
            Err(err) if err.is_not_found() => {
                self.logger.warning(format!(
                    "  cannot repair '{}': video {video_id} not found on server",
                    orphan.item_id
                ));
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        match playlist.songs().iter().find(|song| song.start == start) {
            Some(song) => {
                self.store
                    .set_like_server_id(&orphan.item_id, &song.id)
                    .await?;
                self.logger.log_item_action(
                    LogAction::ReconcileSkip,
                    &orphan.title,
                    Some(&orphan.item_id),
                    Some(&song.id),
                    Some("Repaired orphan song id"),
                );
            }
            None => self.logger.warning(format!(
                "  cannot repair '{}': no song starts at {start}s in {video_id}",
                orphan.item_id
            )),
        }
        Ok(())
    }

    /// Returns the item ids added on the server during this run.
    async fn push_upstream(&self) -> Result<HashSet<String>, SyncError> {
        self.logger.info("Phase 1: pushing local changes to server");

        for like in self.store.likes_by_status(SyncStatus::PendingDelete).await? {
            let server_id = match (&like.server_id, like.kind) {
                (Some(server_id), LikeKind::Segment | LikeKind::Video) => server_id.as_str(),
                _ => {
                    self.store
                        .delete_like_in_status(&like.item_id, SyncStatus::PendingDelete)
                        .await?;
                    self.logger.log_item_action(
                        LogAction::UpstreamDeleteSuccess,
                        &like.title,
                        Some(&like.item_id),
                        like.server_id.as_deref(),
                        Some("Not known to server; removed locally"),
                    );
                    continue;
                }
            };
            match self.client.remove_like(server_id).await {
                Ok(()) => self.logger.log_item_action(
                    LogAction::UpstreamDeleteSuccess,
                    &like.title,
                    Some(&like.item_id),
                    Some(server_id),
                    Some("Awaiting server confirmation"),
                ),
                Err(err) if err.is_not_found() => {
                    self.store
                        .delete_like_in_status(&like.item_id, SyncStatus::PendingDelete)
                        .await?;
                    self.logger.log_item_action(
                        LogAction::UpstreamDeleteSuccess,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some("Already absent on server"),
                    );
                }
                Err(err) => {
                    self.logger.log_item_action(
                        LogAction::UpstreamDeleteFailed,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some(&err.to_string()),
                    );
                    return Err(err.into());
                }
            }
        }

        let mut pushed = HashSet::new();
        for like in self.store.likes_by_status(SyncStatus::Dirty).await? {
            let Some(server_id) = like.server_id.as_deref() else {
                self.logger.log_item_action(
                    LogAction::ReconcileSkip,
                    &like.title,
                    Some(&like.item_id),
                    None,
                    Some("No server id yet; left DIRTY"),
                );
                continue;
            };
            match self.client.add_like(server_id).await {
                Ok(()) => {
                    self.store
                        .mark_like_synced(&like.item_id, Some(server_id))
                        .await?;
                    pushed.insert(like.item_id.clone());
                    self.logger.log_item_action(
                        LogAction::UpstreamUpsertSuccess,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        None,
                    );
                }
                Err(err) if err.is_not_found() => {
                    // the song is gone from the server, so this like can never be pushed
                    self.store
                        .delete_like_in_status(&like.item_id, SyncStatus::Dirty)
                        .await?;
                    self.logger.log_item_action(
                        LogAction::DownstreamDeleteLocal,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some("Song no longer exists on server"),
                    );
                }
                Err(err) => {
                    self.logger.log_item_action(
                        LogAction::UpstreamUpsertFailed,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some(&err.to_string()),
                    );
                    return Err(err.into());
                }
            }
        }
        Ok(pushed)
    }

    async fn reconcile_downstream(&self, pushed: &HashSet<String>) -> Result<(), SyncError> {
        self.logger
            .info("Phase 2: fetching server likes and reconciling");
        let remote = self.client.list_likes_all().await?;
        let local = self.store.all_likes().await?;

        let remote_by_id: HashMap<&str, &LikedSong> =
            remote.iter().map(|song| (song.id.as_str(), song)).collect();
        let mut known_server_ids: HashSet<&str> = local
            .iter()
            .filter_map(|like| like.server_id.as_deref())
            .collect();
        let mut known_item_ids: HashSet<String> =
            local.iter().map(|like| like.item_id.clone()).collect();

        let now = now_millis();
        let timeout_ms = self.pending_delete_timeout.as_millis() as i64;
        let mut batch = DownstreamBatch::default();

        for song in &remote {
            let item_id = song.segment_id();
            if known_server_ids.contains(song.id.as_str()) || known_item_ids.contains(&item_id) {
                continue;
            }
            self.logger.log_item_action(
                LogAction::DownstreamInsertLocal,
                &song.name,
                Some(&item_id),
                Some(&song.id),
                None,
            );
            known_server_ids.insert(song.id.as_str());
            known_item_ids.insert(item_id.clone());
            batch.insert.push(remote_like(song, item_id, now));
        }

        for like in &local {
            let Some(server_id) = like.server_id.as_deref() else {
                continue;
            };
            let listed = remote_by_id.get(server_id).copied();
            let on_server = listed.is_some();
            match like.sync_status {
                SyncStatus::Synced if on_server => {
                    if let Some(song) = listed.filter(|song| metadata_changed(like, song)) {
                        self.logger.log_item_action(
                            LogAction::DownstreamUpdateLocal,
                            &song.name,
                            Some(&like.item_id),
                            Some(server_id),
                            Some("Song details changed on server"),
                        );
                        batch
                            .update
                            .push(remote_like(song, like.item_id.clone(), now));
                    }
                }
                SyncStatus::Synced if !on_server && like.kind == LikeKind::Segment => {
                    if pushed.contains(&like.item_id) {
                        self.logger.log_item_action(
                            LogAction::ReconcileSkip,
                            &like.title,
                            Some(&like.item_id),
                            Some(server_id),
                            Some("Added this run; not listed by server yet"),
                        );
                        continue;
                    }
                    self.logger.log_item_action(
                        LogAction::DownstreamDeleteLocal,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some("Removed on server"),
                    );
                    batch.delete.push(like.item_id.clone());
                }
                SyncStatus::PendingDelete if !on_server => {
                    self.logger.log_item_action(
                        LogAction::DownstreamDeleteLocal,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some("Pending delete confirmed by server"),
                    );
                    batch.delete.push(like.item_id.clone());
                }
                SyncStatus::PendingDelete if now - like.last_modified_at > timeout_ms => {
                    self.logger.log_item_action(
                        LogAction::ReconcileSkip,
                        &like.title,
                        Some(&like.item_id),
                        Some(server_id),
                        Some("Pending delete timed out. Reverted to SYNCED"),
                    );
                    batch.revert_to_synced.push(like.item_id.clone());
                }
                _ => {}
            }
        }

        self.logger.info(format!(
            "  {} inserted, {} updated, {} deleted, {} reverted",
            batch.insert.len(),
            batch.update.len(),
            batch.delete.len(),
            batch.revert_to_synced.len()
        ));
        self.store.apply_like_batch(&batch).await?;
        Ok(())
    }
}

fn metadata_changed(like: &LikeRecord, song: &LikedSong) -> bool {
    like.title != song.name || like.artist != song.original_artist || like.art_url != song.art
}

fn remote_like(song: &LikedSong, item_id: String, now: i64) -> LikeRecord {
    LikeRecord {
        item_id,
        server_id: Some(song.id.clone()),
        kind: LikeKind::Segment,
        title: song.name.clone(),
        artist: song.original_artist.clone(),
        video_id: Some(song.video_id.clone()),
        start_secs: Some(song.start),
        end_secs: Some(song.end),
        art_url: song.art.clone(),
        sync_status: SyncStatus::Synced,
        last_modified_at: now,
    }
}

#[async_trait]
impl Synchronizer for LikesSynchronizer {
    fn name(&self) -> &'static str {
        "LIKES"
    }

    async fn synchronize(&self) -> bool {
        self.logger.start_section(self.name());
        let outcome = self
            .run()
            .instrument(tracing::info_span!("sync", family = self.name()))
            .await;
        finish(&self.logger, self.name(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::store::LikeInput;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer) -> (SyncStore, Arc<SyncLogger>, LikesSynchronizer) {
        let client = MusicdexClient::with_base_url(&server.uri(), "test-token").unwrap();
        let store = SyncStore::memory().await;
        let logger = Arc::new(SyncLogger::new());
        let sync = LikesSynchronizer::new(store.clone(), client, Arc::clone(&logger));
        (store, logger, sync)
    }

    fn like_input(item_id: &str, kind: LikeKind) -> LikeInput {
        let segment = parse_segment_id(item_id);
        LikeInput {
            item_id: item_id.into(),
            kind,
            title: format!("Like {item_id}"),
            artist: None,
            video_id: segment.map(|(video, _)| video.to_string()),
            start_secs: segment.map(|(_, start)| start),
            end_secs: None,
            art_url: None,
        }
    }

    fn liked(id: &str, video_id: &str, start: i64) -> serde_json::Value {
        json!({
            "id": id,
            "channel_id": "UC1",
            "video_id": video_id,
            "name": format!("Song {id}"),
            "start": start,
            "end": start + 100
        })
    }

    async fn mount_likes(server: &MockServer, content: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page_count": 1,
                "content": content
            })))
            .mount(server)
            .await;
    }

    async fn synced_like(store: &SyncStore, item_id: &str, server_id: &str) {
        store
            .add_like(&like_input(item_id, LikeKind::Segment))
            .await
            .unwrap();
        store.mark_like_synced(item_id, Some(server_id)).await.unwrap();
    }

    async fn age_like(store: &SyncStore, item_id: &str, age: Duration) {
        sqlx::query("UPDATE likes SET last_modified_at = ?2 WHERE item_id = ?1")
            .bind(item_id)
            .bind(now_millis() - age.as_millis() as i64)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[test]
    fn parses_segment_ids() {
        assert_eq!(parse_segment_id("abc123_30"), Some(("abc123", 30)));
        assert_eq!(parse_segment_id("with_under_score_7"), Some(("with_under_score", 7)));
        assert_eq!(parse_segment_id("abc123"), None);
        assert_eq!(parse_segment_id("abc_x"), None);
        assert_eq!(parse_segment_id("_5"), None);
    }

    #[tokio::test]
    async fn orphan_segment_is_repaired_and_pushed() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        store
            .add_like(&like_input("abc123_30", LikeKind::Segment))
            .await
            .unwrap();

        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/playlist/:video[id=abc123]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ":video[id=abc123]",
                "title": "Karaoke",
                "content": [
                    { "id": "song-0", "name": "Intro", "video_id": "abc123", "start": 0, "end": 30 },
                    { "id": "song-30", "name": "First", "video_id": "abc123", "start": 30, "end": 250 }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/musicdex/like"))
            .and(body_json(json!({ "song_id": "song-30" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        mount_likes(&server, vec![]).await;

        assert!(sync.synchronize().await);

        let like = store.get_like("abc123_30").await.unwrap().unwrap();
        assert_eq!(like.sync_status, SyncStatus::Synced);
        assert_eq!(like.server_id.as_deref(), Some("song-30"));
        assert_eq!(
            logger.actions_for("Like abc123_30"),
            vec![
                LogAction::ReconcileSkip,
                LogAction::UpstreamUpsertSuccess,
                LogAction::ReconcileSkip,
            ]
        );
    }

    #[tokio::test]
    async fn channel_orphan_becomes_synced_without_push() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        store
            .add_like(&like_input("UCchannel", LikeKind::Channel))
            .await
            .unwrap();
        Mock::given(method("POST"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_likes(&server, vec![]).await;

        assert!(sync.synchronize().await);

        let like = store.get_like("UCchannel").await.unwrap().unwrap();
        assert_eq!(like.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn unresolvable_orphan_stays_dirty() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        store
            .add_like(&like_input("gone_45", LikeKind::Segment))
            .await
            .unwrap();
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/playlist/:video[id=gone]"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        mount_likes(&server, vec![]).await;

        assert!(sync.synchronize().await);

        let like = store.get_like("gone_45").await.unwrap().unwrap();
        assert_eq!(like.sync_status, SyncStatus::Dirty);
        assert_eq!(like.server_id, None);
        assert!(logger
            .entries()
            .iter()
            .any(|entry| matches!(entry, crate::sync::logger::SyncLogEntry::Warning(_))));
    }

    #[tokio::test]
    async fn failed_push_keeps_dirty_payload_and_skips_downstream() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        store
            .add_like(&like_input("vid_10", LikeKind::Segment))
            .await
            .unwrap();
        store.set_like_server_id("vid_10", "song-10").await.unwrap();
        let before = store.get_like("vid_10").await.unwrap().unwrap();

        Mock::given(method("POST"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page_count": 1,
                "content": []
            })))
            .expect(0)
            .mount(&server)
            .await;

        assert!(!sync.synchronize().await);

        let after = store.get_like("vid_10").await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(
            logger.actions_for("Like vid_10"),
            vec![LogAction::UpstreamUpsertFailed]
        );
        assert!(matches!(
            logger.entries().last(),
            Some(crate::sync::logger::SyncLogEntry::SectionEnd { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn like_for_song_deleted_on_server_is_dropped_and_downstream_runs() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        store
            .add_like(&like_input("gone_7", LikeKind::Segment))
            .await
            .unwrap();
        store.set_like_server_id("gone_7", "song-gone").await.unwrap();

        Mock::given(method("POST"))
            .and(path("/api/v2/musicdex/like"))
            .and(body_json(json!({ "song_id": "song-gone" })))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        mount_likes(&server, vec![liked("song-new", "new", 3)]).await;

        assert!(sync.synchronize().await);

        assert!(store.get_like("gone_7").await.unwrap().is_none());
        assert_eq!(
            logger.actions_for("Like gone_7"),
            vec![LogAction::DownstreamDeleteLocal]
        );
        let fresh = store.get_like("new_3").await.unwrap().unwrap();
        assert_eq!(fresh.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn synced_like_picks_up_renamed_song() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced_like(&store, "ren_4", "song-ren").await;
        mount_likes(&server, vec![liked("song-ren", "ren", 4)]).await;

        assert!(sync.synchronize().await);

        let renamed = store.get_like("ren_4").await.unwrap().unwrap();
        assert_eq!(renamed.title, "Song song-ren");
        assert_eq!(renamed.sync_status, SyncStatus::Synced);
        assert_eq!(
            logger.actions_for("Song song-ren"),
            vec![LogAction::DownstreamUpdateLocal]
        );
    }

    #[tokio::test]
    async fn pending_delete_still_on_server_reverts_after_timeout() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        synced_like(&store, "old_5", "song-old").await;
        synced_like(&store, "new_6", "song-new").await;
        store.remove_like("old_5").await.unwrap();
        store.remove_like("new_6").await.unwrap();
        age_like(&store, "old_5", Duration::from_secs(36 * 60)).await;
        age_like(&store, "new_6", Duration::from_secs(10 * 60)).await;

        Mock::given(method("DELETE"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;
        mount_likes(
            &server,
            vec![liked("song-old", "old", 5), liked("song-new", "new", 6)],
        )
        .await;

        assert!(sync.synchronize().await);

        let old = store.get_like("old_5").await.unwrap().unwrap();
        assert_eq!(old.sync_status, SyncStatus::Synced);
        let new = store.get_like("new_6").await.unwrap().unwrap();
        assert_eq!(new.sync_status, SyncStatus::PendingDelete);
    }

    #[tokio::test]
    async fn pending_delete_is_never_reinserted_and_confirmed_when_absent() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced_like(&store, "keep_1", "song-keep").await;
        synced_like(&store, "drop_2", "song-drop").await;
        store.remove_like("keep_1").await.unwrap();
        store.remove_like("drop_2").await.unwrap();

        Mock::given(method("DELETE"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        mount_likes(&server, vec![liked("song-keep", "keep", 1)]).await;

        assert!(sync.synchronize().await);

        let keep = store.get_like("keep_1").await.unwrap().unwrap();
        assert_eq!(keep.sync_status, SyncStatus::PendingDelete);
        assert!(store.get_like("drop_2").await.unwrap().is_none());
        assert!(
            !logger
                .item_actions()
                .iter()
                .any(|entry| entry.action == LogAction::DownstreamInsertLocal)
        );
    }

    #[tokio::test]
    async fn not_found_on_delete_removes_row_immediately() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        synced_like(&store, "x_1", "song-x").await;
        store.remove_like("x_1").await.unwrap();

        Mock::given(method("DELETE"))
            .and(path("/api/v2/musicdex/like"))
            .and(body_json(json!({ "song_id": "song-x" })))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        mount_likes(&server, vec![]).await;

        assert!(sync.synchronize().await);
        assert!(store.get_like("x_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn downstream_inserts_new_and_drops_removed_segments() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        synced_like(&store, "stale_3", "song-stale").await;
        store
            .add_like(&like_input("vidonly", LikeKind::Video))
            .await
            .unwrap();
        store.set_like_server_id("vidonly", "vidonly").await.unwrap();
        store.mark_like_synced("vidonly", None).await.unwrap();
        mount_likes(&server, vec![liked("song-fresh", "fresh", 12)]).await;

        assert!(sync.synchronize().await);

        assert!(store.get_like("stale_3").await.unwrap().is_none());
        let fresh = store.get_like("fresh_12").await.unwrap().unwrap();
        assert_eq!(fresh.sync_status, SyncStatus::Synced);
        assert_eq!(fresh.server_id.as_deref(), Some("song-fresh"));
        assert!(store.get_like("vidonly").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn second_run_without_changes_writes_nothing() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced_like(&store, "a_1", "song-a").await;
        mount_likes(
            &server,
            vec![liked("song-a", "a", 1), liked("song-b", "b", 2)],
        )
        .await;

        assert!(sync.synchronize().await);
        let first = store.all_likes().await.unwrap();
        let logged = logger.item_actions().len();

        assert!(sync.synchronize().await);

        assert_eq!(store.all_likes().await.unwrap(), first);
        assert_eq!(logger.item_actions().len(), logged);
    }
}
