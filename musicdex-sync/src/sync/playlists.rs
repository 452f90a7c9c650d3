use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use musicdex_core::{
    FullPlaylist, MusicdexClient, MusicdexError, PlaylistSummary, PlaylistUpsert, Song,
};
use tracing::Instrument;

use super::logger::{LogAction, SyncLogger};
use super::status::SyncStatus;
use super::store::{PlaylistItemInput, PlaylistRecord, SyncStore};
use super::synchronizer::{SyncError, Synchronizer, finish};
use super::timestamp::parse_optional;

/// Multi-phase playlist reconciliation: upstream deletions, upstream upserts, then
/// downstream metadata and content.
///
/// A playlist that was dirty when the run started never has its content replaced in
/// that run, even once the upsert has cleaned it.
pub struct PlaylistSynchronizer {
    store: SyncStore,
    client: MusicdexClient,
    logger: Arc<SyncLogger>,
    user_id: Option<String>,
}

impl PlaylistSynchronizer {
    pub fn new(
        store: SyncStore,
        client: MusicdexClient,
        logger: Arc<SyncLogger>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            store,
            client,
            logger,
            user_id,
        }
    }

    async fn run(&self) -> Result<(), SyncError> {
        let dirty_at_start: HashSet<i64> = self
            .store
            .playlists_by_status(SyncStatus::Dirty)
            .await?
            .iter()
            .map(|playlist| playlist.local_id)
            .collect();

        self.push_deletions().await?;
        self.push_upserts().await?;

        self.logger.info("Phase 3: reconciling playlist metadata");
        let remote = self.client.list_playlists().await?;
        let remote_by_id: HashMap<&str, &PlaylistSummary> = remote
            .iter()
            .map(|summary| (summary.id.as_str(), summary))
            .collect();
        self.reconcile_metadata(&remote, &remote_by_id).await?;

        self.logger.info("Phase 4: reconciling playlist content");
        self.reconcile_content(&remote_by_id, &dirty_at_start).await
    }

    async fn push_deletions(&self) -> Result<(), SyncError> {
        self.logger.info("Phase 1: pushing playlist deletions");
        for playlist in self
            .store
            .playlists_by_status(SyncStatus::PendingDelete)
            .await?
        {
            let local_id = playlist.local_id.to_string();
            let Some(server_id) = playlist.server_id.as_deref() else {
                self.store.delete_playlist_row(playlist.local_id).await?;
                self.logger.log_item_action(
                    LogAction::UpstreamDeleteSuccess,
                    &playlist.title,
                    Some(&local_id),
                    None,
                    Some("Never pushed; removed locally"),
                );
                continue;
            };
            match self.client.delete_playlist(server_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    self.logger.log_item_action(
                        LogAction::UpstreamDeleteFailed,
                        &playlist.title,
                        Some(&local_id),
                        Some(server_id),
                        Some(&err.to_string()),
                    );
                    return Err(err.into());
                }
            }
            self.store.delete_playlist_row(playlist.local_id).await?;
            self.logger.log_item_action(
                LogAction::UpstreamDeleteSuccess,
                &playlist.title,
                Some(&local_id),
                Some(server_id),
                None,
            );
        }
        Ok(())
    }

    async fn push_upserts(&self) -> Result<(), SyncError> {
        self.logger.info("Phase 2: pushing playlist creations and edits");
        let dirty = self.store.playlists_by_status(SyncStatus::Dirty).await?;
        if dirty.is_empty() {
            return Ok(());
        }
        let Some(owner) = self.user_id.as_deref() else {
            self.logger.warning(format!(
                "  no user id; {} dirty playlists left for a later run",
                dirty.len()
            ));
            return Ok(());
        };

        let mut videos = HashMap::new();
        for playlist in dirty {
            let local_id = playlist.local_id.to_string();
            let content = self.upload_content(&playlist, &mut videos).await?;
            let mut request = PlaylistUpsert {
                id: playlist.server_id.clone(),
                owner: owner.to_string(),
                title: playlist.title.clone(),
                description: playlist.description.clone(),
                playlist_type: PlaylistUpsert::USER_PLAYLIST_TYPE.to_string(),
                content,
            };
            let summaries = match self.client.upsert_playlist(&request).await {
                Ok(summaries) => summaries,
                Err(err) if err.is_not_found() && request.id.is_some() => {
                    self.store.forget_playlist_server_id(playlist.local_id).await?;
                    self.logger.log_item_action(
                        LogAction::ReconcileSkip,
                        &playlist.title,
                        Some(&local_id),
                        request.id.as_deref(),
                        Some("Deleted on server; recreating from local copy"),
                    );
                    request.id = None;
                    match self.client.upsert_playlist(&request).await {
                        Ok(summaries) => summaries,
                        Err(err) => return Err(self.upsert_failed(&playlist, None, err)),
                    }
                }
                Err(err) => {
                    return Err(self.upsert_failed(&playlist, request.id.as_deref(), err));
                }
            };
            let confirmed = summaries.first();
            let Some(server_id) = confirmed
                .map(|summary| summary.id.clone())
                .or_else(|| request.id.clone())
            else {
                return Err(SyncError::MissingField {
                    entity: "playlist upsert response",
                    field: "id",
                });
            };
            let remote_updated_at =
                parse_optional(confirmed.and_then(|summary| summary.updated_at.as_deref()))?;
            self.store
                .confirm_playlist_upload(
                    playlist.local_id,
                    &server_id,
                    remote_updated_at,
                    playlist.last_modified_at,
                )
                .await?;
            self.logger.log_item_action(
                LogAction::UpstreamUpsertSuccess,
                &playlist.title,
                Some(&local_id),
                Some(&server_id),
                None,
            );
        }
        Ok(())
    }

    fn upsert_failed(
        &self,
        playlist: &PlaylistRecord,
        server_id: Option<&str>,
        err: MusicdexError,
    ) -> SyncError {
        self.logger.log_item_action(
            LogAction::UpstreamUpsertFailed,
            &playlist.title,
            Some(&playlist.local_id.to_string()),
            server_id,
            Some(&err.to_string()),
        );
        err.into()
    }

    /// Server song ids of the playlist's server-backed items, resolving ids the local
    /// row does not carry yet.
    async fn upload_content(
        &self,
        playlist: &PlaylistRecord,
        videos: &mut HashMap<String, Option<FullPlaylist>>,
    ) -> Result<Vec<String>, SyncError> {
        let mut content = Vec::new();
        for item in self.store.playlist_items(playlist.local_id).await? {
            if item.is_local_only {
                continue;
            }
            if let Some(song_id) = item.song_id {
                content.push(song_id);
                continue;
            }
            match self.find_song(&item.video_id, item.start_secs, videos).await? {
                Some(song_id) => {
                    self.store
                        .set_playlist_item_song_id(playlist.local_id, item.position, &song_id)
                        .await?;
                    content.push(song_id);
                }
                None => self.logger.log_item_action(
                    LogAction::ReconcileSkip,
                    &item.title,
                    Some(&item.item_id),
                    None,
                    Some("Song id could not be resolved; left out of upload"),
                ),
            }
        }
        Ok(content)
    }

    async fn find_song(
        &self,
        video_id: &str,
        start: i64,
        videos: &mut HashMap<String, Option<FullPlaylist>>,
    ) -> Result<Option<String>, MusicdexError> {
        if !videos.contains_key(video_id) {
            let fetched = match self.client.get_video_playlist(video_id).await {
                Ok(playlist) => Some(playlist),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            };
            videos.insert(video_id.to_string(), fetched);
        }
        Ok(videos
            .get(video_id)
            .and_then(Option::as_ref)
            .and_then(|playlist| playlist.songs().iter().find(|song| song.start == start))
            .map(|song| song.id.clone()))
    }

    async fn reconcile_metadata(
        &self,
        remote: &[PlaylistSummary],
        remote_by_id: &HashMap<&str, &PlaylistSummary>,
    ) -> Result<(), SyncError> {
        let local = self.store.all_playlists().await?;
        let known: HashSet<&str> = local
            .iter()
            .filter_map(|playlist| playlist.server_id.as_deref())
            .collect();

        for summary in remote.iter().filter(|summary| !known.contains(summary.id.as_str())) {
            let local_id = self
                .store
                .insert_remote_playlist(&summary.id, &summary.title, summary.description.as_deref())
                .await?;
            self.logger.log_item_action(
                LogAction::DownstreamInsertLocal,
                &summary.title,
                Some(&local_id.to_string()),
                Some(&summary.id),
                None,
            );
        }

        let mut removed = Vec::new();
        for playlist in local.iter().filter(|p| p.sync_status == SyncStatus::Synced) {
            let Some(server_id) = playlist.server_id.as_deref() else {
                continue;
            };
            let Some(summary) = remote_by_id.get(server_id) else {
                self.logger.log_item_action(
                    LogAction::DownstreamDeleteLocal,
                    &playlist.title,
                    Some(&playlist.local_id.to_string()),
                    Some(server_id),
                    Some("Removed on server"),
                );
                removed.push(playlist.local_id);
                continue;
            };
            let remote_at = parse_optional(summary.updated_at.as_deref())?;
            let changed = summary.title != playlist.title
                || summary.description != playlist.description;
            if changed && is_newer(remote_at, playlist.remote_updated_at) {
                let updated = self
                    .store
                    .update_playlist_metadata(
                        playlist.local_id,
                        &summary.title,
                        summary.description.as_deref(),
                    )
                    .await?;
                if updated {
                    self.logger.log_item_action(
                        LogAction::DownstreamUpdateLocal,
                        &summary.title,
                        Some(&playlist.local_id.to_string()),
                        Some(server_id),
                        Some("Metadata changed on server"),
                    );
                }
            }
        }
        self.store.delete_synced_playlists(&removed).await?;
        Ok(())
    }

    async fn reconcile_content(
        &self,
        remote_by_id: &HashMap<&str, &PlaylistSummary>,
        dirty_at_start: &HashSet<i64>,
    ) -> Result<(), SyncError> {
        for playlist in self.store.all_playlists().await? {
            let Some(server_id) = playlist.server_id.as_deref() else {
                continue;
            };
            let Some(summary) = remote_by_id.get(server_id) else {
                continue;
            };
            let remote_at = parse_optional(summary.updated_at.as_deref())?;
            if !is_newer(remote_at, playlist.remote_updated_at) {
                continue;
            }
            let local_id = playlist.local_id.to_string();
            if dirty_at_start.contains(&playlist.local_id)
                || playlist.sync_status != SyncStatus::Synced
            {
                self.logger.log_item_action(
                    LogAction::ReconcileSkip,
                    &playlist.title,
                    Some(&local_id),
                    Some(server_id),
                    Some("Local changes take precedence; content not replaced this run"),
                );
                continue;
            }

            let full = match self.client.get_playlist(server_id).await {
                Ok(full) => full,
                Err(err) if err.is_not_found() => {
                    self.logger.log_item_action(
                        LogAction::ReconcileSkip,
                        &playlist.title,
                        Some(&local_id),
                        Some(server_id),
                        Some("Listed but not fetchable; retried next run"),
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let content_at = parse_optional(full.updated_at.as_deref())?
                .or(remote_at)
                .unwrap_or_default();
            let items: Vec<_> = full.songs().iter().map(remote_item).collect();

            let Some(mut reconcile) = self.store.begin_playlist_reconcile(playlist.local_id).await?
            else {
                self.logger.log_item_action(
                    LogAction::ReconcileSkip,
                    &playlist.title,
                    Some(&local_id),
                    Some(server_id),
                    Some("Edited locally during sync"),
                );
                continue;
            };
            let kept = reconcile.replace_items(&items).await?;
            reconcile
                .apply_metadata(&full.title, full.description.as_deref(), content_at)
                .await?;
            reconcile.commit().await?;

            self.logger.log_item_action(
                LogAction::DownstreamUpdateLocal,
                &full.title,
                Some(&local_id),
                Some(server_id),
                Some(&format!(
                    "Content replaced: {} remote items, {kept} local-only kept",
                    items.len()
                )),
            );
        }
        Ok(())
    }
}

/// A missing local timestamp means the content was never applied.
fn is_newer(remote: Option<i64>, local: Option<i64>) -> bool {
    match (remote, local) {
        (_, None) => true,
        (Some(remote), Some(local)) => remote > local,
        (None, Some(_)) => false,
    }
}

fn remote_item(song: &Song) -> PlaylistItemInput {
    PlaylistItemInput {
        item_id: song.segment_id(),
        song_id: Some(song.id.clone()),
        video_id: song.video_id.clone(),
        start_secs: song.start,
        end_secs: song.end,
        title: song.name.clone(),
        artist: song.original_artist.clone(),
        is_local_only: false,
    }
}

#[async_trait]
impl Synchronizer for PlaylistSynchronizer {
    fn name(&self) -> &'static str {
        "PLAYLISTS"
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
#[path = "playlists_tests.rs"]
mod tests;
