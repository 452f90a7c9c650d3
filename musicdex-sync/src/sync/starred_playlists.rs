use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use musicdex_core::MusicdexClient;
use tracing::Instrument;

use super::logger::{LogAction, SyncLogger};
use super::status::SyncStatus;
use super::store::{StarredPlaylistInput, StarredPlaylistRecord, SyncStore};
use super::synchronizer::{SyncError, Synchronizer, finish};

pub struct StarredPlaylistsSynchronizer {
    store: SyncStore,
    client: MusicdexClient,
    logger: Arc<SyncLogger>,
}

impl StarredPlaylistsSynchronizer {
    pub fn new(store: SyncStore, client: MusicdexClient, logger: Arc<SyncLogger>) -> Self {
        Self {
            store,
            client,
            logger,
        }
    }

    async fn run(&self) -> Result<(), SyncError> {
        self.push_upstream().await?;
        self.reconcile_downstream().await
    }

    async fn push_upstream(&self) -> Result<(), SyncError> {
        self.logger.info("Phase 1: pushing star changes");
        for playlist in self.store.starred_by_status(SyncStatus::PendingDelete).await? {
            match self.client.unstar_playlist(&playlist.playlist_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    self.log_playlist(LogAction::UpstreamDeleteFailed, &playlist, Some(&err.to_string()));
                    return Err(err.into());
                }
            }
            self.store
                .delete_starred(&playlist.playlist_id, SyncStatus::PendingDelete)
                .await?;
            self.log_playlist(LogAction::UpstreamDeleteSuccess, &playlist, None);
        }

        for playlist in self.store.starred_by_status(SyncStatus::Dirty).await? {
            match self.client.star_playlist(&playlist.playlist_id).await {
                Ok(()) => {
                    self.store.mark_starred_synced(&playlist.playlist_id).await?;
                    self.log_playlist(LogAction::UpstreamUpsertSuccess, &playlist, None);
                }
                Err(err) if err.is_not_found() => {
                    self.store
                        .delete_starred(&playlist.playlist_id, SyncStatus::Dirty)
                        .await?;
                    self.log_playlist(
                        LogAction::DownstreamDeleteLocal,
                        &playlist,
                        Some("Playlist no longer exists on server"),
                    );
                }
                Err(err) => {
                    self.log_playlist(LogAction::UpstreamUpsertFailed, &playlist, Some(&err.to_string()));
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Synced stars are replaced wholesale by the server's set.
    async fn reconcile_downstream(&self) -> Result<(), SyncError> {
        self.logger.info("Phase 2: replacing synced stars with server list");
        let remote: Vec<StarredPlaylistInput> = self
            .client
            .list_starred()
            .await?
            .into_iter()
            .map(|stub| StarredPlaylistInput {
                playlist_id: stub.id,
                title: stub.title,
                description: stub.description,
            })
            .collect();

        let local = self.store.all_starred().await?;
        let local_by_id: HashMap<&str, &StarredPlaylistRecord> = local
            .iter()
            .map(|playlist| (playlist.playlist_id.as_str(), playlist))
            .collect();
        let remote_ids: HashSet<&str> = remote.iter().map(|p| p.playlist_id.as_str()).collect();

        for playlist in &remote {
            match local_by_id.get(playlist.playlist_id.as_str()) {
                None => self.logger.log_item_action(
                    LogAction::DownstreamInsertLocal,
                    &playlist.title,
                    None,
                    Some(&playlist.playlist_id),
                    None,
                ),
                Some(existing) if existing.sync_status != SyncStatus::Synced => {
                    self.log_playlist(
                        LogAction::ReconcileSkip,
                        existing,
                        Some("Local change pending; kept"),
                    )
                }
                Some(existing)
                    if existing.title != playlist.title
                        || existing.description != playlist.description =>
                {
                    self.logger.log_item_action(
                        LogAction::DownstreamUpdateLocal,
                        &playlist.title,
                        None,
                        Some(&playlist.playlist_id),
                        Some("Details changed on server"),
                    )
                }
                Some(_) => {}
            }
        }
        for playlist in local.iter().filter(|p| p.sync_status == SyncStatus::Synced) {
            if !remote_ids.contains(playlist.playlist_id.as_str()) {
                self.log_playlist(
                    LogAction::DownstreamDeleteLocal,
                    playlist,
                    Some("Unstarred on server"),
                );
            }
        }

        self.store.replace_synced_starred(&remote).await?;
        Ok(())
    }

    fn log_playlist(&self, action: LogAction, playlist: &StarredPlaylistRecord, reason: Option<&str>) {
        self.logger.log_item_action(
            action,
            &playlist.title,
            None,
            Some(&playlist.playlist_id),
            reason,
        );
    }
}

#[async_trait]
impl Synchronizer for StarredPlaylistsSynchronizer {
    fn name(&self) -> &'static str {
        "STARRED_PLAYLISTS"
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
