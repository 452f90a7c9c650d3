use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use musicdex_core::{FavoriteChannel, FavoriteChannelOp, MusicdexClient};
use tracing::Instrument;

use super::logger::{LogAction, SyncLogger};
use super::status::SyncStatus;
use super::store::{DownstreamBatch, FavoriteChannelInput, FavoriteChannelRecord, SyncStore};
use super::synchronizer::{SyncError, Synchronizer, finish};

/// Favorite channels are pushed as a single patch of add/remove operations, then the
/// synced rows are made to mirror the server's list.
pub struct FavoriteChannelsSynchronizer {
    store: SyncStore,
    client: MusicdexClient,
    logger: Arc<SyncLogger>,
}

impl FavoriteChannelsSynchronizer {
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
        self.logger.info("Phase 1: pushing favorite channel changes");
        let removed = self
            .store
            .favorite_channels_by_status(SyncStatus::PendingDelete)
            .await?;
        let added = self
            .store
            .favorite_channels_by_status(SyncStatus::Dirty)
            .await?;
        if removed.is_empty() && added.is_empty() {
            self.logger.info("  nothing to push");
            return Ok(());
        }

        let ops: Vec<_> = removed
            .iter()
            .map(|channel| FavoriteChannelOp::remove(&channel.channel_id))
            .chain(added.iter().map(|channel| FavoriteChannelOp::add(&channel.channel_id)))
            .collect();
        if let Err(err) = self.client.patch_favorite_channels(&ops).await {
            let reason = err.to_string();
            for channel in &removed {
                self.log_channel(LogAction::UpstreamDeleteFailed, channel, Some(&reason));
            }
            for channel in &added {
                self.log_channel(LogAction::UpstreamUpsertFailed, channel, Some(&reason));
            }
            return Err(err.into());
        }

        let removed_ids: Vec<String> = removed.iter().map(|c| c.channel_id.clone()).collect();
        let added_ids: Vec<String> = added.iter().map(|c| c.channel_id.clone()).collect();
        self.store
            .confirm_favorite_push(&removed_ids, &added_ids)
            .await?;
        for channel in &removed {
            self.log_channel(LogAction::UpstreamDeleteSuccess, channel, None);
        }
        for channel in &added {
            self.log_channel(LogAction::UpstreamUpsertSuccess, channel, None);
        }
        Ok(())
    }

    async fn reconcile_downstream(&self) -> Result<(), SyncError> {
        self.logger.info("Phase 2: reconciling favorite channels with server");
        let remote: Vec<FavoriteChannelInput> = self
            .client
            .list_favorite_channels()
            .await?
            .into_iter()
            .map(channel_input)
            .collect();
        let local = self.store.all_favorite_channels().await?;
        let local_by_id: HashMap<&str, &FavoriteChannelRecord> = local
            .iter()
            .map(|channel| (channel.channel_id.as_str(), channel))
            .collect();
        let remote_ids: HashSet<&str> = remote.iter().map(|c| c.channel_id.as_str()).collect();

        let mut batch = DownstreamBatch::default();
        for channel in &remote {
            match local_by_id.get(channel.channel_id.as_str()) {
                None => {
                    self.logger.log_item_action(
                        LogAction::DownstreamInsertLocal,
                        display_name(channel),
                        Some(&channel.channel_id),
                        Some(&channel.channel_id),
                        None,
                    );
                    batch.insert.push(channel.clone());
                }
                Some(existing)
                    if existing.sync_status == SyncStatus::Synced
                        && !existing.same_display(channel) =>
                {
                    self.logger.log_item_action(
                        LogAction::DownstreamUpdateLocal,
                        display_name(channel),
                        Some(&channel.channel_id),
                        Some(&channel.channel_id),
                        Some("Channel details changed on server"),
                    );
                    batch.update.push(channel.clone());
                }
                Some(_) => {}
            }
        }
        for channel in local.iter().filter(|c| c.sync_status == SyncStatus::Synced) {
            if !remote_ids.contains(channel.channel_id.as_str()) {
                self.log_channel(
                    LogAction::DownstreamDeleteLocal,
                    channel,
                    Some("Removed on server"),
                );
                batch.delete.push(channel.channel_id.clone());
            }
        }

        self.logger.info(format!(
            "  {} inserted, {} updated, {} deleted",
            batch.insert.len(),
            batch.update.len(),
            batch.delete.len()
        ));
        self.store.apply_favorite_batch(&batch).await?;
        Ok(())
    }

    fn log_channel(&self, action: LogAction, channel: &FavoriteChannelRecord, reason: Option<&str>) {
        self.logger.log_item_action(
            action,
            channel.display_name(),
            Some(&channel.channel_id),
            Some(&channel.channel_id),
            reason,
        );
    }
}

fn channel_input(channel: FavoriteChannel) -> FavoriteChannelInput {
    FavoriteChannelInput {
        channel_id: channel.id,
        name: channel.name,
        english_name: channel.english_name,
        photo_url: channel.photo,
        org: channel.org,
    }
}

fn display_name(channel: &FavoriteChannelInput) -> &str {
    channel
        .english_name
        .as_deref()
        .or(channel.name.as_deref())
        .unwrap_or(&channel.channel_id)
}

#[async_trait]
impl Synchronizer for FavoriteChannelsSynchronizer {
    fn name(&self) -> &'static str {
        "FAVORITE_CHANNELS"
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
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAVORITES: &str = "/api/v2/users/favorites";

    async fn setup(server: &MockServer) -> (SyncStore, Arc<SyncLogger>, FavoriteChannelsSynchronizer) {
        let client = MusicdexClient::with_base_url(&server.uri(), "test-token").unwrap();
        let store = SyncStore::memory().await;
        let logger = Arc::new(SyncLogger::new());
        let sync = FavoriteChannelsSynchronizer::new(store.clone(), client, Arc::clone(&logger));
        (store, logger, sync)
    }

    fn input(channel_id: &str, name: &str) -> FavoriteChannelInput {
        FavoriteChannelInput {
            channel_id: channel_id.into(),
            name: Some(name.into()),
            english_name: None,
            photo_url: None,
            org: None,
        }
    }

    async fn synced(store: &SyncStore, channel_id: &str, name: &str) {
        let batch = DownstreamBatch {
            insert: vec![input(channel_id, name)],
            ..Default::default()
        };
        store.apply_favorite_batch(&batch).await.unwrap();
    }

    async fn status_of(store: &SyncStore, channel_id: &str) -> Option<SyncStatus> {
        store
            .all_favorite_channels()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.sync_status)
    }

    #[tokio::test]
    async fn pushes_one_patch_and_settles_rows() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced(&store, "UC-old", "Old").await;
        store.remove_favorite_channel("UC-old").await.unwrap();
        store.add_favorite_channel(&input("UC-new", "New")).await.unwrap();

        Mock::given(method("PATCH"))
            .and(path(FAVORITES))
            .and(body_json(json!([
                { "op": "remove", "channel_id": "UC-old" },
                { "op": "add", "channel_id": "UC-new" }
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "UC-new", "name": "New" }])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "UC-new", "name": "New" }])))
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);

        assert_eq!(status_of(&store, "UC-old").await, None);
        assert_eq!(status_of(&store, "UC-new").await, Some(SyncStatus::Synced));
        assert_eq!(logger.actions_for("Old"), vec![LogAction::UpstreamDeleteSuccess]);
        assert_eq!(logger.actions_for("New"), vec![LogAction::UpstreamUpsertSuccess]);
    }

    #[tokio::test]
    async fn no_patch_when_nothing_changed_locally() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        synced(&store, "UC-1", "One").await;
        Mock::given(method("PATCH"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "UC-1", "name": "One" }])))
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);
        assert_eq!(status_of(&store, "UC-1").await, Some(SyncStatus::Synced));
    }

    #[tokio::test]
    async fn failed_patch_keeps_local_state_and_skips_downstream() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        store.add_favorite_channel(&input("UC-new", "New")).await.unwrap();
        Mock::given(method("PATCH"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        assert!(!sync.synchronize().await);
        assert_eq!(status_of(&store, "UC-new").await, Some(SyncStatus::Dirty));
        assert_eq!(logger.actions_for("New"), vec![LogAction::UpstreamUpsertFailed]);
    }

    #[tokio::test]
    async fn downstream_mirrors_server_but_leaves_pending_rows() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced(&store, "UC-gone", "Gone").await;
        synced(&store, "UC-renamed", "Before").await;
        synced(&store, "UC-leaving", "Leaving").await;
        store.remove_favorite_channel("UC-leaving").await.unwrap();

        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "UC-renamed", "name": "After" },
                { "id": "UC-fresh", "english_name": "Fresh" }
            ])))
            .mount(&server)
            .await;

        sync.reconcile_downstream().await.unwrap();

        let channels = store.all_favorite_channels().await.unwrap();
        let ids: Vec<_> = channels.iter().map(|c| c.channel_id.as_str()).collect();
        assert_eq!(ids, vec!["UC-fresh", "UC-leaving", "UC-renamed"]);
        assert_eq!(status_of(&store, "UC-leaving").await, Some(SyncStatus::PendingDelete));
        assert_eq!(channels[2].name.as_deref(), Some("After"));
        assert_eq!(logger.actions_for("Gone"), vec![LogAction::DownstreamDeleteLocal]);
        assert_eq!(logger.actions_for("Fresh"), vec![LogAction::DownstreamInsertLocal]);
        assert_eq!(logger.actions_for("After"), vec![LogAction::DownstreamUpdateLocal]);
    }

    #[tokio::test]
    async fn dirty_row_is_not_overwritten_downstream() {
        let server = MockServer::start().await;
        let (store, _logger, sync) = setup(&server).await;
        store.add_favorite_channel(&input("UC-1", "Mine")).await.unwrap();
        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "UC-1", "name": "Theirs" }])))
            .mount(&server)
            .await;

        sync.reconcile_downstream().await.unwrap();

        let channel = &store.all_favorite_channels().await.unwrap()[0];
        assert_eq!(channel.name.as_deref(), Some("Mine"));
        assert_eq!(channel.sync_status, SyncStatus::Dirty);
    }

    #[tokio::test]
    async fn second_run_against_same_server_state_changes_nothing() {
        let server = MockServer::start().await;
        let (store, logger, sync) = setup(&server).await;
        synced(&store, "UC-1", "One").await;
        Mock::given(method("PATCH"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(FAVORITES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "id": "UC-1", "name": "One renamed" },
                { "id": "UC-2", "name": "Two" }
            ])))
            .expect(2)
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);
        let first = store.all_favorite_channels().await.unwrap();
        let logged = logger.item_actions().len();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert!(sync.synchronize().await);

        assert_eq!(store.all_favorite_channels().await.unwrap(), first);
        assert_eq!(logger.item_actions().len(), logged);
    }
}
