use std::sync::Arc;

use async_trait::async_trait;
use musicdex_core::{FullPlaylist, MusicdexClient};
use tracing::Instrument;

use super::logger::SyncLogger;
use super::store::{HISTORY_LAST_SYNC_KEY, HistoryItemInput, SyncStore};
use super::synchronizer::{SyncError, Synchronizer, finish};
use super::timestamp::{now_millis, parse_optional};

/// Listening history is read-only locally: the server's history playlist overwrites it.
pub struct HistorySynchronizer {
    store: SyncStore,
    client: MusicdexClient,
    logger: Arc<SyncLogger>,
    user_id: Option<String>,
}

impl HistorySynchronizer {
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

    async fn run(&self, user_id: &str) -> Result<(), SyncError> {
        self.logger.info("Fetching listening history from server");
        let history = match self.client.get_history_playlist(user_id).await {
            Ok(history) => history,
            Err(err) if err.is_not_found() => {
                self.logger.info("  no history on server");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let remote_at = parse_optional(history.updated_at.as_deref())?;
        let last_sync = self.store.metadata_value(HISTORY_LAST_SYNC_KEY).await?;

        let newer = match (remote_at, last_sync) {
            (Some(remote), Some(local)) => remote > local,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !newer && history.songs().is_empty() {
            self.logger.info("  history is up to date");
            return Ok(());
        }

        let base = remote_at.unwrap_or_else(now_millis);
        let items = history_items(&history, base);
        self.store.replace_history(&items, Some(base)).await?;
        self.logger
            .info(format!("  replaced local history with {} items", items.len()));
        Ok(())
    }
}

/// Items in server order; `played_at` counts down from `base` so the order survives sorting.
fn history_items(history: &FullPlaylist, base: i64) -> Vec<HistoryItemInput> {
    history
        .songs()
        .iter()
        .enumerate()
        .map(|(index, song)| HistoryItemInput {
            item_id: song.segment_id(),
            song_id: song.id.clone(),
            video_id: song.video_id.clone(),
            title: song.name.clone(),
            artist: song.original_artist.clone(),
            played_at: base - index as i64,
        })
        .collect()
}

#[async_trait]
impl Synchronizer for HistorySynchronizer {
    fn name(&self) -> &'static str {
        "HISTORY"
    }

    async fn synchronize(&self) -> bool {
        self.logger.start_section(self.name());
        let Some(user_id) = self.user_id.as_deref() else {
            self.logger.warning("No user id available; skipping history sync");
            self.logger.end_section(self.name(), true);
            return true;
        };
        let outcome = self
            .run(user_id)
            .instrument(tracing::info_span!("sync", family = self.name()))
            .await;
        finish(&self.logger, self.name(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::timestamp::parse_rfc3339_millis;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HISTORY_PATH: &str = "/api/v2/musicdex/playlist/:history[user_id=u1]";

    async fn setup(server: &MockServer, user_id: Option<&str>) -> (SyncStore, HistorySynchronizer) {
        let client = MusicdexClient::with_base_url(&server.uri(), "test-token").unwrap();
        let store = SyncStore::memory().await;
        let logger = Arc::new(SyncLogger::new());
        let sync = HistorySynchronizer::new(store.clone(), client, logger, user_id.map(Into::into));
        (store, sync)
    }

    fn song(id: &str, video_id: &str, start: i64) -> serde_json::Value {
        json!({ "id": id, "name": format!("Song {id}"), "video_id": video_id, "start": start, "end": start + 30 })
    }

    #[tokio::test]
    async fn replaces_history_in_server_order() {
        let server = MockServer::start().await;
        let (store, sync) = setup(&server, Some("u1")).await;
        store
            .replace_history(
                &[HistoryItemInput {
                    item_id: "stale_0".into(),
                    song_id: "s-stale".into(),
                    video_id: "stale".into(),
                    title: "Stale".into(),
                    artist: None,
                    played_at: 1,
                }],
                Some(1),
            )
            .await
            .unwrap();
        Mock::given(method("GET"))
            .and(path(HISTORY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ":history[user_id=u1]",
                "title": "History",
                "updated_at": "2024-05-01T12:00:00Z",
                "content": [song("s-2", "v2", 10), song("s-1", "v1", 0)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);

        let base = parse_rfc3339_millis("2024-05-01T12:00:00Z").unwrap();
        let items = store.history_items().await.unwrap();
        let rows: Vec<_> = items
            .iter()
            .map(|item| (item.item_id.as_str(), item.played_at))
            .collect();
        assert_eq!(rows, vec![("v2_10", base), ("v1_0", base - 1)]);
        assert_eq!(
            store.metadata_value(HISTORY_LAST_SYNC_KEY).await.unwrap(),
            Some(base)
        );
    }

    #[tokio::test]
    async fn empty_unchanged_history_keeps_local_rows() {
        let server = MockServer::start().await;
        let (store, sync) = setup(&server, Some("u1")).await;
        let at = parse_rfc3339_millis("2024-05-01T12:00:00Z").unwrap();
        let kept = HistoryItemInput {
            item_id: "v1_0".into(),
            song_id: "s-1".into(),
            video_id: "v1".into(),
            title: "Kept".into(),
            artist: None,
            played_at: at,
        };
        store.replace_history(&[kept], Some(at)).await.unwrap();
        Mock::given(method("GET"))
            .and(path(HISTORY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ":history[user_id=u1]",
                "title": "History",
                "updated_at": "2024-05-01T12:00:00Z",
                "content": []
            })))
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);
        assert_eq!(store.history_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_user_id_is_not_a_failure() {
        let server = MockServer::start().await;
        let (_store, sync) = setup(&server, None).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);
    }

    #[tokio::test]
    async fn server_error_fails_the_family() {
        let server = MockServer::start().await;
        let (store, sync) = setup(&server, Some("u1")).await;
        Mock::given(method("GET"))
            .and(path(HISTORY_PATH))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        assert!(!sync.synchronize().await);
        assert_eq!(store.metadata_value(HISTORY_LAST_SYNC_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_run_leaves_identical_history() {
        let server = MockServer::start().await;
        let (store, sync) = setup(&server, Some("u1")).await;
        Mock::given(method("GET"))
            .and(path(HISTORY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ":history[user_id=u1]",
                "title": "History",
                "updated_at": "2024-05-01T12:00:00Z",
                "content": [song("s-2", "v2", 10), song("s-1", "v1", 0)]
            })))
            .expect(2)
            .mount(&server)
            .await;

        assert!(sync.synchronize().await);
        let first = store.history_items().await.unwrap();
        let stamp = store.metadata_value(HISTORY_LAST_SYNC_KEY).await.unwrap();

        assert!(sync.synchronize().await);

        assert_eq!(store.history_items().await.unwrap(), first);
        assert_eq!(store.metadata_value(HISTORY_LAST_SYNC_KEY).await.unwrap(), stamp);
    }
}
