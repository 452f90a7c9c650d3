use std::sync::Arc;

use anyhow::Context;
use musicdex_core::MusicdexClient;

use crate::config::SyncConfig;
use crate::sync::coordinator::SyncCoordinator;
use crate::sync::favorite_channels::FavoriteChannelsSynchronizer;
use crate::sync::history::HistorySynchronizer;
use crate::sync::likes::LikesSynchronizer;
use crate::sync::logger::SyncLogger;
use crate::sync::playlists::PlaylistSynchronizer;
use crate::sync::starred_playlists::StarredPlaylistsSynchronizer;
use crate::sync::store::SyncStore;
use crate::sync::synchronizer::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Success,
    Retry,
    Failure,
}

/// One scheduled sync job: builds the synchronizers for the signed-in user and decides
/// whether a failed run is worth another attempt.
pub struct SyncWorker {
    config: SyncConfig,
    store: SyncStore,
}

impl SyncWorker {
    pub fn new(config: SyncConfig, store: SyncStore) -> Self {
        Self { config, store }
    }

    pub async fn bootstrap(config: SyncConfig) -> anyhow::Result<Self> {
        let store = SyncStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open sync store at {:?}", config.db_path))?;
        Ok(Self::new(config, store))
    }

    pub async fn run_attempt(&self, attempt: u32) -> WorkOutcome {
        let Some(token) = self.config.session_token() else {
            tracing::info!("no active session; nothing to sync");
            return WorkOutcome::Success;
        };
        let client = match MusicdexClient::with_base_url(&self.config.api_url, token) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, api_url = %self.config.api_url, "invalid API base URL");
                return WorkOutcome::Failure;
            }
        };

        let logger = Arc::new(SyncLogger::new());
        let coordinator =
            SyncCoordinator::new(self.synchronizers(client, &logger), Arc::clone(&logger));
        if coordinator.run().await {
            return WorkOutcome::Success;
        }
        if logger.has_terminal_failure() {
            tracing::error!(attempt, "sync run failed with a non-retryable error");
            WorkOutcome::Failure
        } else if attempt < self.config.max_run_attempts {
            tracing::warn!(attempt, "sync run failed; will retry");
            WorkOutcome::Retry
        } else {
            tracing::error!(attempt, "sync run failed; giving up");
            WorkOutcome::Failure
        }
    }

    pub async fn run_with_retries(&self) -> WorkOutcome {
        let backoff = self.config.backoff();
        let mut attempt = 0u32;
        loop {
            match self.run_attempt(attempt).await {
                WorkOutcome::Retry => {
                    let delay = backoff.delay(attempt);
                    tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                outcome => return outcome,
            }
        }
    }

    fn synchronizers(
        &self,
        client: MusicdexClient,
        logger: &Arc<SyncLogger>,
    ) -> Vec<Arc<dyn Synchronizer>> {
        let user_id = self.config.user_id.clone();
        vec![
            Arc::new(
                LikesSynchronizer::new(self.store.clone(), client.clone(), Arc::clone(logger))
                    .with_pending_delete_timeout(self.config.pending_delete_timeout),
            ),
            Arc::new(PlaylistSynchronizer::new(
                self.store.clone(),
                client.clone(),
                Arc::clone(logger),
                user_id.clone(),
            )),
            Arc::new(FavoriteChannelsSynchronizer::new(
                self.store.clone(),
                client.clone(),
                Arc::clone(logger),
            )),
            Arc::new(StarredPlaylistsSynchronizer::new(
                self.store.clone(),
                client.clone(),
                Arc::clone(logger),
            )),
            Arc::new(HistorySynchronizer::new(
                self.store.clone(),
                client,
                Arc::clone(logger),
                user_id,
            )),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_url: &str, token: Option<&str>) -> SyncConfig {
        SyncConfig {
            api_url: api_url.to_string(),
            token: token.map(str::to_string),
            user_id: Some("u1".into()),
            db_path: PathBuf::from(":memory:"),
            pending_delete_timeout: Duration::from_secs(2100),
            max_run_attempts: 3,
            retry_base: Duration::from_millis(1),
            retry_max: Duration::from_millis(5),
        }
    }

    async fn mount_empty_account(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/like"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "page_count": 1, "content": [] })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/playlist"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/playlist/:history[user_id=u1]"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": ":history[user_id=u1]",
                "title": "History",
                "content": []
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/favorites"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/musicdex/star"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn signed_out_user_succeeds_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let worker = SyncWorker::new(config(&server.uri(), None), SyncStore::memory().await);

        assert_eq!(worker.run_attempt(0).await, WorkOutcome::Success);
    }

    #[tokio::test]
    async fn clean_run_succeeds() {
        let server = MockServer::start().await;
        mount_empty_account(&server).await;
        let worker = SyncWorker::new(config(&server.uri(), Some("jwt")), SyncStore::memory().await);

        assert_eq!(worker.run_attempt(0).await, WorkOutcome::Success);
    }

    #[tokio::test]
    async fn failure_retries_until_attempt_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let worker = SyncWorker::new(config(&server.uri(), Some("jwt")), SyncStore::memory().await);

        assert_eq!(worker.run_attempt(0).await, WorkOutcome::Retry);
        assert_eq!(worker.run_attempt(2).await, WorkOutcome::Retry);
        assert_eq!(worker.run_attempt(3).await, WorkOutcome::Failure);
    }

    #[tokio::test]
    async fn run_with_retries_stops_after_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/favorites"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;
        mount_empty_account(&server).await;
        let worker = SyncWorker::new(config(&server.uri(), Some("jwt")), SyncStore::memory().await);

        assert_eq!(worker.run_with_retries().await, WorkOutcome::Failure);
    }

    #[tokio::test]
    async fn rejected_session_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/users/favorites"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        mount_empty_account(&server).await;
        let worker = SyncWorker::new(config(&server.uri(), Some("expired")), SyncStore::memory().await);

        assert_eq!(worker.run_with_retries().await, WorkOutcome::Failure);
    }

    #[tokio::test]
    async fn invalid_base_url_is_terminal() {
        let worker = SyncWorker::new(config("not a url", Some("jwt")), SyncStore::memory().await);
        assert_eq!(worker.run_attempt(0).await, WorkOutcome::Failure);
    }
}
