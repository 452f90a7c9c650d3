use std::sync::Arc;

use tokio::task::JoinSet;

use super::logger::SyncLogger;
use super::synchronizer::Synchronizer;

/// Runs every registered synchronizer concurrently and folds their results into one
/// overall outcome.
pub struct SyncCoordinator {
    synchronizers: Vec<Arc<dyn Synchronizer>>,
    logger: Arc<SyncLogger>,
}

impl SyncCoordinator {
    pub fn new(synchronizers: Vec<Arc<dyn Synchronizer>>, logger: Arc<SyncLogger>) -> Self {
        Self {
            synchronizers,
            logger,
        }
    }

    /// True only if every synchronizer succeeded. A panicking synchronizer counts as a
    /// failure; its siblings still run to completion.
    pub async fn run(&self) -> bool {
        self.logger
            .info("===== Starting Full Synchronization Run =====");

        let mut tasks = JoinSet::new();
        for synchronizer in &self.synchronizers {
            let synchronizer = Arc::clone(synchronizer);
            tasks.spawn(async move {
                let name = synchronizer.name();
                (name, synchronizer.synchronize().await)
            });
        }

        let mut all_succeeded = true;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, true)) => {}
                Ok((name, false)) => {
                    tracing::warn!(family = name, "synchronizer reported failure");
                    all_succeeded = false;
                }
                Err(err) => {
                    self.logger
                        .error(format!("synchronizer task did not complete: {err}"));
                    all_succeeded = false;
                }
            }
        }

        self.logger.info(format!(
            "===== Full Synchronization Run Finished. Overall Success: {all_succeeded} ====="
        ));
        all_succeeded
    }
}
