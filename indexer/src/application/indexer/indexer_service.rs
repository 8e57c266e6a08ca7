//! Startup sequence and lifetime of the walker and the head follower

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};

use crate::config::IndexerConfig;
use crate::domain::errors::IndexerError;
use crate::infrastructure::monitoring::ErrorReporter;
use crate::infrastructure::node::NodeConnectionPool;
use crate::infrastructure::persistence::IndexRepository;
use crate::utils::logging;

use super::block_walker::{shutdown_requested, BlockWalker};
use super::commit_tracker::CommitTracker;
use super::head_follower::HeadFollower;
use super::retry_handler::RetryHandler;

#[derive(Debug)]
pub struct IndexerService {
    pool: Arc<NodeConnectionPool>,
    repository: Arc<dyn IndexRepository>,
    reporter: Arc<dyn ErrorReporter>,
    config: IndexerConfig,
}

impl IndexerService {
    pub fn new(
        pool: Arc<NodeConnectionPool>,
        repository: Arc<dyn IndexRepository>,
        reporter: Arc<dyn ErrorReporter>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            pool,
            repository,
            reporter,
            config,
        }
    }

    /// Runs the indexer until `shutdown` turns true or a fatal error occurs.
    ///
    /// Startup purges unfinalized rows, waits for every node to finish syncing, then resumes
    /// after the highest finalized block in the store.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), IndexerError> {
        let retry_handler = RetryHandler::from_indexer_config(&self.config);
        let purged = retry_handler
            .execute_with_retry_and_logging(
                || self.repository.delete_unfinished_blocks(),
                "Purging unfinalized blocks",
                "indexer",
            )
            .await?;
        if purged > 0 {
            logging::log_info(&format!(
                "[indexer] 🧹 Removed {} unfinalized blocks from the last run",
                purged
            ));
        }

        if !self.wait_for_sync(&mut shutdown).await {
            return Ok(());
        }

        let walker = BlockWalker::new(
            self.pool.clone(),
            self.repository.clone(),
            self.reporter.clone(),
            self.config.clone(),
        );
        let commits = Arc::new(CommitTracker::new(walker.resume_point().await?));

        let (stop_tx, stop_rx) = watch::channel(false);
        let follower = HeadFollower::new(
            self.pool.clone(),
            self.repository.clone(),
            self.reporter.clone(),
            commits.clone(),
            &self.config.native_token_address,
        );
        let mut follower_task = tokio::spawn(follower.run(stop_rx));

        let result = walker.run(commits, shutdown).await;

        stop_tx.send_replace(true);
        if timeout(Duration::from_secs(5), &mut follower_task).await.is_err() {
            follower_task.abort();
        }

        match &result {
            Ok(()) => logging::log_info("[indexer] ✅ Stopped cleanly"),
            Err(e) => logging::log_error(&format!("[indexer] ❌ Stopped on error: {}", e)),
        }
        result
    }

    /// Polls node health until no node is syncing. Returns false when shutdown came first.
    async fn wait_for_sync(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut announced = false;
        loop {
            if *shutdown.borrow() {
                return false;
            }
            if !self.pool.are_any_syncing().await {
                return true;
            }
            if !announced {
                logging::log_info("[indexer] ⏳ Waiting for nodes to finish syncing");
                announced = true;
            }
            tokio::select! {
                _ = sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                _ = shutdown_requested(shutdown) => return false,
            }
        }
    }
}
