//! Walks finalized block ids in order, keeping a bounded number of block tasks in flight.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{sleep, timeout, Duration};

use crate::config::IndexerConfig;
use crate::domain::errors::{BlockProcessorError, IndexerError};
use crate::infrastructure::monitoring::ErrorReporter;
use crate::infrastructure::node::NodeConnectionPool;
use crate::infrastructure::persistence::IndexRepository;
use crate::utils::logging;

use super::block_processor::{BlockProcessor, BlockSummary};
use super::commit_tracker::CommitTracker;
use super::in_flight::InFlightQueue;
use super::retry_handler::RetryHandler;

type TaskResult = Result<BlockSummary, BlockProcessorError>;

/// Resolves once `shutdown` is true. A dropped sender never resolves.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Committed ids not yet flipped to finalized
#[derive(Debug, Clone, Copy)]
struct PendingFlip {
    from: u64,
    to: Option<u64>,
}

impl PendingFlip {
    fn new(from: u64) -> Self {
        Self { from, to: None }
    }

    fn len(&self) -> u64 {
        self.to.map_or(0, |to| to + 1 - self.from)
    }
}

#[derive(Debug)]
pub struct BlockWalker {
    pool: Arc<NodeConnectionPool>,
    repository: Arc<dyn IndexRepository>,
    reporter: Arc<dyn ErrorReporter>,
    config: IndexerConfig,
    retry_handler: RetryHandler,
}

impl BlockWalker {
    pub fn new(
        pool: Arc<NodeConnectionPool>,
        repository: Arc<dyn IndexRepository>,
        reporter: Arc<dyn ErrorReporter>,
        config: IndexerConfig,
    ) -> Self {
        let retry_handler = RetryHandler::from_indexer_config(&config);
        Self {
            pool,
            repository,
            reporter,
            config,
            retry_handler,
        }
    }

    /// First id to index: one past the highest finalized block in the store
    pub async fn resume_point(&self) -> Result<u64, IndexerError> {
        let last = self
            .retry_handler
            .execute_with_retry_and_logging(
                || self.repository.last_persisted_finalized_id(),
                "Reading resume point",
                "walker",
            )
            .await?;
        Ok(last.map_or(0, |id| id + 1))
    }

    /// Indexes finalized blocks from `commits.next_id()` until `shutdown` turns true or a block
    /// fails fatally.
    ///
    /// On shutdown, tasks already queued get `shutdown_drain_timeout_ms` to finish; whatever is
    /// still running after that is aborted and left for the next run.
    pub async fn run(
        &self,
        commits: Arc<CommitTracker>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IndexerError> {
        let processor = Arc::new(BlockProcessor::new(
            self.pool.clone(),
            self.repository.clone(),
            commits.clone(),
            self.reporter.clone(),
            &self.config.native_token_address,
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut finalized_head = self.pool.subscribe_finalized_head();
        let mut queue: InFlightQueue<TaskResult> =
            InFlightQueue::new(self.config.max_blocks_per_step);
        let mut next_id = commits.next_id();
        let mut pending = PendingFlip::new(next_id);

        logging::log_info(&format!(
            "[walker] 🚀 Starting at block #{} (finalized head #{})",
            next_id,
            self.pool.last_finalized_head()
        ));

        let outcome: Result<(), IndexerError> = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            if next_id <= self.pool.last_finalized_head() && !queue.is_full() {
                let task = tokio::spawn(Self::run_block(
                    processor.clone(),
                    next_id,
                    self.retry_handler.clone(),
                    self.reporter.clone(),
                    shutdown.clone(),
                    cancel_rx.clone(),
                ));
                if let Err(task) = queue.push(next_id, task) {
                    task.abort();
                    break Err(IndexerError::Task(format!(
                        "in-flight queue rejected block {}",
                        next_id
                    )));
                }
                next_id += 1;
                continue;
            }

            if queue.is_empty() {
                if let Err(e) = self.flush(&mut pending).await {
                    break Err(e);
                }
                tokio::select! {
                    _ = finalized_head.changed() => {}
                    _ = sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                    _ = shutdown_requested(&mut shutdown) => {}
                }
                continue;
            }

            let can_admit = !queue.is_full();
            tokio::select! {
                popped = queue.pop_oldest() => {
                    if let Some((id, result)) = popped {
                        match self.settle(id, result, &mut pending).await {
                            Ok(true) => {}
                            Ok(false) => break Ok(()),
                            Err(e) => break Err(e),
                        }
                    }
                }
                _ = finalized_head.changed(), if can_admit => {}
                _ = shutdown_requested(&mut shutdown) => {}
            }
        };

        if outcome.is_err() {
            cancel_tx.send_replace(true);
        }
        let drained = self.drain(&mut queue, &mut pending, &cancel_tx).await;
        let flushed = self.flush(&mut pending).await;

        logging::log_info(&format!(
            "[walker] 🛑 Stopped; last committed block {}",
            commits
                .last_committed()
                .map_or_else(|| "none".to_string(), |id| format!("#{}", id))
        ));
        outcome.and(drained).and(flushed)
    }

    /// Waits for queued tasks up to the drain timeout, then aborts the rest
    async fn drain(
        &self,
        queue: &mut InFlightQueue<TaskResult>,
        pending: &mut PendingFlip,
        cancel: &watch::Sender<bool>,
    ) -> Result<(), IndexerError> {
        if queue.is_empty() {
            return Ok(());
        }
        logging::log_info(&format!(
            "[walker] ⏳ Draining {} in-flight blocks",
            queue.len()
        ));

        let drain_timeout = Duration::from_millis(self.config.shutdown_drain_timeout_ms);
        let mut outcome = Ok(());
        let waited = timeout(drain_timeout, async {
            while let Some((id, result)) = queue.pop_oldest().await {
                match self.settle(id, result, pending).await {
                    Ok(true) => {}
                    Ok(false) => {
                        cancel.send_replace(true);
                    }
                    Err(e) => {
                        cancel.send_replace(true);
                        if outcome.is_ok() {
                            outcome = Err(e);
                        }
                    }
                }
            }
        })
        .await;

        if waited.is_err() {
            cancel.send_replace(true);
            let aborted = queue.abort_all();
            logging::log_warning(&format!(
                "[walker] ⚠️ Drain timed out, aborted {} blocks starting at #{}",
                aborted.len(),
                aborted.first().copied().unwrap_or_default()
            ));
        }
        outcome
    }

    /// Handles one finished task. `Ok(false)` means the task was cancelled.
    async fn settle(
        &self,
        id: u64,
        result: Result<TaskResult, JoinError>,
        pending: &mut PendingFlip,
    ) -> Result<bool, IndexerError> {
        match result {
            Ok(Ok(_summary)) => {
                pending.to = Some(id);
                if pending.len() >= self.config.catch_up_chunk_size.max(1) {
                    self.flush(pending).await?;
                }
                Ok(true)
            }
            Ok(Err(BlockProcessorError::Cancelled)) => Ok(false),
            Ok(Err(source)) => Err(IndexerError::Block {
                block_id: id,
                source,
            }),
            Err(e) if e.is_cancelled() => Ok(false),
            Err(e) => Err(IndexerError::Task(format!("block {} task panicked: {}", id, e))),
        }
    }

    /// Marks the committed range finalized
    async fn flush(&self, pending: &mut PendingFlip) -> Result<(), IndexerError> {
        let Some(to) = pending.to else {
            return Ok(());
        };
        let from = pending.from;
        let flipped = self
            .retry_handler
            .execute_with_retry_and_logging(
                || self.repository.finalize_blocks_in_range(from, to),
                "Finalizing blocks",
                "walker",
            )
            .await?;
        logging::log_debug(&format!(
            "[walker] Finalized blocks #{}..=#{} ({} rows)",
            from, to, flipped
        ));
        *pending = PendingFlip::new(to + 1);
        Ok(())
    }

    /// Processes one id until it commits, retrying transient failures with backoff
    async fn run_block(
        processor: Arc<BlockProcessor>,
        id: u64,
        retry_handler: RetryHandler,
        reporter: Arc<dyn ErrorReporter>,
        mut shutdown: watch::Receiver<bool>,
        cancel: watch::Receiver<bool>,
    ) -> TaskResult {
        let mut attempt: u32 = 0;
        let mut persistence_failures: u32 = 0;

        loop {
            let mut task_cancel = cancel.clone();
            let error = match processor.process_block(id, &mut task_cancel).await {
                Ok(summary) => return Ok(summary),
                Err(e) => e,
            };

            if matches!(error, BlockProcessorError::Cancelled) {
                return Err(error);
            }
            if error.is_fatal() {
                reporter.report("walker", &format!("block {}", id), &error);
                return Err(error);
            }
            if error.is_persistence() {
                persistence_failures += 1;
                if persistence_failures >= retry_handler.max_retries() {
                    reporter.report(
                        "walker",
                        &format!("block {} (persistence budget exhausted)", id),
                        &error,
                    );
                    return Err(error);
                }
            }

            attempt += 1;
            let delay = retry_handler.calculate_delay(attempt);
            reporter.report("walker", &format!("block {} attempt {}", id, attempt), &error);
            logging::log_warning(&format!(
                "[block {}] ⚠️ Attempt {} failed, retrying in {}ms: {}",
                id, attempt, delay, error
            ));

            tokio::select! {
                _ = sleep(Duration::from_millis(delay)) => {}
                _ = shutdown_requested(&mut shutdown) => {}
                _ = shutdown_requested(&mut task_cancel) => {}
            }
            if *shutdown.borrow() || *cancel.borrow() {
                return Err(BlockProcessorError::Cancelled);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_flip_counts_committed_ids() {
        let mut pending = PendingFlip::new(10);
        assert_eq!(pending.len(), 0);
        pending.to = Some(10);
        assert_eq!(pending.len(), 1);
        pending.to = Some(14);
        assert_eq!(pending.len(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_requested_ignores_dropped_sender() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = timeout(Duration::from_millis(30), shutdown_requested(&mut rx)).await;
        assert!(waited.is_err());

        let (tx, mut rx) = watch::channel(false);
        tx.send_replace(true);
        assert!(timeout(Duration::from_millis(30), shutdown_requested(&mut rx))
            .await
            .is_ok());
    }
}
