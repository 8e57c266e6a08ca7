//! Indexes best-chain blocks past the finalized head.
//!
//! Each new id first gets a placeholder row carrying only id and hash, then the block is fully
//! resolved and its rows written unfinalized. Nothing is finalized here; the walker rewrites
//! the rows once it reaches the id.

use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::models::Block;
use crate::infrastructure::monitoring::ErrorReporter;
use crate::infrastructure::node::NodeConnectionPool;
use crate::infrastructure::persistence::IndexRepository;
use crate::utils::logging;

use super::block_processor::BlockProcessor;
use super::block_walker::shutdown_requested;
use super::commit_tracker::CommitTracker;

/// Most placeholder rows written for a single head notification
const MAX_PLACEHOLDERS_PER_HEAD: u64 = 64;

#[derive(Debug)]
pub struct HeadFollower {
    pool: Arc<NodeConnectionPool>,
    repository: Arc<dyn IndexRepository>,
    reporter: Arc<dyn ErrorReporter>,
    commits: Arc<CommitTracker>,
    processor: BlockProcessor,
    last_written: Option<u64>,
}

impl HeadFollower {
    pub fn new(
        pool: Arc<NodeConnectionPool>,
        repository: Arc<dyn IndexRepository>,
        reporter: Arc<dyn ErrorReporter>,
        commits: Arc<CommitTracker>,
        native_token_address: &str,
    ) -> Self {
        let processor = BlockProcessor::new(
            pool.clone(),
            repository.clone(),
            commits.clone(),
            reporter.clone(),
            native_token_address,
        );
        Self {
            pool,
            repository,
            reporter,
            commits,
            processor,
            last_written: None,
        }
    }

    /// Follows best-head notifications until `stop` turns true
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut best_head = self.pool.subscribe_best_head();
        loop {
            let head = *best_head.borrow_and_update();
            tokio::select! {
                _ = self.on_new_head(head) => {}
                _ = shutdown_requested(&mut stop) => break,
            }

            tokio::select! {
                changed = best_head.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown_requested(&mut stop) => break,
            }
        }
        logging::log_debug("[follower] Stopped");
    }

    /// Writes placeholders for ids above both the finalized head and the walker's progress,
    /// then indexes those blocks in full.
    ///
    /// Returns the number of placeholder rows submitted.
    pub async fn on_new_head(&mut self, head: u64) -> usize {
        let floor = (self.pool.last_finalized_head() + 1)
            .max(self.commits.next_id())
            .max(self.last_written.map_or(0, |id| id + 1))
            .max(head.saturating_sub(MAX_PLACEHOLDERS_PER_HEAD - 1));
        if floor > head {
            return 0;
        }

        let mut rows = Vec::new();
        for id in floor..=head {
            let hash = self
                .pool
                .query(move |node| async move { node.block_hash(id).await })
                .await;
            match hash {
                Ok(hash) => rows.push(Block::placeholder(id, hash)),
                Err(e) => {
                    // the id is retried on the next head
                    self.reporter
                        .report("follower", &format!("block hash #{}", id), &e);
                    break;
                }
            }
        }
        if rows.is_empty() {
            return 0;
        }

        let last = rows.last().map_or(floor, |block| block.id);
        if let Err(e) = self.repository.insert_placeholder_blocks(&rows).await {
            self.reporter.report("follower", "placeholder insert", &e);
            return 0;
        }
        self.last_written = Some(last);
        logging::log_debug(&format!("[follower] Placeholders #{}..=#{}", floor, last));

        for id in floor..=last {
            // a failed id keeps its placeholder until the walker writes it
            if let Err(e) = self.processor.process_unfinalized(id).await {
                self.reporter
                    .report("follower", &format!("unfinalized block #{}", id), &e);
            }
        }
        rows.len()
    }
}
