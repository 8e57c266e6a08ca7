//! Indexing pipeline
//!
//! The walker admits finalized block ids in order and runs one task per id. Tasks fetch and
//! resolve concurrently but write in id order through the commit tracker. The head follower
//! keeps placeholder rows for unfinalized best-chain blocks.

pub mod block_processor;
pub mod block_walker;
pub mod commit_tracker;
pub mod head_follower;
pub mod in_flight;
pub mod indexer_service;
pub mod retry_handler;

pub use block_processor::{BlockProcessor, BlockSummary};
pub use block_walker::BlockWalker;
pub use commit_tracker::CommitTracker;
pub use head_follower::HeadFollower;
pub use indexer_service::IndexerService;
pub use retry_handler::RetryHandler;
