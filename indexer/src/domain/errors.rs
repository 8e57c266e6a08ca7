use thiserror::Error;

use crate::infrastructure::node::NodeError;
use crate::infrastructure::persistence::error::DbError;

/// Error type for processing a single block id
#[derive(Debug, Error)]
pub enum BlockProcessorError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Processing cancelled")]
    Cancelled,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Processing error: {0}")]
    Processing(String),
}

impl BlockProcessorError {
    /// Errors that make indexing impossible for the whole process, not just this id
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BlockProcessorError::Node(NodeError::AllEndpointsUnavailable)
                | BlockProcessorError::Node(NodeError::Config(_))
                | BlockProcessorError::Node(NodeError::Decode(_))
                | BlockProcessorError::Decode(_)
                | BlockProcessorError::Config(_)
        )
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, BlockProcessorError::Db(_))
    }
}

/// Error that stops the indexer process
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Block {block_id} failed: {source}")]
    Block {
        block_id: u64,
        #[source]
        source: BlockProcessorError,
    },
    #[error("Task failure: {0}")]
    Task(String),
}
