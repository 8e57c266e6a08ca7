use chrono::{DateTime, Utc};
use serde_json::Value;

/// Indexed block row
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: u64,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
    pub author: String,
    pub finalized: bool,
    pub timestamp: DateTime<Utc>,
}

impl Block {
    /// Lightweight unfinalized row written as soon as a new head is announced
    pub fn placeholder(id: u64, hash: String) -> Self {
        Self {
            id,
            hash,
            parent_hash: String::new(),
            state_root: String::new(),
            extrinsics_root: String::new(),
            author: String::new(),
            finalized: false,
            timestamp: Utc::now(),
        }
    }
}

/// Header digest log row
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLog {
    pub block_id: u64,
    pub index: u32,
    pub kind: String,
    pub data: Value,
}
