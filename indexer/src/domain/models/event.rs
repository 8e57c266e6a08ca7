use chrono::{DateTime, Utc};
use serde_json::Value;

/// Indexed event row; every decoded event gets one, classified or not
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub block_id: u64,
    pub extrinsic_id: Option<i64>,
    pub index: u32,
    pub section: String,
    pub method: String,
    pub data: Value,
    pub phase: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmEventMethod {
    Log,
    ExecutedFailed,
}

impl EvmEventMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvmEventMethod::Log => "Log",
            EvmEventMethod::ExecutedFailed => "ExecutedFailed",
        }
    }
}

/// EVM-level event emitted by a contract
#[derive(Debug, Clone, PartialEq)]
pub struct EvmEvent {
    pub event_id: i64,
    pub block_id: u64,
    pub event_index: u32,
    pub extrinsic_index: Option<u32>,
    pub contract_address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub method: EvmEventMethod,
    /// Whether the emitting contract is known to the index
    pub verified: bool,
    pub success: bool,
    pub error_message: Option<String>,
}
