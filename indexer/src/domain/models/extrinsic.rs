use chrono::{DateTime, Utc};
use serde_json::Value;

/// Indexed extrinsic row
#[derive(Debug, Clone, PartialEq)]
pub struct Extrinsic {
    pub id: i64,
    pub block_id: u64,
    pub index: u32,
    pub hash: String,
    pub section: String,
    pub method: String,
    pub signer: Option<String>,
    pub args: Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub fee_info: Option<Value>,
    pub signed_data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}
