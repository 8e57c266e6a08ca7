//! Decoded chain shapes handed over by the node client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which part of block execution emitted an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Initialization,
    ApplyExtrinsic(u32),
    Finalization,
}

impl Phase {
    /// Index of the extrinsic this phase belongs to, if any
    pub fn extrinsic_index(&self) -> Option<u32> {
        match self {
            Phase::ApplyExtrinsic(index) => Some(*index),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Phase::Initialization => serde_json::json!({ "initialization": null }),
            Phase::ApplyExtrinsic(index) => serde_json::json!({ "applyExtrinsic": index }),
            Phase::Finalization => serde_json::json!({ "finalization": null }),
        }
    }
}

/// Header digest log entry
#[derive(Debug, Clone, PartialEq)]
pub struct DigestLog {
    pub index: u32,
    pub kind: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub state_root: String,
    pub extrinsics_root: String,
    pub author: Option<String>,
    pub logs: Vec<DigestLog>,
}

/// A decoded extrinsic as it appears in the block body
#[derive(Debug, Clone, PartialEq)]
pub struct ChainExtrinsic {
    pub index: u32,
    pub hash: String,
    pub section: String,
    pub method: String,
    /// Signer address for signed extrinsics, `None` for inherents
    pub signer: Option<String>,
    /// Call arguments, either keyed by snake_case runtime name or positional
    pub args: Value,
    pub nonce: Option<u64>,
    pub tip: Option<String>,
    /// Dispatch and fee information (`partialFee`, `weight`, `class`)
    pub info: Option<Value>,
}

impl ChainExtrinsic {
    pub fn is(&self, section: &str, method: &str) -> bool {
        self.section.eq_ignore_ascii_case(section) && self.method.eq_ignore_ascii_case(method)
    }

    pub fn is_signed(&self) -> bool {
        self.signer.is_some()
    }

    /// Argument by name for keyed arguments, by position for positional encodings.
    ///
    /// Object keys carry no order, so a missing name is never answered by position.
    pub fn arg(&self, name: &str, position: usize) -> Option<&Value> {
        match &self.args {
            Value::Object(map) => map.get(name),
            Value::Array(items) => items.get(position),
            _ => None,
        }
    }

    /// `partialFee` from the fee info, or "0" when the extrinsic pays none
    pub fn partial_fee(&self) -> String {
        self.info
            .as_ref()
            .and_then(|info| info.get("partialFee"))
            .and_then(value_to_decimal)
            .unwrap_or_else(|| "0".to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub extrinsics: Vec<ChainExtrinsic>,
}

/// A decoded event with its position in the block
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Position in the block-wide event list
    pub index: u32,
    pub section: String,
    pub method: String,
    pub data: Vec<Value>,
    pub phase: Phase,
}

impl EventRecord {
    pub fn is(&self, section: &str, method: &str) -> bool {
        self.section.eq_ignore_ascii_case(section) && self.method.eq_ignore_ascii_case(method)
    }

    pub fn data_str(&self, position: usize) -> Option<String> {
        self.data.get(position).and_then(value_to_string)
    }

    pub fn data_decimal(&self, position: usize) -> Option<String> {
        self.data.get(position).and_then(value_to_decimal)
    }
}

/// Derived balances of one account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountBalances {
    pub free: String,
    pub reserved: String,
    pub locked: String,
    pub available: String,
    pub voting: String,
    pub vested: String,
    pub nonce: u64,
}

/// Where staking rewards of a stash are paid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewardDestination {
    Staked,
    Stash,
    Controller,
    Account(String),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersion {
    pub spec_name: String,
    pub spec_version: u32,
    pub transaction_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHealth {
    pub is_syncing: bool,
    pub peers: u64,
}

/// Renders a JSON scalar as a plain string.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("id").and_then(value_to_string),
        _ => None,
    }
}

/// Renders a JSON number, decimal string or 0x-prefixed hex string as a decimal string.
pub fn value_to_decimal(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x") {
                num_bigint::BigUint::parse_bytes(hex.as_bytes(), 16).map(|n| n.to_string())
            } else if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                let trimmed = s.trim_start_matches('0');
                Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
            } else {
                None
            }
        }
        _ => None,
    }
}
