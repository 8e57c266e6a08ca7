use chrono::{DateTime, Utc};
use serde_json::Value;

/// Account snapshot taken while processing a block
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub address: String,
    pub evm_address: Option<String>,
    pub free_balance: String,
    pub locked_balance: String,
    pub available_balance: String,
    pub reserved_balance: String,
    pub voting_balance: String,
    pub vested_balance: String,
    pub identity: Value,
    pub nonce: u64,
    pub evm_nonce: u64,
    /// Last block that touched the account
    pub block_id: u64,
    /// `false` marks a reaped account kept as a tombstone
    pub active: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderKind {
    Account,
    Contract,
}

impl HolderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HolderKind::Account => "Account",
            HolderKind::Contract => "Contract",
        }
    }
}

/// Absolute balance snapshot of one (holder, token, nft) triple
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHolder {
    /// Native address when the holder is an account
    pub signer_address: Option<String>,
    /// EVM address when the holder is a contract or unlinked EVM address
    pub evm_address: Option<String>,
    pub token_address: String,
    pub nft_id: Option<String>,
    pub kind: HolderKind,
    pub balance: String,
    pub info: Option<Value>,
    pub block_id: u64,
    pub timestamp: DateTime<Utc>,
}

impl TokenHolder {
    /// The identity the row is keyed on: the native address, else the EVM address
    pub fn holder_key(&self) -> &str {
        self.signer_address
            .as_deref()
            .or(self.evm_address.as_deref())
            .unwrap_or_default()
    }
}
