use chrono::{DateTime, Utc};

/// Deployed EVM contract
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub address: String,
    pub extrinsic_id: Option<i64>,
    pub block_id: u64,
    /// Native address of the maintainer, when it could be resolved
    pub maintainer: Option<String>,
    pub bytecode: String,
    /// Constructor and runtime code
    pub context: String,
    /// Trailing constructor arguments and compiler metadata
    pub args: String,
    pub gas_limit: Option<String>,
    pub storage_limit: Option<String>,
    pub published: bool,
    pub owner: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractOwnerChange {
    pub address: String,
    pub owner: String,
}
