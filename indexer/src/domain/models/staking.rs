use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakingKind {
    Reward,
    Slash,
}

impl StakingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StakingKind::Reward => "Reward",
            StakingKind::Slash => "Slash",
        }
    }
}

/// Staking reward or slash. `era` and `validator_stash_address` stay `None` when
/// attribution could not resolve them.
#[derive(Debug, Clone, PartialEq)]
pub struct StakingRecord {
    pub block_id: u64,
    pub event_index: u32,
    pub signer_address: String,
    pub amount: String,
    pub era: Option<u32>,
    pub validator_stash_address: Option<String>,
    pub kind: StakingKind,
    pub timestamp: DateTime<Utc>,
}
