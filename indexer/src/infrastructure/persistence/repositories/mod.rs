pub mod account_repository;
pub mod block_repository;
pub mod contract_repository;
pub mod extrinsic_repository;
pub mod runtime_repository;
pub mod staking_repository;
pub mod transfer_repository;

pub use account_repository::AccountRepository;
pub use block_repository::BlockRepository;
pub use contract_repository::ContractRepository;
pub use extrinsic_repository::ExtrinsicRepository;
pub use runtime_repository::RuntimeRepository;
pub use staking_repository::StakingRepository;
pub use transfer_repository::TransferRepository;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::models::{
    Account, Block, BlockLog, Contract, ContractOwnerChange, Event, EvmEvent, Extrinsic,
    RuntimeVersionRecord, StakingRecord, TokenHolder, Transfer,
};
use crate::infrastructure::persistence::error::DbError;

/// Rows per insert statement
pub(crate) const BATCH_SIZE: usize = 500;

/// Write boundary of the index. Every upsert is idempotent on its key.
#[async_trait]
pub trait IndexRepository: Send + Sync + std::fmt::Debug {
    /// Insert or replace blocks; `finalized` never goes from true to false
    async fn upsert_blocks(&self, rows: &[Block]) -> Result<(), DbError>;

    /// Insert blocks whose id is not stored yet; existing rows are left untouched
    async fn insert_placeholder_blocks(&self, rows: &[Block]) -> Result<(), DbError>;

    /// Flip blocks `from_id..=to_id` to finalized
    async fn finalize_blocks_in_range(&self, from_id: u64, to_id: u64) -> Result<u64, DbError>;

    async fn delete_unfinished_blocks(&self) -> Result<u64, DbError>;

    /// Drop the unfinalized row of block `id` and everything derived from it when its hash
    /// differs from `hash`. Returns whether a row was removed.
    async fn delete_stale_block(&self, id: u64, hash: &str) -> Result<bool, DbError>;

    /// Highest finalized block id, `None` on an empty index
    async fn last_persisted_finalized_id(&self) -> Result<Option<u64>, DbError>;

    async fn upsert_extrinsics(&self, rows: &[Extrinsic]) -> Result<(), DbError>;

    async fn upsert_events(&self, rows: &[Event]) -> Result<(), DbError>;

    async fn upsert_logs(&self, rows: &[BlockLog]) -> Result<(), DbError>;

    /// Keyed by (block id, event index, batch index)
    async fn upsert_transfers(&self, rows: &[Transfer]) -> Result<(), DbError>;

    /// Keyed by address
    async fn upsert_accounts(&self, rows: &[Account]) -> Result<(), DbError>;

    /// Keyed by (holder, token, nft)
    async fn upsert_token_holders(&self, rows: &[TokenHolder]) -> Result<(), DbError>;

    /// Keyed by (block id, event index)
    async fn upsert_staking_records(&self, rows: &[StakingRecord]) -> Result<(), DbError>;

    /// Insert contracts not stored yet; existing rows are left untouched
    async fn upsert_contracts(&self, rows: &[Contract]) -> Result<(), DbError>;

    async fn mark_contracts_published(&self, addresses: &[String]) -> Result<(), DbError>;

    async fn update_contract_owners(&self, changes: &[ContractOwnerChange])
        -> Result<(), DbError>;

    async fn known_contracts(&self, addresses: &[String]) -> Result<HashSet<String>, DbError>;

    async fn upsert_evm_events(&self, rows: &[EvmEvent]) -> Result<(), DbError>;

    async fn upsert_runtime(&self, record: &RuntimeVersionRecord) -> Result<(), DbError>;
}

/// Collection of all repositories
#[derive(Clone, Debug)]
pub struct Repositories {
    /// Repository for block and block log operations
    pub block: BlockRepository,
    /// Repository for extrinsic and event operations
    pub extrinsic: ExtrinsicRepository,
    /// Repository for transfer operations
    pub transfer: TransferRepository,
    /// Repository for account and token holder operations
    pub account: AccountRepository,
    /// Repository for staking operations
    pub staking: StakingRepository,
    /// Repository for contract and EVM event operations
    pub contract: ContractRepository,
    /// Repository for runtime version operations
    pub runtime: RuntimeRepository,
}

impl Repositories {
    /// Create a new Repositories instance
    pub fn new(
        block: BlockRepository,
        extrinsic: ExtrinsicRepository,
        transfer: TransferRepository,
        account: AccountRepository,
        staking: StakingRepository,
        contract: ContractRepository,
        runtime: RuntimeRepository,
    ) -> Self {
        Self {
            block,
            extrinsic,
            transfer,
            account,
            staking,
            contract,
            runtime,
        }
    }
}

#[async_trait]
impl IndexRepository for Repositories {
    async fn upsert_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        self.block.upsert_blocks(rows).await
    }

    async fn insert_placeholder_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        self.block.insert_placeholder_blocks(rows).await
    }

    async fn finalize_blocks_in_range(&self, from_id: u64, to_id: u64) -> Result<u64, DbError> {
        self.block.finalize_blocks_in_range(from_id, to_id).await
    }

    async fn delete_unfinished_blocks(&self) -> Result<u64, DbError> {
        self.block.delete_unfinished_blocks().await
    }

    async fn delete_stale_block(&self, id: u64, hash: &str) -> Result<bool, DbError> {
        self.block.delete_stale_block(id, hash).await
    }

    async fn last_persisted_finalized_id(&self) -> Result<Option<u64>, DbError> {
        self.block.last_finalized_id().await
    }

    async fn upsert_extrinsics(&self, rows: &[Extrinsic]) -> Result<(), DbError> {
        self.extrinsic.upsert_extrinsics(rows).await
    }

    async fn upsert_events(&self, rows: &[Event]) -> Result<(), DbError> {
        self.extrinsic.upsert_events(rows).await
    }

    async fn upsert_logs(&self, rows: &[BlockLog]) -> Result<(), DbError> {
        self.block.upsert_logs(rows).await
    }

    async fn upsert_transfers(&self, rows: &[Transfer]) -> Result<(), DbError> {
        self.transfer.upsert_transfers(rows).await
    }

    async fn upsert_accounts(&self, rows: &[Account]) -> Result<(), DbError> {
        self.account.upsert_accounts(rows).await
    }

    async fn upsert_token_holders(&self, rows: &[TokenHolder]) -> Result<(), DbError> {
        self.account.upsert_token_holders(rows).await
    }

    async fn upsert_staking_records(&self, rows: &[StakingRecord]) -> Result<(), DbError> {
        self.staking.upsert_staking_records(rows).await
    }

    async fn upsert_contracts(&self, rows: &[Contract]) -> Result<(), DbError> {
        self.contract.upsert_contracts(rows).await
    }

    async fn mark_contracts_published(&self, addresses: &[String]) -> Result<(), DbError> {
        self.contract.mark_contracts_published(addresses).await
    }

    async fn update_contract_owners(
        &self,
        changes: &[ContractOwnerChange],
    ) -> Result<(), DbError> {
        self.contract.update_contract_owners(changes).await
    }

    async fn known_contracts(&self, addresses: &[String]) -> Result<HashSet<String>, DbError> {
        self.contract.known_contracts(addresses).await
    }

    async fn upsert_evm_events(&self, rows: &[EvmEvent]) -> Result<(), DbError> {
        self.contract.upsert_evm_events(rows).await
    }

    async fn upsert_runtime(&self, record: &RuntimeVersionRecord) -> Result<(), DbError> {
        self.runtime.upsert_runtime(record).await
    }
}
