//! In-memory index with the same key semantics as the database repositories.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::domain::models::{
    Account, Block, BlockLog, Contract, ContractOwnerChange, Event, EvmEvent, Extrinsic,
    RuntimeVersionRecord, StakingRecord, TokenHolder, Transfer,
};
use crate::infrastructure::persistence::error::DbError;
use crate::infrastructure::persistence::repositories::IndexRepository;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    blocks: BTreeMap<u64, Block>,
    logs: BTreeMap<(u64, u32), BlockLog>,
    extrinsics: BTreeMap<i64, Extrinsic>,
    events: BTreeMap<i64, Event>,
    transfers: BTreeMap<(u64, u32, u32), Transfer>,
    accounts: BTreeMap<String, Account>,
    token_holders: BTreeMap<(String, String, String), TokenHolder>,
    staking: BTreeMap<(u64, u32), StakingRecord>,
    contracts: BTreeMap<String, Contract>,
    evm_events: BTreeMap<i64, EvmEvent>,
    runtimes: BTreeMap<u32, RuntimeVersionRecord>,
    failing_writes: usize,
    /// Every `finalized` value ever written per block, for monotonicity checks
    finalized_history: BTreeMap<u64, Vec<bool>>,
}

impl MemoryState {
    /// Removes block `id` with the rows that reference it, like the `block` foreign keys do
    fn remove_block(&mut self, id: u64) {
        self.blocks.remove(&id);
        self.logs.retain(|_, row| row.block_id != id);
        self.extrinsics.retain(|_, row| row.block_id != id);
        self.events.retain(|_, row| row.block_id != id);
        self.transfers.retain(|_, row| row.block_id != id);
        self.staking.retain(|_, row| row.block_id != id);
        self.evm_events.retain(|_, row| row.block_id != id);
    }
}

/// Index kept in memory
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        let state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, DbError> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(DbError::Query("injected write failure".to_string()));
        }
        Ok(f(&mut state))
    }

    /// The next `count` writes fail
    pub fn fail_next_writes(&self, count: usize) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.failing_writes = count;
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read(|s| s.blocks.values().cloned().collect())
    }

    pub fn block(&self, id: u64) -> Option<Block> {
        self.read(|s| s.blocks.get(&id).cloned())
    }

    /// Ids of finalized blocks in ascending order
    pub fn finalized_ids(&self) -> Vec<u64> {
        self.read(|s| {
            s.blocks
                .values()
                .filter(|b| b.finalized)
                .map(|b| b.id)
                .collect()
        })
    }

    /// Whether some block went back from finalized to unfinalized at any point
    pub fn finalization_ever_reverted(&self) -> bool {
        self.read(|s| {
            s.finalized_history
                .values()
                .any(|history| history.windows(2).any(|w| w[0] && !w[1]))
        })
    }

    pub fn extrinsics(&self) -> Vec<Extrinsic> {
        self.read(|s| s.extrinsics.values().cloned().collect())
    }

    pub fn events(&self) -> Vec<Event> {
        self.read(|s| s.events.values().cloned().collect())
    }

    pub fn logs(&self) -> Vec<BlockLog> {
        self.read(|s| s.logs.values().cloned().collect())
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.read(|s| s.transfers.values().cloned().collect())
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.read(|s| s.accounts.values().cloned().collect())
    }

    pub fn account(&self, address: &str) -> Option<Account> {
        self.read(|s| s.accounts.get(address).cloned())
    }

    pub fn token_holders(&self) -> Vec<TokenHolder> {
        self.read(|s| s.token_holders.values().cloned().collect())
    }

    pub fn staking_records(&self) -> Vec<StakingRecord> {
        self.read(|s| s.staking.values().cloned().collect())
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.read(|s| s.contracts.values().cloned().collect())
    }

    pub fn evm_events(&self) -> Vec<EvmEvent> {
        self.read(|s| s.evm_events.values().cloned().collect())
    }

    pub fn runtimes(&self) -> Vec<RuntimeVersionRecord> {
        self.read(|s| s.runtimes.values().cloned().collect())
    }
}

fn holder_key(row: &TokenHolder) -> (String, String, String) {
    (
        row.holder_key().to_string(),
        row.token_address.clone(),
        row.nft_id.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl IndexRepository for MemoryRepository {
    async fn upsert_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                let mut row = row.clone();
                if let Some(existing) = s.blocks.get(&row.id) {
                    row.finalized |= existing.finalized;
                }
                s.finalized_history
                    .entry(row.id)
                    .or_default()
                    .push(row.finalized);
                s.blocks.insert(row.id, row);
            }
        })
    }

    async fn insert_placeholder_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                if !s.blocks.contains_key(&row.id) {
                    s.finalized_history
                        .entry(row.id)
                        .or_default()
                        .push(row.finalized);
                    s.blocks.insert(row.id, row.clone());
                }
            }
        })
    }

    async fn finalize_blocks_in_range(&self, from_id: u64, to_id: u64) -> Result<u64, DbError> {
        self.write(|s| {
            let mut updated = 0;
            for (id, block) in s.blocks.range_mut(from_id..=to_id) {
                if !block.finalized {
                    block.finalized = true;
                    s.finalized_history.entry(*id).or_default().push(true);
                    updated += 1;
                }
            }
            updated
        })
    }

    async fn delete_unfinished_blocks(&self) -> Result<u64, DbError> {
        self.write(|s| {
            let unfinished: Vec<u64> = s
                .blocks
                .values()
                .filter(|block| !block.finalized)
                .map(|block| block.id)
                .collect();
            for id in &unfinished {
                s.remove_block(*id);
            }
            unfinished.len() as u64
        })
    }

    async fn delete_stale_block(&self, id: u64, hash: &str) -> Result<bool, DbError> {
        self.write(|s| {
            let stale = s
                .blocks
                .get(&id)
                .map_or(false, |block| !block.finalized && block.hash != hash);
            if stale {
                s.remove_block(id);
            }
            stale
        })
    }

    async fn last_persisted_finalized_id(&self) -> Result<Option<u64>, DbError> {
        Ok(self.read(|s| {
            s.blocks
                .values()
                .rev()
                .find(|b| b.finalized)
                .map(|b| b.id)
        }))
    }

    async fn upsert_extrinsics(&self, rows: &[Extrinsic]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.extrinsics.insert(row.id, row.clone());
            }
        })
    }

    async fn upsert_events(&self, rows: &[Event]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.events.insert(row.id, row.clone());
            }
        })
    }

    async fn upsert_logs(&self, rows: &[BlockLog]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.logs.insert((row.block_id, row.index), row.clone());
            }
        })
    }

    async fn upsert_transfers(&self, rows: &[Transfer]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.transfers
                    .insert((row.block_id, row.event_index, row.batch_index), row.clone());
            }
        })
    }

    async fn upsert_accounts(&self, rows: &[Account]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                let newer = s
                    .accounts
                    .get(&row.address)
                    .map_or(true, |existing| row.block_id >= existing.block_id);
                if newer {
                    s.accounts.insert(row.address.clone(), row.clone());
                }
            }
        })
    }

    async fn upsert_token_holders(&self, rows: &[TokenHolder]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                let key = holder_key(row);
                let newer = s
                    .token_holders
                    .get(&key)
                    .map_or(true, |existing| row.block_id >= existing.block_id);
                if newer {
                    s.token_holders.insert(key, row.clone());
                }
            }
        })
    }

    async fn upsert_staking_records(&self, rows: &[StakingRecord]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.staking.insert((row.block_id, row.event_index), row.clone());
            }
        })
    }

    async fn upsert_contracts(&self, rows: &[Contract]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.contracts
                    .entry(row.address.clone())
                    .or_insert_with(|| row.clone());
            }
        })
    }

    async fn mark_contracts_published(&self, addresses: &[String]) -> Result<(), DbError> {
        self.write(|s| {
            for address in addresses {
                if let Some(contract) = s.contracts.get_mut(address) {
                    contract.published = true;
                }
            }
        })
    }

    async fn update_contract_owners(
        &self,
        changes: &[ContractOwnerChange],
    ) -> Result<(), DbError> {
        self.write(|s| {
            for change in changes {
                if let Some(contract) = s.contracts.get_mut(&change.address) {
                    contract.owner = Some(change.owner.clone());
                }
            }
        })
    }

    async fn known_contracts(&self, addresses: &[String]) -> Result<HashSet<String>, DbError> {
        Ok(self.read(|s| {
            addresses
                .iter()
                .filter(|address| s.contracts.contains_key(*address))
                .cloned()
                .collect()
        }))
    }

    async fn upsert_evm_events(&self, rows: &[EvmEvent]) -> Result<(), DbError> {
        self.write(|s| {
            for row in rows {
                s.evm_events.insert(row.event_id, row.clone());
            }
        })
    }

    async fn upsert_runtime(&self, record: &RuntimeVersionRecord) -> Result<(), DbError> {
        self.write(|s| {
            s.runtimes
                .entry(record.spec_version)
                .and_modify(|existing| existing.block_id = existing.block_id.min(record.block_id))
                .or_insert_with(|| record.clone());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(id: u64, finalized: bool) -> Block {
        Block {
            finalized,
            ..Block::placeholder(id, format!("0x{:02x}", id))
        }
    }

    #[tokio::test]
    async fn test_finalized_flag_never_reverts() {
        let repo = MemoryRepository::new();
        repo.upsert_blocks(&[block(1, true)]).await.unwrap();
        repo.upsert_blocks(&[block(1, false)]).await.unwrap();

        assert!(repo.block(1).unwrap().finalized);
        assert!(!repo.finalization_ever_reverted());
    }

    #[tokio::test]
    async fn test_delete_unfinished_and_last_finalized() {
        let repo = MemoryRepository::new();
        assert_eq!(repo.last_persisted_finalized_id().await.unwrap(), None);

        repo.upsert_blocks(&[block(1, true), block(2, true), block(3, false)])
            .await
            .unwrap();
        assert_eq!(repo.last_persisted_finalized_id().await.unwrap(), Some(2));
        assert_eq!(repo.delete_unfinished_blocks().await.unwrap(), 1);
        assert!(repo.block(3).is_none());
    }

    #[tokio::test]
    async fn test_stale_block_is_dropped_with_its_rows() {
        let repo = MemoryRepository::new();
        repo.upsert_blocks(&[block(7, false), block(8, true)])
            .await
            .unwrap();
        repo.upsert_logs(&[BlockLog {
            block_id: 7,
            index: 0,
            kind: "PreRuntime".into(),
            data: serde_json::json!("0x00"),
        }])
        .await
        .unwrap();

        // same hash keeps the row
        assert!(!repo.delete_stale_block(7, "0x07").await.unwrap());
        assert_eq!(repo.logs().len(), 1);
        // finalized rows are never dropped
        assert!(!repo.delete_stale_block(8, "0xother").await.unwrap());

        assert!(repo.delete_stale_block(7, "0xother").await.unwrap());
        assert!(repo.block(7).is_none());
        assert!(repo.logs().is_empty());
        assert!(repo.block(8).is_some());
    }

    #[tokio::test]
    async fn test_finalize_range_is_inclusive() {
        let repo = MemoryRepository::new();
        repo.upsert_blocks(&[block(1, false), block(2, false), block(3, false)])
            .await
            .unwrap();
        assert_eq!(repo.finalize_blocks_in_range(1, 2).await.unwrap(), 2);
        assert_eq!(repo.finalized_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_placeholder_never_replaces_a_stored_block() {
        let repo = MemoryRepository::new();
        let full = Block {
            author: "5Author".into(),
            ..block(4, false)
        };
        repo.upsert_blocks(&[full]).await.unwrap();
        repo.insert_placeholder_blocks(&[block(4, false), block(5, false)])
            .await
            .unwrap();

        assert_eq!(repo.block(4).unwrap().author, "5Author");
        assert!(repo.block(5).is_some());
    }

    #[tokio::test]
    async fn test_older_account_snapshot_does_not_overwrite_newer() {
        let repo = MemoryRepository::new();
        let account = |block_id: u64, free: &str| Account {
            address: "5A".into(),
            evm_address: None,
            free_balance: free.into(),
            locked_balance: "0".into(),
            available_balance: free.into(),
            reserved_balance: "0".into(),
            voting_balance: free.into(),
            vested_balance: "0".into(),
            identity: serde_json::Value::Null,
            nonce: 0,
            evm_nonce: 0,
            block_id,
            active: true,
            timestamp: Utc::now(),
        };
        repo.upsert_accounts(&[account(10, "100")]).await.unwrap();
        repo.upsert_accounts(&[account(9, "90")]).await.unwrap();
        assert_eq!(repo.account("5A").unwrap().free_balance, "100");
    }

    #[tokio::test]
    async fn test_injected_write_failures() {
        let repo = MemoryRepository::new();
        repo.fail_next_writes(1);
        assert!(repo.upsert_blocks(&[block(1, true)]).await.is_err());
        assert!(repo.upsert_blocks(&[block(1, true)]).await.is_ok());
    }
}
