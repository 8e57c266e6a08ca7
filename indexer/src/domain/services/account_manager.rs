//! Per-block account cache.
//!
//! One manager lives for one block-processing pass. Every address touched by the block is
//! fetched at most once, even when concurrent resolvers ask for it at the same time, and
//! `save` writes all snapshots in one batch.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

use crate::domain::models::{Account, HolderKind, TokenHolder};
use crate::domain::services::evm_abi::is_zero_address;
use crate::infrastructure::node::{NodeConnectionPool, NodeError};
use crate::infrastructure::persistence::{DbError, IndexRepository};

/// Returned by [`AccountManager::use_evm`] for EVM addresses without a linked account
pub const NO_LINKED_ACCOUNT: &str = "0x";

pub fn is_sentinel(address: &str) -> bool {
    address == NO_LINKED_ACCOUNT
}

#[derive(Debug, Default)]
struct Slot {
    snapshot: OnceCell<Account>,
    /// Event index and outcome of the latest lifecycle event for the address this pass
    lifecycle: Mutex<Option<(u32, bool)>>,
}

impl Slot {
    fn record_lifecycle(&self, event_index: u32, active: bool) {
        let mut lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = *lifecycle;
        if current.map_or(true, |(latest, _)| event_index >= latest) {
            *lifecycle = Some((event_index, active));
        }
    }

    fn is_active(&self) -> bool {
        let lifecycle = self
            .lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lifecycle.map_or(true, |(_, active)| active)
    }
}

/// Native token metadata attached to native holder rows
#[derive(Debug, Clone)]
pub struct NativeToken {
    pub address: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl NativeToken {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            name: "Selendra".to_string(),
            symbol: "SEL".to_string(),
            decimals: 18,
        }
    }
}

#[derive(Debug)]
pub struct AccountManager {
    block_id: u64,
    block_hash: String,
    timestamp: DateTime<Utc>,
    pool: Arc<NodeConnectionPool>,
    native_token: NativeToken,
    accounts: Mutex<HashMap<String, Arc<Slot>>>,
    evm_links: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl AccountManager {
    pub fn new(
        block_id: u64,
        block_hash: &str,
        timestamp: DateTime<Utc>,
        pool: Arc<NodeConnectionPool>,
        native_token: NativeToken,
    ) -> Self {
        Self {
            block_id,
            block_hash: block_hash.to_string(),
            timestamp,
            pool,
            native_token,
            accounts: Mutex::new(HashMap::new()),
            evm_links: Mutex::new(HashMap::new()),
        }
    }

    pub fn block_hash(&self) -> &str {
        &self.block_hash
    }

    fn slot(&self, address: &str) -> Arc<Slot> {
        let mut accounts = self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        accounts.entry(address.to_string()).or_default().clone()
    }

    /// Registers an address and returns its snapshot, fetching it on first use only.
    pub async fn use_account(&self, address: &str) -> Result<Account, NodeError> {
        self.snapshot_of(address, self.slot(address)).await
    }

    /// Registers an address touched by the lifecycle event at `event_index`.
    ///
    /// Of all lifecycle events for one address in the pass, the highest-indexed one decides
    /// whether the account is saved as active or as a reaped tombstone, whatever order the
    /// events are resolved in.
    pub async fn use_account_at(
        &self,
        address: &str,
        event_index: u32,
        active: bool,
    ) -> Result<Account, NodeError> {
        let slot = self.slot(address);
        slot.record_lifecycle(event_index, active);
        self.snapshot_of(address, slot).await
    }

    async fn snapshot_of(&self, address: &str, slot: Arc<Slot>) -> Result<Account, NodeError> {
        let snapshot = slot
            .snapshot
            .get_or_try_init(|| self.fetch_account(address))
            .await?;
        Ok(Account {
            active: slot.is_active(),
            ..snapshot.clone()
        })
    }

    /// Resolves an EVM address to its linked native account, or [`NO_LINKED_ACCOUNT`].
    ///
    /// The zero address and contracts have no linked account. A linked account is registered
    /// like any other used address.
    pub async fn use_evm(&self, evm_address: &str) -> Result<String, NodeError> {
        let evm_address = evm_address.to_ascii_lowercase();
        if is_zero_address(&evm_address) {
            return Ok(NO_LINKED_ACCOUNT.to_string());
        }

        let cell = {
            let mut links = self
                .evm_links
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            links.entry(evm_address.clone()).or_default().clone()
        };

        let native = cell
            .get_or_try_init(|| async {
                let at = self.block_hash.clone();
                let address = evm_address.clone();
                let native = self
                    .pool
                    .query(move |node| {
                        let at = at.clone();
                        let address = address.clone();
                        async move { node.native_address_of(&address, Some(&at)).await }
                    })
                    .await?;
                Ok::<_, NodeError>(native.unwrap_or_else(|| NO_LINKED_ACCOUNT.to_string()))
            })
            .await?
            .clone();

        if !is_sentinel(&native) {
            self.use_account(&native).await?;
        }
        Ok(native)
    }

    async fn fetch_account(&self, address: &str) -> Result<Account, NodeError> {
        let at = self.block_hash.clone();
        let addr = address.to_string();

        let balances = {
            let (at, addr) = (at.clone(), addr.clone());
            self.pool.query(move |node| {
                let (at, addr) = (at.clone(), addr.clone());
                async move { node.balances_all(&addr, Some(&at)).await }
            })
        };
        let identity = {
            let (at, addr) = (at.clone(), addr.clone());
            self.pool.query(move |node| {
                let (at, addr) = (at.clone(), addr.clone());
                async move { node.account_identity(&addr, Some(&at)).await }
            })
        };
        let evm_address = {
            let (at, addr) = (at.clone(), addr.clone());
            self.pool.query(move |node| {
                let (at, addr) = (at.clone(), addr.clone());
                async move { node.evm_address_of(&addr, Some(&at)).await }
            })
        };
        let (balances, identity, evm_address) = tokio::try_join!(balances, identity, evm_address)?;

        let evm_nonce = match &evm_address {
            Some(evm) => {
                let evm = evm.clone();
                self.pool
                    .query(move |node| {
                        let (at, evm) = (at.clone(), evm.clone());
                        async move { node.evm_nonce(&evm, Some(&at)).await }
                    })
                    .await?
            }
            None => 0,
        };

        Ok(Account {
            address: addr,
            evm_address,
            free_balance: balances.free,
            locked_balance: balances.locked,
            available_balance: balances.available,
            reserved_balance: balances.reserved,
            voting_balance: balances.voting,
            vested_balance: balances.vested,
            identity,
            nonce: balances.nonce,
            evm_nonce,
            block_id: self.block_id,
            active: true,
            timestamp: self.timestamp,
        })
    }

    /// Snapshots collected so far, ordered by address
    pub fn snapshots(&self) -> Vec<Account> {
        let accounts = self
            .accounts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut snapshots: Vec<Account> = accounts
            .values()
            .filter_map(|slot| {
                slot.snapshot.get().map(|snapshot| Account {
                    active: slot.is_active(),
                    ..snapshot.clone()
                })
            })
            .collect();
        snapshots.sort_by(|a, b| a.address.cmp(&b.address));
        snapshots
    }

    /// Native-token holder row derived from an account's free balance
    pub fn native_holder(&self, account: &Account) -> TokenHolder {
        TokenHolder {
            signer_address: Some(account.address.clone()),
            evm_address: account.evm_address.clone(),
            token_address: self.native_token.address.clone(),
            nft_id: None,
            kind: HolderKind::Account,
            balance: account.free_balance.clone(),
            info: Some(json!({
                "decimals": self.native_token.decimals,
                "symbol": self.native_token.symbol,
                "name": self.native_token.name,
            })),
            block_id: self.block_id,
            timestamp: self.timestamp,
        }
    }

    /// Writes every snapshot and its native-token holder row
    pub async fn save(&self, repository: &dyn IndexRepository) -> Result<usize, DbError> {
        let accounts = self.snapshots();
        if accounts.is_empty() {
            return Ok(0);
        }
        let holders: Vec<TokenHolder> = accounts.iter().map(|a| self.native_holder(a)).collect();
        repository.upsert_accounts(&accounts).await?;
        repository.upsert_token_holders(&holders).await?;
        Ok(accounts.len())
    }
}
