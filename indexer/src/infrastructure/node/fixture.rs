//! In-memory chain node for dry runs and tests.
//!
//! Blocks, storage answers and heads are set by the caller. Individual block ids can be made to
//! fail a number of times, and every call is counted per method.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::watch;

use super::{ChainNode, HeadStream, NodeError};
use crate::domain::models::chain::{
    AccountBalances, BlockHeader, ChainExtrinsic, EventRecord, NodeHealth, Phase,
    RewardDestination, RuntimeVersion, SignedBlock,
};

#[derive(Debug, Clone)]
struct FixtureBlock {
    block: SignedBlock,
    events: Vec<EventRecord>,
    timestamp: u64,
}

#[derive(Debug, Default)]
struct FixtureState {
    blocks: BTreeMap<u64, FixtureBlock>,
    hashes: HashMap<String, u64>,
    balances: HashMap<String, AccountBalances>,
    identities: HashMap<String, Value>,
    reward_destinations: HashMap<String, RewardDestination>,
    evm_by_native: HashMap<String, String>,
    native_by_evm: HashMap<String, String>,
    evm_nonces: HashMap<String, u64>,
    maintainers: HashMap<String, String>,
    erc_balances: HashMap<(String, String, Option<String>), String>,
    runtime: Option<RuntimeVersion>,
    syncing: bool,
    failing_blocks: HashMap<u64, usize>,
    corrupt_blocks: HashMap<u64, usize>,
    offline: bool,
    calls: HashMap<&'static str, usize>,
}

/// Chain node answering from in-memory fixtures
#[derive(Debug)]
pub struct FixtureNode {
    name: String,
    state: Mutex<FixtureState>,
    best_head: watch::Sender<u64>,
    finalized_head: watch::Sender<u64>,
}

/// Deterministic hash used for fixture block ids
pub fn block_hash_for(id: u64) -> String {
    format!("0x{:064x}", id)
}

/// Builds a decoded extrinsic
pub fn extrinsic(
    index: u32,
    section: &str,
    method: &str,
    signer: Option<&str>,
    args: Value,
) -> ChainExtrinsic {
    ChainExtrinsic {
        index,
        hash: format!("0x{:064x}", 0xe000_0000u64 + index as u64),
        section: section.to_string(),
        method: method.to_string(),
        signer: signer.map(str::to_string),
        args,
        nonce: signer.map(|_| 0),
        tip: None,
        info: signer.map(|_| serde_json::json!({ "partialFee": "1000", "class": "Normal" })),
    }
}

/// Builds a decoded event
pub fn event(index: u32, section: &str, method: &str, data: Vec<Value>, phase: Phase) -> EventRecord {
    EventRecord {
        index,
        section: section.to_string(),
        method: method.to_string(),
        data,
        phase,
    }
}

/// Header of fixture block `id` chained onto `id - 1`
pub fn header(id: u64) -> BlockHeader {
    BlockHeader {
        number: id,
        hash: block_hash_for(id),
        parent_hash: block_hash_for(id.saturating_sub(1)),
        state_root: format!("0x{:064x}", id + 0x5000),
        extrinsics_root: format!("0x{:064x}", id + 0xe000),
        author: Some("5FixtureAuthor".to_string()),
        logs: Vec::new(),
    }
}

impl FixtureNode {
    pub fn new(name: &str) -> Self {
        let (best_head, _) = watch::channel(0);
        let (finalized_head, _) = watch::channel(0);
        Self {
            name: name.to_string(),
            state: Mutex::new(FixtureState::default()),
            best_head,
            finalized_head,
        }
    }

    /// A node serving `count` empty blocks (ids `0..count`), all finalized
    pub fn with_empty_chain(name: &str, count: u64) -> Self {
        let node = Self::new(name);
        for id in 0..count {
            node.insert_block(
                SignedBlock {
                    header: header(id),
                    extrinsics: Vec::new(),
                },
                Vec::new(),
                1_600_000_000_000 + id * 6_000,
            );
        }
        let head = count.saturating_sub(1);
        node.set_heads(head, head);
        node
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FixtureState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn record_call(&self, method: &'static str) -> Result<(), NodeError> {
        self.with_state(|state| {
            *state.calls.entry(method).or_default() += 1;
            if state.offline {
                Err(NodeError::ConnectionLost(format!("{} is offline", self.name)))
            } else {
                Ok(())
            }
        })
    }

    pub fn insert_block(&self, block: SignedBlock, events: Vec<EventRecord>, timestamp: u64) {
        self.with_state(|state| {
            state.hashes.insert(block.header.hash.clone(), block.header.number);
            state.blocks.insert(
                block.header.number,
                FixtureBlock {
                    block,
                    events,
                    timestamp,
                },
            );
        });
    }

    pub fn set_heads(&self, best: u64, finalized: u64) {
        self.best_head.send_replace(best);
        self.finalized_head.send_replace(finalized);
    }

    pub fn set_balances(&self, address: &str, balances: AccountBalances) {
        self.with_state(|state| state.balances.insert(address.to_string(), balances));
    }

    pub fn set_identity(&self, address: &str, identity: Value) {
        self.with_state(|state| state.identities.insert(address.to_string(), identity));
    }

    pub fn set_reward_destination(&self, address: &str, destination: RewardDestination) {
        self.with_state(|state| {
            state
                .reward_destinations
                .insert(address.to_string(), destination)
        });
    }

    /// Links a native account and an EVM address in both directions
    pub fn link_evm(&self, native: &str, evm: &str) {
        self.with_state(|state| {
            state
                .evm_by_native
                .insert(native.to_string(), evm.to_ascii_lowercase());
            state
                .native_by_evm
                .insert(evm.to_ascii_lowercase(), native.to_string());
        });
    }

    pub fn set_evm_nonce(&self, evm: &str, nonce: u64) {
        self.with_state(|state| state.evm_nonces.insert(evm.to_ascii_lowercase(), nonce));
    }

    pub fn set_maintainer(&self, contract: &str, maintainer_evm: &str) {
        self.with_state(|state| {
            state
                .maintainers
                .insert(contract.to_ascii_lowercase(), maintainer_evm.to_ascii_lowercase())
        });
    }

    pub fn set_erc_balance(&self, contract: &str, holder: &str, token_id: Option<&str>, balance: &str) {
        self.with_state(|state| {
            state.erc_balances.insert(
                (
                    contract.to_ascii_lowercase(),
                    holder.to_ascii_lowercase(),
                    token_id.map(str::to_string),
                ),
                balance.to_string(),
            )
        });
    }

    pub fn set_runtime(&self, runtime: RuntimeVersion) {
        self.with_state(|state| state.runtime = Some(runtime));
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.with_state(|state| state.syncing = syncing);
    }

    /// Every query fails with a lost connection while offline
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    /// The next `times` hash lookups of block `id` fail with an RPC error
    pub fn fail_block(&self, id: u64, times: usize) {
        self.with_state(|state| state.failing_blocks.insert(id, times));
    }

    /// The next `times` body reads of block `id` return an undecodable response
    pub fn corrupt_block(&self, id: u64, times: usize) {
        self.with_state(|state| state.corrupt_blocks.insert(id, times));
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.with_state(|state| state.calls.get(method).copied().unwrap_or(0))
    }

    fn block_by_hash(&self, hash: &str) -> Result<FixtureBlock, NodeError> {
        self.with_state(|state| {
            state
                .hashes
                .get(hash)
                .and_then(|id| state.blocks.get(id))
                .cloned()
                .ok_or_else(|| NodeError::NotFound(format!("block {}", hash)))
        })
    }

    fn head_stream(receiver: watch::Receiver<u64>) -> HeadStream {
        futures::stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let head = *receiver.borrow_and_update();
            Some((Ok(head), (receiver, false)))
        })
        .boxed()
    }
}

#[async_trait]
impl ChainNode for FixtureNode {
    fn provider_name(&self) -> String {
        format!("Fixture ({})", self.name)
    }

    async fn block_hash(&self, id: u64) -> Result<String, NodeError> {
        self.record_call("block_hash")?;
        self.with_state(|state| {
            if let Some(remaining) = state.failing_blocks.get_mut(&id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(NodeError::Rpc(format!("injected failure for block {}", id)));
                }
            }
            state
                .blocks
                .get(&id)
                .map(|b| b.block.header.hash.clone())
                .ok_or_else(|| NodeError::NotFound(format!("block {}", id)))
        })
    }

    async fn block_body(&self, hash: &str) -> Result<SignedBlock, NodeError> {
        self.record_call("block_body")?;
        self.with_state(|state| {
            let id = state.hashes.get(hash).copied();
            match id.and_then(|id| state.corrupt_blocks.get_mut(&id)) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(NodeError::Decode(format!("injected garbage for block {}", hash)))
                }
                _ => Ok(()),
            }
        })?;
        Ok(self.block_by_hash(hash)?.block)
    }

    async fn events_at(&self, hash: &str) -> Result<Vec<EventRecord>, NodeError> {
        self.record_call("events_at")?;
        Ok(self.block_by_hash(hash)?.events)
    }

    async fn timestamp_at(&self, hash: &str) -> Result<u64, NodeError> {
        self.record_call("timestamp_at")?;
        Ok(self.block_by_hash(hash)?.timestamp)
    }

    async fn runtime_version(&self, _hash: &str) -> Result<RuntimeVersion, NodeError> {
        self.record_call("runtime_version")?;
        Ok(self.with_state(|state| {
            state.runtime.clone().unwrap_or(RuntimeVersion {
                spec_name: "fixture".to_string(),
                spec_version: 1,
                transaction_version: 1,
            })
        }))
    }

    async fn account_identity(
        &self,
        address: &str,
        _at: Option<&str>,
    ) -> Result<Value, NodeError> {
        self.record_call("account_identity")?;
        Ok(self.with_state(|state| {
            state
                .identities
                .get(address)
                .cloned()
                .unwrap_or(Value::Null)
        }))
    }

    async fn balances_all(
        &self,
        address: &str,
        _at: Option<&str>,
    ) -> Result<AccountBalances, NodeError> {
        self.record_call("balances_all")?;
        Ok(self.with_state(|state| {
            state.balances.get(address).cloned().unwrap_or(AccountBalances {
                free: "0".to_string(),
                reserved: "0".to_string(),
                locked: "0".to_string(),
                available: "0".to_string(),
                voting: "0".to_string(),
                vested: "0".to_string(),
                nonce: 0,
            })
        }))
    }

    async fn reward_destination(
        &self,
        _at: &str,
        address: &str,
    ) -> Result<RewardDestination, NodeError> {
        self.record_call("reward_destination")?;
        Ok(self.with_state(|state| {
            state
                .reward_destinations
                .get(address)
                .cloned()
                .unwrap_or(RewardDestination::Staked)
        }))
    }

    async fn evm_address_of(
        &self,
        address: &str,
        _at: Option<&str>,
    ) -> Result<Option<String>, NodeError> {
        self.record_call("evm_address_of")?;
        Ok(self.with_state(|state| state.evm_by_native.get(address).cloned()))
    }

    async fn native_address_of(
        &self,
        evm_address: &str,
        _at: Option<&str>,
    ) -> Result<Option<String>, NodeError> {
        self.record_call("native_address_of")?;
        Ok(self.with_state(|state| {
            state
                .native_by_evm
                .get(&evm_address.to_ascii_lowercase())
                .cloned()
        }))
    }

    async fn evm_nonce(&self, evm_address: &str, _at: Option<&str>) -> Result<u64, NodeError> {
        self.record_call("evm_nonce")?;
        Ok(self.with_state(|state| {
            state
                .evm_nonces
                .get(&evm_address.to_ascii_lowercase())
                .copied()
                .unwrap_or(0)
        }))
    }

    async fn contract_maintainer(
        &self,
        contract: &str,
        _at: &str,
    ) -> Result<Option<String>, NodeError> {
        self.record_call("contract_maintainer")?;
        Ok(self.with_state(|state| {
            state
                .maintainers
                .get(&contract.to_ascii_lowercase())
                .cloned()
        }))
    }

    async fn erc_balance_of(
        &self,
        contract: &str,
        holder: &str,
        token_id: Option<&str>,
        _block_id: u64,
    ) -> Result<String, NodeError> {
        self.record_call("erc_balance_of")?;
        self.with_state(|state| {
            state
                .erc_balances
                .get(&(
                    contract.to_ascii_lowercase(),
                    holder.to_ascii_lowercase(),
                    token_id.map(str::to_string),
                ))
                .cloned()
                .ok_or_else(|| NodeError::NotFound(format!("balance of {} in {}", holder, contract)))
        })
    }

    async fn best_head(&self) -> Result<u64, NodeError> {
        self.record_call("best_head")?;
        Ok(*self.best_head.borrow())
    }

    async fn finalized_head(&self) -> Result<u64, NodeError> {
        self.record_call("finalized_head")?;
        Ok(*self.finalized_head.borrow())
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream, NodeError> {
        self.record_call("subscribe_new_heads")?;
        Ok(Self::head_stream(self.best_head.subscribe()))
    }

    async fn subscribe_finalized_heads(&self) -> Result<HeadStream, NodeError> {
        self.record_call("subscribe_finalized_heads")?;
        Ok(Self::head_stream(self.finalized_head.subscribe()))
    }

    async fn health(&self) -> Result<NodeHealth, NodeError> {
        self.record_call("health")?;
        Ok(self.with_state(|state| NodeHealth {
            is_syncing: state.syncing,
            peers: 1,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let node = FixtureNode::with_empty_chain("a", 3);
        node.fail_block(1, 2);

        assert!(node.block_hash(1).await.is_err());
        assert!(node.block_hash(1).await.is_err());
        assert_eq!(node.block_hash(1).await.unwrap(), block_hash_for(1));
        assert_eq!(node.call_count("block_hash"), 3);
    }

    #[tokio::test]
    async fn test_head_stream_yields_current_then_updates() {
        let node = FixtureNode::with_empty_chain("a", 5);
        let mut heads = node.subscribe_new_heads().await.unwrap();
        assert_eq!(heads.next().await, Some(Ok(4)));

        node.set_heads(7, 4);
        assert_eq!(heads.next().await, Some(Ok(7)));
    }
}
