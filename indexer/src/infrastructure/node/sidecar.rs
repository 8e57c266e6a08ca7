//! Provider for Substrate API Sidecar compatible gateways
//!
//! The gateway decodes blocks, events and storage; EVM balance reads go to an optional
//! Ethereum JSON-RPC endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use num_bigint::BigUint;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ChainNode, HeadStream, NodeError};
use crate::domain::models::chain::{
    value_to_decimal, value_to_string, AccountBalances, BlockHeader, ChainExtrinsic, DigestLog,
    EventRecord, NodeHealth, Phase, RewardDestination, RuntimeVersion, SignedBlock,
};
use crate::domain::services::evm_abi;

const BLOCK_CACHE_SIZE: usize = 32;

/// Lock id of vesting schedules (`b"vesting "`)
const VESTING_LOCK_ID: &str = "0x76657374696e6720";

/// Decoded block kept so hash, body and events lookups share one request
#[derive(Debug, Clone)]
struct CachedBlock {
    block: SignedBlock,
    events: Vec<EventRecord>,
}

/// Sidecar HTTP provider
#[derive(Debug, Clone)]
pub struct SidecarNode {
    base_url: String,
    evm_rpc_url: Option<String>,
    client: Client,
    head_poll_interval: Duration,
    cache: Arc<Mutex<VecDeque<CachedBlock>>>,
}

impl SidecarNode {
    /// Create a new Sidecar provider
    pub fn new(base_url: &str, evm_rpc_url: Option<&str>, head_poll_interval: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            evm_rpc_url: evm_rpc_url.map(str::to_string),
            client: Client::new(),
            head_poll_interval,
            cache: Arc::new(Mutex::new(VecDeque::with_capacity(BLOCK_CACHE_SIZE))),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, NodeError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::Rpc(format!("{} returned {}: {}", path, status, body)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| NodeError::Decode(e.to_string()))
    }

    /// Storage value of `pallet.item` for the given keys
    async fn storage(
        &self,
        pallet: &str,
        item: &str,
        keys: &[&str],
        at: Option<&str>,
    ) -> Result<Value, NodeError> {
        let mut query: Vec<(&str, &str)> = keys.iter().map(|key| ("keys[]", *key)).collect();
        if let Some(at) = at {
            query.push(("at", at));
        }
        let response = self
            .get_json(&format!("/pallets/{}/storage/{}", pallet, item), &query)
            .await?;
        Ok(response.get("value").cloned().unwrap_or(Value::Null))
    }

    fn cached(&self, id_or_hash: &str) -> Option<CachedBlock> {
        let cache = self.cache.lock().ok()?;
        cache
            .iter()
            .find(|entry| {
                entry.block.header.hash == id_or_hash
                    || entry.block.header.number.to_string() == id_or_hash
            })
            .cloned()
    }

    async fn load_block(&self, id_or_hash: &str) -> Result<CachedBlock, NodeError> {
        if let Some(entry) = self.cached(id_or_hash) {
            return Ok(entry);
        }

        let response = self
            .get_json(
                &format!("/blocks/{}", id_or_hash),
                &[("eventDocs", "false"), ("extrinsicDocs", "false")],
            )
            .await?;
        let (block, events) = parse_block(&response)?;
        let entry = CachedBlock { block, events };

        if let Ok(mut cache) = self.cache.lock() {
            if cache.len() >= BLOCK_CACHE_SIZE {
                cache.pop_front();
            }
            cache.push_back(entry.clone());
        }
        Ok(entry)
    }

    async fn head(&self, finalized: bool) -> Result<u64, NodeError> {
        let flag = if finalized { "true" } else { "false" };
        let header = self
            .get_json("/blocks/head/header", &[("finalized", flag)])
            .await?;
        header
            .get("number")
            .and_then(value_to_decimal)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| NodeError::Decode("head header without number".to_string()))
    }

    fn poll_heads(&self, finalized: bool) -> HeadStream {
        let interval = self.head_poll_interval;
        futures::stream::unfold((self.clone(), None::<u64>), move |(node, last)| async move {
            loop {
                if last.is_some() {
                    tokio::time::sleep(interval).await;
                }
                match node.head(finalized).await {
                    Ok(head) if Some(head) == last => continue,
                    Ok(head) => return Some((Ok(head), (node, Some(head)))),
                    Err(e) => return Some((Err(e), (node, last))),
                }
            }
        })
        .boxed()
    }

    async fn eth_call(&self, to: &str, data: &str, block_id: u64) -> Result<String, NodeError> {
        let endpoint = self
            .evm_rpc_url
            .as_ref()
            .ok_or_else(|| NodeError::Unsupported("no EVM RPC endpoint configured".to_string()))?;

        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [{ "to": to, "data": data }, format!("0x{:x}", block_id)]
        });

        let response_json: Value = self
            .client
            .post(endpoint)
            .json(&request_body)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| NodeError::Decode(e.to_string()))?;

        if let Some(error) = response_json.get("error") {
            return Err(NodeError::Rpc(error.to_string()));
        }

        response_json
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NodeError::Decode("No result in eth_call response".to_string()))
    }
}

#[async_trait]
impl ChainNode for SidecarNode {
    fn provider_name(&self) -> String {
        format!("Sidecar ({})", self.base_url)
    }

    async fn block_hash(&self, id: u64) -> Result<String, NodeError> {
        Ok(self.load_block(&id.to_string()).await?.block.header.hash)
    }

    async fn block_body(&self, hash: &str) -> Result<SignedBlock, NodeError> {
        Ok(self.load_block(hash).await?.block)
    }

    async fn events_at(&self, hash: &str) -> Result<Vec<EventRecord>, NodeError> {
        Ok(self.load_block(hash).await?.events)
    }

    async fn timestamp_at(&self, hash: &str) -> Result<u64, NodeError> {
        let value = self.storage("timestamp", "now", &[], Some(hash)).await?;
        value_to_decimal(&value)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| NodeError::Decode(format!("invalid timestamp {}", value)))
    }

    async fn runtime_version(&self, hash: &str) -> Result<RuntimeVersion, NodeError> {
        let spec = self.get_json("/runtime/spec", &[("at", hash)]).await?;
        parse_runtime_version(&spec)
    }

    async fn account_identity(
        &self,
        address: &str,
        at: Option<&str>,
    ) -> Result<Value, NodeError> {
        self.storage("identity", "identityOf", &[address], at).await
    }

    async fn balances_all(
        &self,
        address: &str,
        at: Option<&str>,
    ) -> Result<AccountBalances, NodeError> {
        let query: Vec<(&str, &str)> = at.map(|at| vec![("at", at)]).unwrap_or_default();
        let info = self
            .get_json(&format!("/accounts/{}/balance-info", address), &query)
            .await?;
        parse_balance_info(&info)
    }

    async fn reward_destination(
        &self,
        at: &str,
        address: &str,
    ) -> Result<RewardDestination, NodeError> {
        let value = self.storage("staking", "payee", &[address], Some(at)).await?;
        Ok(parse_reward_destination(&value))
    }

    async fn evm_address_of(
        &self,
        address: &str,
        at: Option<&str>,
    ) -> Result<Option<String>, NodeError> {
        let value = self
            .storage("evmAccounts", "evmAddresses", &[address], at)
            .await?;
        Ok(value_to_string(&value).map(|s| s.to_ascii_lowercase()))
    }

    async fn native_address_of(
        &self,
        evm_address: &str,
        at: Option<&str>,
    ) -> Result<Option<String>, NodeError> {
        let value = self
            .storage("evmAccounts", "accounts", &[evm_address], at)
            .await?;
        Ok(value_to_string(&value))
    }

    async fn evm_nonce(&self, evm_address: &str, at: Option<&str>) -> Result<u64, NodeError> {
        let value = self.storage("evm", "accounts", &[evm_address], at).await?;
        Ok(value
            .get("nonce")
            .and_then(value_to_decimal)
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0))
    }

    async fn contract_maintainer(
        &self,
        contract: &str,
        at: &str,
    ) -> Result<Option<String>, NodeError> {
        let value = self.storage("evm", "accounts", &[contract], Some(at)).await?;
        Ok(value
            .get("contractInfo")
            .and_then(|info| info.get("maintainer"))
            .and_then(value_to_string)
            .map(|s| s.to_ascii_lowercase()))
    }

    async fn erc_balance_of(
        &self,
        contract: &str,
        holder: &str,
        token_id: Option<&str>,
        block_id: u64,
    ) -> Result<String, NodeError> {
        let calldata = evm_abi::balance_of_calldata(holder, token_id)
            .ok_or_else(|| NodeError::Decode(format!("invalid token id {:?}", token_id)))?;
        let result = self.eth_call(contract, &calldata, block_id).await?;
        let word = result.trim_start_matches("0x");
        let word = &word[..word.len().min(64)];
        evm_abi::word_to_decimal(word)
            .ok_or_else(|| NodeError::Decode(format!("invalid balanceOf result {}", result)))
    }

    async fn best_head(&self) -> Result<u64, NodeError> {
        self.head(false).await
    }

    async fn finalized_head(&self) -> Result<u64, NodeError> {
        self.head(true).await
    }

    async fn subscribe_new_heads(&self) -> Result<HeadStream, NodeError> {
        Ok(self.poll_heads(false))
    }

    async fn subscribe_finalized_heads(&self) -> Result<HeadStream, NodeError> {
        Ok(self.poll_heads(true))
    }

    async fn health(&self) -> Result<NodeHealth, NodeError> {
        let network = self.get_json("/node/network", &[]).await?;
        Ok(NodeHealth {
            is_syncing: network
                .get("isSyncing")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            peers: network
                .get("numPeers")
                .and_then(value_to_decimal)
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(0),
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(value_to_string).unwrap_or_default()
}

fn parse_event(value: &Value, index: u32, phase: Phase) -> Result<EventRecord, NodeError> {
    let method = value
        .get("method")
        .ok_or_else(|| NodeError::Decode(format!("event {} without method", index)))?;
    Ok(EventRecord {
        index,
        section: str_field(method, "pallet"),
        method: str_field(method, "method"),
        data: value
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        phase,
    })
}

fn parse_events_into(
    container: Option<&Value>,
    phase: Phase,
    events: &mut Vec<EventRecord>,
) -> Result<(), NodeError> {
    let Some(list) = container
        .and_then(|c| c.get("events"))
        .and_then(Value::as_array)
    else {
        return Ok(());
    };
    for value in list {
        let index = events.len() as u32;
        events.push(parse_event(value, index, phase)?);
    }
    Ok(())
}

/// Decodes a `/blocks/{id}` response into the block and its events in chain order:
/// initialization events, then each extrinsic's events, then finalization events.
pub(crate) fn parse_block(value: &Value) -> Result<(SignedBlock, Vec<EventRecord>), NodeError> {
    let number = value
        .get("number")
        .and_then(value_to_decimal)
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| NodeError::Decode("block without number".to_string()))?;
    let hash = str_field(value, "hash");
    if hash.is_empty() {
        return Err(NodeError::Decode(format!("block {} without hash", number)));
    }

    let logs = value
        .get("logs")
        .and_then(Value::as_array)
        .map(|logs| {
            logs.iter()
                .enumerate()
                .map(|(position, log)| DigestLog {
                    index: log
                        .get("index")
                        .and_then(value_to_decimal)
                        .and_then(|n| n.parse::<u32>().ok())
                        .unwrap_or(position as u32),
                    kind: str_field(log, "type"),
                    value: log.get("value").cloned().unwrap_or(Value::Null),
                })
                .collect()
        })
        .unwrap_or_default();

    let header = BlockHeader {
        number,
        hash,
        parent_hash: str_field(value, "parentHash"),
        state_root: str_field(value, "stateRoot"),
        extrinsics_root: str_field(value, "extrinsicsRoot"),
        author: value.get("authorId").and_then(value_to_string),
        logs,
    };

    let mut events = Vec::new();
    parse_events_into(value.get("onInitialize"), Phase::Initialization, &mut events)?;

    let raw_extrinsics = value
        .get("extrinsics")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut extrinsics = Vec::with_capacity(raw_extrinsics.len());
    for (position, raw) in raw_extrinsics.iter().enumerate() {
        let index = position as u32;
        let method = raw
            .get("method")
            .ok_or_else(|| NodeError::Decode(format!("extrinsic {} without method", index)))?;
        let signer = raw
            .get("signature")
            .and_then(|signature| signature.get("signer"))
            .and_then(value_to_string);
        let info = raw
            .get("info")
            .filter(|info| info.as_object().map_or(false, |o| !o.is_empty()))
            .cloned();

        extrinsics.push(ChainExtrinsic {
            index,
            hash: str_field(raw, "hash"),
            section: str_field(method, "pallet"),
            method: str_field(method, "method"),
            signer,
            args: raw.get("args").map(normalize_args).unwrap_or(Value::Null),
            nonce: raw
                .get("nonce")
                .and_then(value_to_decimal)
                .and_then(|n| n.parse::<u64>().ok()),
            tip: raw.get("tip").and_then(value_to_decimal),
            info,
        });
        parse_events_into(Some(raw), Phase::ApplyExtrinsic(index), &mut events)?;
    }

    parse_events_into(value.get("onFinalize"), Phase::Finalization, &mut events)?;

    Ok((SignedBlock { header, extrinsics }, events))
}

/// Renames Sidecar's camelCase argument keys to the runtime's snake_case names, including the
/// arguments of calls wrapped by `utility.batch*` and `proxy.proxy`.
fn normalize_args(args: &Value) -> Value {
    let Value::Object(map) = args else {
        return args.clone();
    };
    map.iter()
        .map(|(key, value)| {
            let value = match (key.as_str(), value) {
                ("calls", Value::Array(calls)) => {
                    Value::Array(calls.iter().map(normalize_call).collect())
                }
                ("call", call) => normalize_call(call),
                _ => value.clone(),
            };
            (snake_case(key), value)
        })
        .collect::<serde_json::Map<String, Value>>()
        .into()
}

fn normalize_call(call: &Value) -> Value {
    let mut call = call.clone();
    if let Some(args) = call.get_mut("args") {
        *args = normalize_args(args);
    }
    call
}

fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (position, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if position > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn big(value: Option<&Value>) -> BigUint {
    value
        .and_then(value_to_decimal)
        .and_then(|n| BigUint::parse_bytes(n.as_bytes(), 10))
        .unwrap_or_default()
}

/// Derives the balance breakdown from a `/accounts/{id}/balance-info` response
pub(crate) fn parse_balance_info(info: &Value) -> Result<AccountBalances, NodeError> {
    if !info.is_object() {
        return Err(NodeError::Decode("balance info is not an object".to_string()));
    }
    let free = big(info.get("free"));
    let reserved = big(info.get("reserved"));
    let locked = match info.get("frozen") {
        Some(frozen) => big(Some(frozen)),
        None => big(info.get("miscFrozen")).max(big(info.get("feeFrozen"))),
    };
    let available = if free > locked {
        &free - &locked
    } else {
        BigUint::default()
    };
    let vested = info
        .get("locks")
        .and_then(Value::as_array)
        .and_then(|locks| {
            locks
                .iter()
                .find(|lock| str_field(lock, "id").eq_ignore_ascii_case(VESTING_LOCK_ID))
        })
        .map(|lock| big(lock.get("amount")))
        .unwrap_or_default();

    Ok(AccountBalances {
        voting: (&free + &reserved).to_string(),
        free: free.to_string(),
        reserved: reserved.to_string(),
        locked: locked.to_string(),
        available: available.to_string(),
        vested: vested.to_string(),
        nonce: info
            .get("nonce")
            .and_then(value_to_decimal)
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(0),
    })
}

pub(crate) fn parse_reward_destination(value: &Value) -> RewardDestination {
    match value {
        Value::String(kind) => match kind.to_ascii_lowercase().as_str() {
            "staked" => RewardDestination::Staked,
            "stash" => RewardDestination::Stash,
            "controller" => RewardDestination::Controller,
            "none" => RewardDestination::None,
            _ => RewardDestination::Staked,
        },
        Value::Object(map) => {
            let account = map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("account"))
                .and_then(|(_, account)| value_to_string(account));
            match account {
                Some(account) => RewardDestination::Account(account),
                None => map
                    .keys()
                    .next()
                    .map(|key| parse_reward_destination(&Value::String(key.clone())))
                    .unwrap_or(RewardDestination::Staked),
            }
        }
        _ => RewardDestination::Staked,
    }
}

fn parse_runtime_version(spec: &Value) -> Result<RuntimeVersion, NodeError> {
    let spec_version = spec
        .get("specVersion")
        .and_then(value_to_decimal)
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or_else(|| NodeError::Decode("runtime spec without specVersion".to_string()))?;
    Ok(RuntimeVersion {
        spec_name: str_field(spec, "specName"),
        spec_version,
        transaction_version: spec
            .get("transactionVersion")
            .and_then(value_to_decimal)
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0),
    })
}
