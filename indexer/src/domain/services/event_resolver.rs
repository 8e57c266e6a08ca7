//! Event classification and resolution.
//!
//! Every decoded event maps to exactly one [`SemanticEvent`]. The `(section, method)` pair
//! picks the variant through [`classify`]; pairs not in the table resolve to
//! [`SemanticEvent::Default`] so new runtime modules never stop the indexer.
//!
//! Resolving registers every touched address with the block's [`AccountManager`]. Enrichment
//! lookups (contract maintainer, ERC balances) are best effort: their failures are reported and
//! the affected field or row is left out.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::models::chain::{
    value_to_string, ChainExtrinsic, EventRecord, RewardDestination,
};
use crate::domain::models::{
    record_id, Contract, ContractOwnerChange, EvmEvent, EvmEventMethod, HolderKind,
    StakingKind, StakingRecord, TokenHolder, Transfer, TransferKind,
};
use crate::domain::services::account_manager::{is_sentinel, AccountManager};
use crate::domain::services::bytecode::split_bytecode;
use crate::domain::services::evm_abi::{
    decode_uint_array, is_zero_address, word_to_address, word_to_decimal, words,
};
use crate::domain::services::extrinsic_status::{extrinsic_status, ExtrinsicStatus};
use crate::domain::services::staking_attribution::{attribute, staking_account, staking_amount};
use crate::infrastructure::monitoring::ErrorReporter;
use crate::infrastructure::node::{FetchedBlock, NodeConnectionPool, NodeError};
use crate::utils::logging;

/// `Transfer(address,address,uint256)`, shared by ERC20 and ERC721
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
/// `TransferSingle(address,address,address,uint256,uint256)`
pub const TRANSFER_SINGLE_TOPIC: &str =
    "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62";
/// `TransferBatch(address,address,address,uint256[],uint256[])`
pub const TRANSFER_BATCH_TOPIC: &str =
    "0x4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb";

/// Classification of an event by its `(section, method)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NativeTransfer,
    EvmLog,
    ContractCreated,
    ContractPublished,
    ContractOwnerChanged,
    ExecutionFailed,
    AccountEndowed,
    AccountReserved,
    AccountKilled,
    EvmAccountClaimed,
    StakingReward,
    StakingSlash,
    Default,
}

pub fn classify(section: &str, method: &str) -> EventKind {
    match (section, method) {
        ("balances", "Transfer") => EventKind::NativeTransfer,
        ("balances", "Endowed") => EventKind::AccountEndowed,
        ("balances", "Reserved") => EventKind::AccountReserved,
        ("system", "KilledAccount") => EventKind::AccountKilled,
        ("evm", "Log") => EventKind::EvmLog,
        ("evm", "Created") => EventKind::ContractCreated,
        ("evm", "ContractPublished") | ("evm", "publishFree") => EventKind::ContractPublished,
        ("evm", "TransferredMaintainer") => EventKind::ContractOwnerChanged,
        ("evm", "ExecutedFailed") => EventKind::ExecutionFailed,
        ("evmAccounts", "ClaimAccount") => EventKind::EvmAccountClaimed,
        ("staking", "Rewarded") | ("staking", "Reward") => EventKind::StakingReward,
        ("staking", "Slashed") | ("staking", "Slash") => EventKind::StakingSlash,
        _ => EventKind::Default,
    }
}

/// Resolved meaning of one event
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticEvent {
    NativeTransfer(Transfer),
    /// ERC20, ERC721 or ERC1155 transfer log; batch logs carry one transfer per token id
    TokenTransfer {
        log: EvmEvent,
        transfers: Vec<Transfer>,
        holders: Vec<TokenHolder>,
    },
    /// Contract log that is not a token transfer
    EvmLog(EvmEvent),
    ContractCreated(Contract),
    ContractPublished {
        address: String,
    },
    ContractOwnerChanged(ContractOwnerChange),
    ExecutionFailed(EvmEvent),
    AccountEndowed {
        address: String,
    },
    AccountReserved {
        address: String,
    },
    AccountKilled {
        address: String,
    },
    EvmAccountClaimed {
        address: String,
        evm_address: String,
    },
    StakingReward(StakingRecord),
    StakingSlash(StakingRecord),
    Default,
}

impl SemanticEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SemanticEvent::NativeTransfer(_) => EventKind::NativeTransfer,
            SemanticEvent::TokenTransfer { .. } | SemanticEvent::EvmLog(_) => EventKind::EvmLog,
            SemanticEvent::ContractCreated(_) => EventKind::ContractCreated,
            SemanticEvent::ContractPublished { .. } => EventKind::ContractPublished,
            SemanticEvent::ContractOwnerChanged(_) => EventKind::ContractOwnerChanged,
            SemanticEvent::ExecutionFailed(_) => EventKind::ExecutionFailed,
            SemanticEvent::AccountEndowed { .. } => EventKind::AccountEndowed,
            SemanticEvent::AccountReserved { .. } => EventKind::AccountReserved,
            SemanticEvent::AccountKilled { .. } => EventKind::AccountKilled,
            SemanticEvent::EvmAccountClaimed { .. } => EventKind::EvmAccountClaimed,
            SemanticEvent::StakingReward(_) => EventKind::StakingReward,
            SemanticEvent::StakingSlash(_) => EventKind::StakingSlash,
            SemanticEvent::Default => EventKind::Default,
        }
    }
}

/// Per-block inputs shared by every event of the block
pub struct ResolveContext<'a> {
    pub block: &'a FetchedBlock,
    pub accounts: &'a AccountManager,
    /// Contracts already indexed or created earlier in this block, lowercase
    pub known_contracts: &'a HashSet<String>,
}

impl<'a> ResolveContext<'a> {
    fn extrinsic(&self, index: u32) -> Option<&'a ChainExtrinsic> {
        self.block.block.extrinsics.iter().find(|e| e.index == index)
    }

    fn status_of(&self, event: &EventRecord) -> ExtrinsicStatus {
        match event.phase.extrinsic_index() {
            Some(index) => extrinsic_status(self.block.events_of_extrinsic(index)),
            None => ExtrinsicStatus {
                success: true,
                error_message: None,
            },
        }
    }

    fn extrinsic_id(&self, event: &EventRecord) -> Option<i64> {
        event
            .phase
            .extrinsic_index()
            .map(|index| record_id(self.block.id, index))
    }

    fn fee_of(&self, event: &EventRecord) -> String {
        event
            .phase
            .extrinsic_index()
            .and_then(|index| self.extrinsic(index))
            .filter(|extrinsic| extrinsic.is_signed())
            .map(ChainExtrinsic::partial_fee)
            .unwrap_or_else(|| "0".to_string())
    }
}

/// Contract log as carried by `evm.Log`
#[derive(Debug, Clone, PartialEq)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Accepts both `Log({address, topics, data})` and the positional `Log(address, topics, data)`
pub fn parse_evm_log(data: &[Value]) -> Option<RawLog> {
    let (address, topics, payload) = match data.first()? {
        Value::Object(log) => (log.get("address")?, log.get("topics")?, log.get("data")),
        _ => (data.first()?, data.get(1)?, data.get(2)),
    };
    let topics = topics
        .as_array()?
        .iter()
        .map(|topic| topic.as_str().map(str::to_ascii_lowercase))
        .collect::<Option<Vec<_>>>()?;
    Some(RawLog {
        address: address.as_str()?.to_ascii_lowercase(),
        topics,
        data: payload
            .and_then(Value::as_str)
            .unwrap_or("0x")
            .to_string(),
    })
}

/// One token movement decoded from a transfer log
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMovement {
    pub kind: TransferKind,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub nft_id: Option<String>,
}

/// Decodes ERC20/ERC721 `Transfer`, ERC1155 `TransferSingle` and `TransferBatch` logs.
///
/// Returns `None` for any other log.
pub fn decode_token_log(log: &RawLog) -> Option<Vec<TokenMovement>> {
    let signature = log.topics.first()?.as_str();
    match (signature, log.topics.len()) {
        (TRANSFER_TOPIC, 3) => Some(vec![TokenMovement {
            kind: TransferKind::Erc20,
            from: word_to_address(&log.topics[1])?,
            to: word_to_address(&log.topics[2])?,
            amount: words(&log.data)
                .first()
                .and_then(|word| word_to_decimal(word))
                .unwrap_or_else(|| "0".to_string()),
            nft_id: None,
        }]),
        (TRANSFER_TOPIC, 4) => Some(vec![TokenMovement {
            kind: TransferKind::Erc721,
            from: word_to_address(&log.topics[1])?,
            to: word_to_address(&log.topics[2])?,
            amount: "1".to_string(),
            nft_id: Some(word_to_decimal(&log.topics[3])?),
        }]),
        (TRANSFER_SINGLE_TOPIC, 4) => {
            let data = words(&log.data);
            Some(vec![TokenMovement {
                kind: TransferKind::Erc1155,
                from: word_to_address(&log.topics[2])?,
                to: word_to_address(&log.topics[3])?,
                nft_id: Some(word_to_decimal(data.first()?)?),
                amount: word_to_decimal(data.get(1)?)?,
            }])
        }
        (TRANSFER_BATCH_TOPIC, 4) => {
            let from = word_to_address(&log.topics[2])?;
            let to = word_to_address(&log.topics[3])?;
            let ids = decode_uint_array(&log.data, 0)?;
            let amounts = decode_uint_array(&log.data, 1)?;
            if ids.len() != amounts.len() {
                return None;
            }
            Some(
                ids.into_iter()
                    .zip(amounts)
                    .map(|(id, amount)| TokenMovement {
                        kind: TransferKind::Erc1155,
                        from: from.clone(),
                        to: to.clone(),
                        amount,
                        nft_id: Some(id),
                    })
                    .collect(),
            )
        }
        _ => None,
    }
}

/// Address of the contract named by `evm.Created` / `evm.ContractPublished`
pub(crate) fn contract_address_of(event: &EventRecord) -> Option<String> {
    let position = if event.data.len() > 1 { 1 } else { 0 };
    event.data_str(position).map(|a| a.to_ascii_lowercase())
}

#[derive(Debug, Clone)]
pub struct EventResolver {
    pool: Arc<NodeConnectionPool>,
    reporter: Arc<dyn ErrorReporter>,
    native_token_address: String,
}

impl EventResolver {
    pub fn new(
        pool: Arc<NodeConnectionPool>,
        reporter: Arc<dyn ErrorReporter>,
        native_token_address: &str,
    ) -> Self {
        Self {
            pool,
            reporter,
            native_token_address: native_token_address.to_string(),
        }
    }

    /// Resolves one event of `ctx.block`.
    ///
    /// Only node errors on required lookups (account snapshots, reward destination) are
    /// returned; the block is then retried as a whole.
    pub async fn resolve(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
    ) -> Result<SemanticEvent, NodeError> {
        let kind = classify(&event.section, &event.method);
        let resolved = match kind {
            EventKind::NativeTransfer => self.native_transfer(ctx, event).await?,
            EventKind::EvmLog => self.evm_log(ctx, event).await?,
            EventKind::ContractCreated => self.contract_created(ctx, event).await,
            EventKind::ContractPublished => match contract_address_of(event) {
                Some(address) => SemanticEvent::ContractPublished { address },
                None => SemanticEvent::Default,
            },
            EventKind::ContractOwnerChanged => self.owner_changed(ctx, event).await,
            EventKind::ExecutionFailed => self.execution_failed(ctx, event),
            EventKind::AccountEndowed | EventKind::AccountReserved | EventKind::AccountKilled => {
                let Some(address) = event.data_str(0) else {
                    return Ok(SemanticEvent::Default);
                };
                let active = kind != EventKind::AccountKilled;
                ctx.accounts
                    .use_account_at(&address, event.index, active)
                    .await?;
                match kind {
                    EventKind::AccountEndowed => SemanticEvent::AccountEndowed { address },
                    EventKind::AccountReserved => SemanticEvent::AccountReserved { address },
                    _ => SemanticEvent::AccountKilled { address },
                }
            }
            EventKind::EvmAccountClaimed => {
                match (event.data_str(0), event.data_str(1)) {
                    (Some(address), Some(evm_address)) => {
                        ctx.accounts.use_account(&address).await?;
                        SemanticEvent::EvmAccountClaimed {
                            address,
                            evm_address: evm_address.to_ascii_lowercase(),
                        }
                    }
                    _ => SemanticEvent::Default,
                }
            }
            EventKind::StakingReward => self.staking(ctx, event, StakingKind::Reward).await?,
            EventKind::StakingSlash => self.staking(ctx, event, StakingKind::Slash).await?,
            EventKind::Default => SemanticEvent::Default,
        };
        Ok(resolved)
    }

    fn report(&self, ctx: &ResolveContext<'_>, event: &EventRecord, error: &dyn std::fmt::Display) {
        self.reporter.report(
            "resolver",
            &format!(
                "block {} event {} {}.{}",
                ctx.block.id, event.index, event.section, event.method
            ),
            error,
        );
    }

    async fn native_transfer(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
    ) -> Result<SemanticEvent, NodeError> {
        let (Some(from), Some(to)) = (event.data_str(0), event.data_str(1)) else {
            return Ok(SemanticEvent::Default);
        };
        let from_account = ctx.accounts.use_account(&from).await?;
        let to_account = ctx.accounts.use_account(&to).await?;
        let status = ctx.status_of(event);

        Ok(SemanticEvent::NativeTransfer(Transfer {
            block_id: ctx.block.id,
            extrinsic_id: ctx.extrinsic_id(event),
            event_index: event.index,
            batch_index: 0,
            kind: TransferKind::Native,
            from_address: from,
            to_address: to,
            from_aux_address: from_account.evm_address,
            to_aux_address: to_account.evm_address,
            token_address: self.native_token_address.clone(),
            amount: event.data_decimal(2).unwrap_or_else(|| "0".to_string()),
            nft_id: None,
            fee_amount: ctx.fee_of(event),
            success: status.success,
            error_message: status.error_message,
            timestamp: ctx.block.timestamp,
        }))
    }

    async fn evm_log(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
    ) -> Result<SemanticEvent, NodeError> {
        let Some(raw) = parse_evm_log(&event.data) else {
            logging::log_warning(&format!(
                "[block {}] Undecodable evm.Log at event {}",
                ctx.block.id, event.index
            ));
            return Ok(SemanticEvent::Default);
        };

        let log = EvmEvent {
            event_id: record_id(ctx.block.id, event.index),
            block_id: ctx.block.id,
            event_index: event.index,
            extrinsic_index: event.phase.extrinsic_index(),
            contract_address: raw.address.clone(),
            topics: raw.topics.clone(),
            data: raw.data.clone(),
            method: EvmEventMethod::Log,
            verified: ctx.known_contracts.contains(&raw.address),
            success: true,
            error_message: None,
        };

        let Some(movements) = decode_token_log(&raw) else {
            return Ok(SemanticEvent::EvmLog(log));
        };

        let status = ctx.status_of(event);
        let fee_amount = ctx.fee_of(event);
        let mut transfers = Vec::with_capacity(movements.len());
        let mut holders = Vec::new();

        for (batch_index, movement) in movements.into_iter().enumerate() {
            let from_native = ctx.accounts.use_evm(&movement.from).await?;
            let to_native = ctx.accounts.use_evm(&movement.to).await?;

            for (evm, native, receiving) in [
                (&movement.from, &from_native, false),
                (&movement.to, &to_native, true),
            ] {
                if is_zero_address(evm) {
                    continue;
                }
                if let Some(holder) = self
                    .holder_snapshot(ctx, event, &raw.address, &movement, evm, native, receiving)
                    .await
                {
                    holders.push(holder);
                }
            }

            transfers.push(Transfer {
                block_id: ctx.block.id,
                extrinsic_id: ctx.extrinsic_id(event),
                event_index: event.index,
                batch_index: batch_index as u32,
                kind: movement.kind,
                from_address: from_native,
                to_address: to_native,
                from_aux_address: Some(movement.from.clone()),
                to_aux_address: Some(movement.to.clone()),
                token_address: raw.address.clone(),
                amount: movement.amount,
                nft_id: movement.nft_id,
                fee_amount: fee_amount.clone(),
                success: status.success,
                error_message: status.error_message.clone(),
                timestamp: ctx.block.timestamp,
            });
        }

        Ok(SemanticEvent::TokenTransfer {
            log,
            transfers,
            holders,
        })
    }

    /// Balance snapshot of one side of a token movement, `None` when it cannot be read
    #[allow(clippy::too_many_arguments)]
    async fn holder_snapshot(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
        contract: &str,
        movement: &TokenMovement,
        evm: &str,
        native: &str,
        receiving: bool,
    ) -> Option<TokenHolder> {
        let balance = match movement.kind {
            TransferKind::Erc721 => Some(if receiving { "1" } else { "0" }.to_string()),
            TransferKind::Erc20 | TransferKind::Erc1155 => {
                let token_id = match movement.kind {
                    TransferKind::Erc1155 => movement.nft_id.clone(),
                    _ => None,
                };
                let (contract, holder, block_id) =
                    (contract.to_string(), evm.to_string(), ctx.block.id);
                let result = self
                    .pool
                    .query(move |node| {
                        let (contract, holder, token_id) =
                            (contract.clone(), holder.clone(), token_id.clone());
                        async move {
                            node.erc_balance_of(&contract, &holder, token_id.as_deref(), block_id)
                                .await
                        }
                    })
                    .await;
                match result {
                    Ok(balance) => Some(balance),
                    Err(error) => {
                        self.report(ctx, event, &error);
                        None
                    }
                }
            }
            TransferKind::Native => None,
        }?;

        Some(TokenHolder {
            signer_address: (!is_sentinel(native)).then(|| native.to_string()),
            evm_address: Some(evm.to_string()),
            token_address: contract.to_string(),
            nft_id: movement.nft_id.clone(),
            kind: if ctx.known_contracts.contains(evm) {
                HolderKind::Contract
            } else {
                HolderKind::Account
            },
            balance,
            info: None,
            block_id: ctx.block.id,
            timestamp: ctx.block.timestamp,
        })
    }

    /// Native address of a contract's maintainer; failures are reported and yield `None`
    async fn maintainer_of(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
        contract: &str,
    ) -> Option<String> {
        let (address, at) = (contract.to_string(), ctx.block.hash.clone());
        let lookup = self
            .pool
            .query(move |node| {
                let (address, at) = (address.clone(), at.clone());
                async move { node.contract_maintainer(&address, &at).await }
            })
            .await;
        let maintainer_evm = match lookup {
            Ok(maintainer) => maintainer?,
            Err(error) => {
                self.report(ctx, event, &error);
                return None;
            }
        };
        match ctx.accounts.use_evm(&maintainer_evm).await {
            Ok(native) if !is_sentinel(&native) => Some(native),
            Ok(_) => None,
            Err(error) => {
                self.report(ctx, event, &error);
                None
            }
        }
    }

    async fn contract_created(&self, ctx: &ResolveContext<'_>, event: &EventRecord) -> SemanticEvent {
        let Some(address) = contract_address_of(event) else {
            return SemanticEvent::Default;
        };
        let extrinsic = event
            .phase
            .extrinsic_index()
            .and_then(|index| ctx.extrinsic(index));
        let bytecode = extrinsic
            .and_then(|e| e.arg("init", 0))
            .and_then(value_to_string)
            .unwrap_or_default();
        let parts = split_bytecode(&bytecode);
        let maintainer = self.maintainer_of(ctx, event, &address).await;

        logging::log_info(&format!(
            "[block {}] New contract created: {}",
            ctx.block.id, address
        ));

        SemanticEvent::ContractCreated(Contract {
            address,
            extrinsic_id: ctx.extrinsic_id(event),
            block_id: ctx.block.id,
            maintainer: maintainer.clone(),
            bytecode,
            context: parts.context,
            args: parts.args,
            gas_limit: extrinsic
                .and_then(|e| e.arg("gas_limit", 2))
                .and_then(value_to_string),
            storage_limit: extrinsic
                .and_then(|e| e.arg("storage_limit", 3))
                .and_then(value_to_string),
            published: false,
            owner: maintainer,
            timestamp: ctx.block.timestamp,
        })
    }

    async fn owner_changed(&self, ctx: &ResolveContext<'_>, event: &EventRecord) -> SemanticEvent {
        let Some(address) = event.data_str(0).map(|a| a.to_ascii_lowercase()) else {
            return SemanticEvent::Default;
        };
        let owner = self
            .maintainer_of(ctx, event, &address)
            .await
            .unwrap_or_else(|| address.clone());
        SemanticEvent::ContractOwnerChanged(ContractOwnerChange { address, owner })
    }

    fn execution_failed(&self, ctx: &ResolveContext<'_>, event: &EventRecord) -> SemanticEvent {
        let Some(contract) = contract_address_of(event) else {
            return SemanticEvent::Default;
        };
        let reason = event.data.get(2).map(|reason| match reason {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        });
        SemanticEvent::ExecutionFailed(EvmEvent {
            event_id: record_id(ctx.block.id, event.index),
            block_id: ctx.block.id,
            event_index: event.index,
            extrinsic_index: event.phase.extrinsic_index(),
            verified: ctx.known_contracts.contains(&contract),
            contract_address: contract,
            topics: Vec::new(),
            data: event.data_str(3).unwrap_or_else(|| "0x".to_string()),
            method: EvmEventMethod::ExecutedFailed,
            success: false,
            error_message: reason,
        })
    }

    async fn staking(
        &self,
        ctx: &ResolveContext<'_>,
        event: &EventRecord,
        kind: StakingKind,
    ) -> Result<SemanticEvent, NodeError> {
        let Some(account) = staking_account(event) else {
            return Ok(SemanticEvent::Default);
        };
        let attribution = attribute(&ctx.block.block.extrinsics, &ctx.block.events, event);

        let signer = match kind {
            StakingKind::Reward => {
                let (at, address) = (ctx.block.parent_hash().to_string(), account.clone());
                let destination = self
                    .pool
                    .query(move |node| {
                        let (at, address) = (at.clone(), address.clone());
                        async move { node.reward_destination(&at, &address).await }
                    })
                    .await?;
                match destination {
                    RewardDestination::Account(destination) => {
                        logging::log_debug(&format!(
                            "[block {}] Redirecting staking reward from {} to {}",
                            ctx.block.id, account, destination
                        ));
                        destination
                    }
                    _ => account,
                }
            }
            StakingKind::Slash => account,
        };
        ctx.accounts.use_account(&signer).await?;

        let record = StakingRecord {
            block_id: ctx.block.id,
            event_index: event.index,
            signer_address: signer,
            amount: staking_amount(event),
            era: attribution.era,
            validator_stash_address: attribution.validator_stash,
            kind,
            timestamp: ctx.block.timestamp,
        };
        Ok(match kind {
            StakingKind::Reward => SemanticEvent::StakingReward(record),
            StakingKind::Slash => SemanticEvent::StakingSlash(record),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NATIVE_TOKEN_ADDRESS;
    use crate::domain::models::chain::{AccountBalances, Phase, SignedBlock};
    use crate::domain::models::Account;
    use crate::domain::services::account_manager::NativeToken;
    use crate::domain::services::evm_abi::{encode_address, encode_uint, event_topic};
    use crate::infrastructure::monitoring::RecordingReporter;
    use crate::infrastructure::node::fixture::{self, event, extrinsic, FixtureNode};
    use crate::infrastructure::node::{BlockFetcher, ChainNode, PoolConfig};
    use serde_json::json;

    const TOKEN: &str = "0x00000000000000000000000000000000000000aa";
    const FROM: &str = "0x1111111111111111111111111111111111111111";
    const TO: &str = "0x2222222222222222222222222222222222222222";

    struct Harness {
        node: Arc<FixtureNode>,
        pool: Arc<NodeConnectionPool>,
        reporter: Arc<RecordingReporter>,
        resolver: EventResolver,
    }

    async fn harness(extrinsics: Vec<ChainExtrinsic>, events: Vec<EventRecord>) -> Harness {
        let node = Arc::new(FixtureNode::with_empty_chain("a", 5));
        node.insert_block(
            SignedBlock {
                header: fixture::header(5),
                extrinsics,
            },
            events,
            1_600_000_030_000,
        );
        node.set_heads(5, 5);
        let reporter = Arc::new(RecordingReporter::new());
        let pool = NodeConnectionPool::initialize(
            vec![node.clone() as Arc<dyn ChainNode>],
            PoolConfig::default(),
            reporter.clone(),
        )
        .await
        .unwrap();
        let resolver = EventResolver::new(pool.clone(), reporter.clone(), DEFAULT_NATIVE_TOKEN_ADDRESS);
        Harness {
            node,
            pool,
            reporter,
            resolver,
        }
    }

    impl Harness {
        async fn resolve_all(&self) -> (Vec<SemanticEvent>, Vec<Account>) {
            let block = BlockFetcher::new(self.pool.clone()).fetch(5).await.unwrap();
            let accounts = AccountManager::new(
                5,
                &block.hash,
                block.timestamp,
                self.pool.clone(),
                NativeToken::new(DEFAULT_NATIVE_TOKEN_ADDRESS),
            );
            let known = HashSet::new();
            let ctx = ResolveContext {
                block: &block,
                accounts: &accounts,
                known_contracts: &known,
            };
            let mut resolved = Vec::new();
            for event in &block.events {
                resolved.push(self.resolver.resolve(&ctx, event).await.unwrap());
            }
            (resolved, accounts.snapshots())
        }
    }

    fn topic(address: &str) -> String {
        format!("0x{}", encode_address(address))
    }

    fn word(decimal: &str) -> String {
        encode_uint(decimal).unwrap()
    }

    #[test]
    fn test_topic_constants_match_signatures() {
        assert_eq!(event_topic("Transfer(address,address,uint256)"), TRANSFER_TOPIC);
        assert_eq!(
            event_topic("TransferSingle(address,address,address,uint256,uint256)"),
            TRANSFER_SINGLE_TOPIC
        );
        assert_eq!(
            event_topic("TransferBatch(address,address,address,uint256[],uint256[])"),
            TRANSFER_BATCH_TOPIC
        );
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(classify("balances", "Transfer"), EventKind::NativeTransfer);
        assert_eq!(classify("staking", "Rewarded"), EventKind::StakingReward);
        assert_eq!(classify("staking", "Slashed"), EventKind::StakingSlash);
        assert_eq!(classify("evm", "ContractPublished"), EventKind::ContractPublished);
        assert_eq!(classify("system", "KilledAccount"), EventKind::AccountKilled);
        assert_eq!(classify("newPallet", "SomethingHappened"), EventKind::Default);
        assert_eq!(classify("balances", "transfer"), EventKind::Default);
    }

    #[test]
    fn test_decode_erc1155_batch() {
        let data = format!(
            "0x{}{}{}{}{}{}{}{}",
            word("64"),
            word("160"),
            word("2"),
            word("1"),
            word("2"),
            word("2"),
            word("5"),
            word("9")
        );
        let log = RawLog {
            address: TOKEN.to_string(),
            topics: vec![
                TRANSFER_BATCH_TOPIC.to_string(),
                topic("0x9999999999999999999999999999999999999999"),
                topic(FROM),
                topic(TO),
            ],
            data,
        };
        let movements = decode_token_log(&log).unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].nft_id.as_deref(), Some("1"));
        assert_eq!(movements[0].amount, "5");
        assert_eq!(movements[1].nft_id.as_deref(), Some("2"));
        assert_eq!(movements[1].amount, "9");
        assert!(movements.iter().all(|m| m.from == FROM && m.to == TO));
    }

    #[tokio::test]
    async fn test_erc1155_batch_expands_into_transfers() {
        let data = format!(
            "0x{}{}{}{}{}{}{}{}",
            word("64"),
            word("160"),
            word("2"),
            word("1"),
            word("2"),
            word("2"),
            word("5"),
            word("9")
        );
        let log = json!({
            "address": TOKEN,
            "topics": [TRANSFER_BATCH_TOPIC, topic(FROM), topic(FROM), topic(TO)],
            "data": data,
        });
        let h = harness(
            vec![extrinsic(1, "evm", "call", Some("5F"), json!({ "target": TOKEN }))],
            vec![event(0, "evm", "Log", vec![log], Phase::ApplyExtrinsic(1))],
        )
        .await;
        h.node.link_evm("5F", FROM);
        h.node.set_erc_balance(TOKEN, FROM, Some("1"), "0");
        h.node.set_erc_balance(TOKEN, TO, Some("1"), "5");
        h.node.set_erc_balance(TOKEN, FROM, Some("2"), "1");
        h.node.set_erc_balance(TOKEN, TO, Some("2"), "9");

        let (resolved, accounts) = h.resolve_all().await;
        let SemanticEvent::TokenTransfer {
            transfers, holders, ..
        } = &resolved[0]
        else {
            panic!("expected token transfer, got {:?}", resolved[0]);
        };

        assert_eq!(transfers.len(), 2);
        assert_eq!(
            transfers
                .iter()
                .map(|t| (t.nft_id.clone().unwrap(), t.amount.clone(), t.batch_index))
                .collect::<Vec<_>>(),
            vec![("1".to_string(), "5".to_string(), 0), ("2".to_string(), "9".to_string(), 1)]
        );
        for transfer in transfers {
            assert_eq!(transfer.kind, TransferKind::Erc1155);
            assert_eq!(transfer.from_address, "5F");
            assert_eq!(transfer.from_aux_address.as_deref(), Some(FROM));
            assert_eq!(transfer.to_address, "0x");
            assert_eq!(transfer.to_aux_address.as_deref(), Some(TO));
            assert_eq!(transfer.fee_amount, "1000");
        }
        assert_eq!(holders.len(), 4);
        let receiver = holders
            .iter()
            .find(|h| h.evm_address.as_deref() == Some(TO) && h.nft_id.as_deref() == Some("2"))
            .unwrap();
        assert_eq!(receiver.balance, "9");
        assert_eq!(receiver.signer_address, None);
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].address, "5F");
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_erc20_balance_failure_skips_holder_only() {
        let log = json!({
            "address": TOKEN,
            "topics": [TRANSFER_TOPIC, topic(FROM), topic(TO)],
            "data": format!("0x{}", word("250")),
        });
        let h = harness(
            vec![],
            vec![event(0, "evm", "Log", vec![log], Phase::Initialization)],
        )
        .await;
        h.node.set_erc_balance(TOKEN, TO, None, "250");

        let (resolved, _) = h.resolve_all().await;
        let SemanticEvent::TokenTransfer {
            log,
            transfers,
            holders,
        } = &resolved[0]
        else {
            panic!("expected token transfer");
        };
        assert_eq!(log.contract_address, TOKEN);
        assert_eq!(transfers[0].kind, TransferKind::Erc20);
        assert_eq!(transfers[0].amount, "250");
        assert_eq!(transfers[0].fee_amount, "0");
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].balance, "250");
        assert_eq!(h.reporter.count_for("resolver"), 1);
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_unclassified_event_passes_through() {
        let h = harness(
            vec![],
            vec![
                event(0, "newPallet", "SomethingHappened", vec![json!(1)], Phase::Initialization),
                event(1, "evm", "Log", vec![json!("garbage")], Phase::Initialization),
            ],
        )
        .await;
        let (resolved, accounts) = h.resolve_all().await;
        assert_eq!(resolved, vec![SemanticEvent::Default, SemanticEvent::Default]);
        assert!(accounts.is_empty());
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_reward_redirected_to_destination_account() {
        let h = harness(
            vec![],
            vec![event(
                0,
                "staking",
                "Rewarded",
                vec![json!("A"), json!("500")],
                Phase::Finalization,
            )],
        )
        .await;
        h.node
            .set_reward_destination("A", RewardDestination::Account("Z".to_string()));

        let (resolved, accounts) = h.resolve_all().await;
        let SemanticEvent::StakingReward(record) = &resolved[0] else {
            panic!("expected staking reward");
        };
        assert_eq!(record.signer_address, "Z");
        assert_eq!(record.amount, "500");
        assert_eq!(record.era, None);
        assert_eq!(record.validator_stash_address, None);
        assert_eq!(
            accounts.iter().map(|a| a.address.as_str()).collect::<Vec<_>>(),
            vec!["Z"]
        );
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_batched_payout_reward_is_attributed() {
        let h = harness(
            vec![extrinsic(
                4,
                "utility",
                "batch",
                Some("5Caller"),
                json!({ "calls": [{
                    "method": { "pallet": "staking", "method": "payoutStakers" },
                    "args": { "validator_stash": "V", "era": 7 }
                }] }),
            )],
            vec![
                event(10, "staking", "PayoutStarted", vec![json!(7), json!("V")], Phase::ApplyExtrinsic(4)),
                event(11, "staking", "Rewarded", vec![json!("A"), json!("1000")], Phase::ApplyExtrinsic(4)),
            ],
        )
        .await;
        let (resolved, _) = h.resolve_all().await;
        assert_eq!(resolved[0], SemanticEvent::Default);
        let SemanticEvent::StakingReward(record) = &resolved[1] else {
            panic!("expected staking reward");
        };
        assert_eq!(record.signer_address, "A");
        assert_eq!(record.era, Some(7));
        assert_eq!(record.validator_stash_address.as_deref(), Some("V"));
        assert_eq!(record.amount, "1000");
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_native_transfer_and_account_lifecycle() {
        let h = harness(
            vec![extrinsic(1, "balances", "transfer", Some("5A"), json!({ "dest": "5B", "value": "7" }))],
            vec![
                event(0, "balances", "Transfer", vec![json!("5A"), json!("5B"), json!("7")], Phase::ApplyExtrinsic(1)),
                event(
                    1,
                    "system",
                    "ExtrinsicFailed",
                    vec![json!({ "module": { "pallet": "balances", "name": "KeepAlive" } })],
                    Phase::ApplyExtrinsic(1),
                ),
                event(2, "system", "KilledAccount", vec![json!("5A")], Phase::ApplyExtrinsic(1)),
            ],
        )
        .await;
        h.node.set_balances(
            "5B",
            AccountBalances {
                free: "7".into(),
                ..Default::default()
            },
        );
        h.node.link_evm("5B", TO);

        let (resolved, accounts) = h.resolve_all().await;
        let SemanticEvent::NativeTransfer(transfer) = &resolved[0] else {
            panic!("expected native transfer");
        };
        assert_eq!(transfer.amount, "7");
        assert_eq!(transfer.extrinsic_id, Some(record_id(5, 1)));
        assert!(!transfer.success);
        assert_eq!(transfer.error_message.as_deref(), Some("balances.KeepAlive"));
        assert_eq!(transfer.to_aux_address.as_deref(), Some(TO));
        assert_eq!(transfer.token_address, DEFAULT_NATIVE_TOKEN_ADDRESS);
        assert_eq!(
            resolved[2],
            SemanticEvent::AccountKilled {
                address: "5A".to_string()
            }
        );

        let a = accounts.iter().find(|a| a.address == "5A").unwrap();
        let b = accounts.iter().find(|a| a.address == "5B").unwrap();
        assert!(!a.active);
        assert!(b.active);
        assert_eq!(b.free_balance, "7");
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_account_reaped_then_endowed_stays_active() {
        let h = harness(
            vec![],
            vec![
                event(0, "system", "KilledAccount", vec![json!("5A")], Phase::Initialization),
                event(1, "balances", "Endowed", vec![json!("5A"), json!("10")], Phase::Initialization),
            ],
        )
        .await;

        let (_, accounts) = h.resolve_all().await;
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].active);
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_contract_lifecycle_events() {
        const CONTRACT: &str = "0x00000000000000000000000000000000000000cc";
        let h = harness(
            vec![extrinsic(
                1,
                "evm",
                "create",
                Some("5Deployer"),
                json!({
                    "init": "0x6080604052aaa264697066735822bb",
                    "value": "0",
                    "gas_limit": "300000",
                    "storage_limit": "1000"
                }),
            )],
            vec![
                event(0, "evm", "Created", vec![json!(FROM), json!(CONTRACT)], Phase::ApplyExtrinsic(1)),
                event(1, "evm", "ContractPublished", vec![json!(CONTRACT)], Phase::ApplyExtrinsic(1)),
                event(2, "evm", "TransferredMaintainer", vec![json!(CONTRACT), json!(TO)], Phase::ApplyExtrinsic(1)),
            ],
        )
        .await;
        h.node.set_maintainer(CONTRACT, FROM);
        h.node.link_evm("5Deployer", FROM);

        let (resolved, _) = h.resolve_all().await;
        let SemanticEvent::ContractCreated(contract) = &resolved[0] else {
            panic!("expected contract creation");
        };
        assert_eq!(contract.address, CONTRACT);
        assert_eq!(contract.maintainer.as_deref(), Some("5Deployer"));
        assert_eq!(contract.context, "6080604052aa");
        assert_eq!(contract.args, "a264697066735822bb");
        assert_eq!(contract.gas_limit.as_deref(), Some("300000"));
        assert_eq!(
            resolved[1],
            SemanticEvent::ContractPublished {
                address: CONTRACT.to_string()
            }
        );
        assert_eq!(
            resolved[2],
            SemanticEvent::ContractOwnerChanged(ContractOwnerChange {
                address: CONTRACT.to_string(),
                owner: "5Deployer".to_string(),
            })
        );
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_contract_created_from_sidecar_block() {
        const CONTRACT: &str = "0x00000000000000000000000000000000000000ce";
        let (block, events) = crate::infrastructure::node::sidecar::parse_block(&json!({
            "number": "5",
            "hash": "0x05",
            "extrinsics": [{
                "method": { "pallet": "evm", "method": "create" },
                "signature": { "signer": { "id": "5Deployer" } },
                "args": {
                    "init": "0x6080604052aaa264697066735822bb",
                    "value": "0",
                    "gasLimit": "300000",
                    "storageLimit": "1000"
                },
                "hash": "0x30",
                "events": [
                    { "method": { "pallet": "evm", "method": "Created" }, "data": [FROM, CONTRACT] }
                ]
            }]
        }))
        .unwrap();
        let h = harness(block.extrinsics, events).await;

        let (resolved, _) = h.resolve_all().await;
        let SemanticEvent::ContractCreated(contract) = &resolved[0] else {
            panic!("expected contract creation");
        };
        assert_eq!(contract.bytecode, "0x6080604052aaa264697066735822bb");
        assert_eq!(contract.gas_limit.as_deref(), Some("300000"));
        assert_eq!(contract.storage_limit.as_deref(), Some("1000"));
        h.pool.close().await;
    }

    #[tokio::test]
    async fn test_owner_falls_back_to_contract_without_linked_maintainer() {
        const CONTRACT: &str = "0x00000000000000000000000000000000000000cd";
        let h = harness(
            vec![],
            vec![event(0, "evm", "TransferredMaintainer", vec![json!(CONTRACT), json!(TO)], Phase::Initialization)],
        )
        .await;
        h.node.set_maintainer(CONTRACT, TO);

        let (resolved, _) = h.resolve_all().await;
        assert_eq!(
            resolved[0],
            SemanticEvent::ContractOwnerChanged(ContractOwnerChange {
                address: CONTRACT.to_string(),
                owner: CONTRACT.to_string(),
            })
        );
        h.pool.close().await;
    }
}
