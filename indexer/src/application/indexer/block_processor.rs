//! Block processor for handling individual block processing operations

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::domain::errors::BlockProcessorError;
use crate::domain::models::chain::EventRecord;
use crate::domain::models::{
    record_id, Block, BlockLog, Contract, ContractOwnerChange, Event, EvmEvent, Extrinsic,
    RuntimeVersionRecord, StakingRecord, TokenHolder, Transfer,
};
use crate::domain::services::event_resolver::{contract_address_of, parse_evm_log};
use crate::domain::services::evm_abi::word_to_address;
use crate::domain::services::extrinsic_status::{extrinsic_status, fee_columns};
use crate::domain::services::{
    classify, AccountManager, EventKind, EventResolver, NativeToken, ResolveContext, SemanticEvent,
};
use crate::infrastructure::monitoring::ErrorReporter;
use crate::infrastructure::node::{BlockFetcher, FetchedBlock, NodeConnectionPool};
use crate::infrastructure::persistence::IndexRepository;
use crate::utils::logging;

use super::commit_tracker::CommitTracker;

/// Counts of what one block produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSummary {
    pub id: u64,
    pub extrinsics: usize,
    pub events: usize,
    pub transfers: usize,
    pub staking: usize,
    pub accounts: usize,
}

/// Rows derived from one block, in write order
#[derive(Debug, Default)]
struct BlockRows {
    block: Vec<Block>,
    logs: Vec<BlockLog>,
    extrinsics: Vec<Extrinsic>,
    events: Vec<Event>,
    contracts: Vec<Contract>,
    published: Vec<String>,
    owner_changes: Vec<ContractOwnerChange>,
    evm_events: Vec<EvmEvent>,
    transfers: Vec<Transfer>,
    staking: Vec<StakingRecord>,
    holders: Vec<TokenHolder>,
    runtime: Option<RuntimeVersionRecord>,
}

/// Fetches, resolves and writes single blocks
#[derive(Debug)]
pub struct BlockProcessor {
    pool: Arc<NodeConnectionPool>,
    fetcher: BlockFetcher,
    resolver: EventResolver,
    repository: Arc<dyn IndexRepository>,
    commits: Arc<CommitTracker>,
    native_token: NativeToken,
    runtime_recorded: AtomicBool,
}

impl BlockProcessor {
    pub fn new(
        pool: Arc<NodeConnectionPool>,
        repository: Arc<dyn IndexRepository>,
        commits: Arc<CommitTracker>,
        reporter: Arc<dyn ErrorReporter>,
        native_token_address: &str,
    ) -> Self {
        Self {
            fetcher: BlockFetcher::new(pool.clone()),
            resolver: EventResolver::new(pool.clone(), reporter, native_token_address),
            pool,
            repository,
            commits,
            native_token: NativeToken::new(native_token_address),
            runtime_recorded: AtomicBool::new(false),
        }
    }

    pub fn commits(&self) -> &Arc<CommitTracker> {
        &self.commits
    }

    /// Indexes block `id`: fetch and resolve, wait for block `id - 1` to be committed, then
    /// write every row and mark `id` committed.
    ///
    /// The block row is written unfinalized; the walker flips committed ranges afterwards. Rows
    /// a tail write left for another block at `id` are dropped first.
    pub async fn process_block(
        &self,
        id: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<BlockSummary, BlockProcessorError> {
        let fetched = self.fetch_checked(id).await?;
        let accounts = self.account_manager(&fetched);
        let first_of_run = !self.runtime_recorded.load(Ordering::Acquire);
        let rows = self.resolve_block(&fetched, &accounts, first_of_run).await?;

        self.commits.wait_for_turn(id, cancel).await?;
        self.pool.set_watermark(id);

        let saved_accounts = {
            let _writes = self.commits.lock_writes().await;
            self.repository.delete_stale_block(id, &fetched.hash).await?;
            let saved = self.persist(&rows, &accounts).await?;
            self.commits.mark_committed(id);
            saved
        };
        if rows.runtime.is_some() {
            self.runtime_recorded.store(true, Ordering::Release);
        }

        let summary = summarize(id, &rows, saved_accounts);
        logging::log_info(&format!(
            "[block {}] ✅ Indexed {} extrinsics, {} events, {} transfers",
            id, summary.extrinsics, summary.events, summary.transfers
        ));
        Ok(summary)
    }

    /// Indexes best-chain block `id` above the finalized head.
    ///
    /// Rows are written unfinalized, without waiting for a turn and without committing `id`.
    /// Returns `None` when the walker has committed `id` already; its rows win.
    pub async fn process_unfinalized(
        &self,
        id: u64,
    ) -> Result<Option<BlockSummary>, BlockProcessorError> {
        let fetched = self.fetch_checked(id).await?;
        let accounts = self.account_manager(&fetched);
        let rows = self.resolve_block(&fetched, &accounts, false).await?;

        let _writes = self.commits.lock_writes().await;
        if self.commits.next_id() > id {
            return Ok(None);
        }
        self.repository.delete_stale_block(id, &fetched.hash).await?;
        let saved_accounts = self.persist(&rows, &accounts).await?;

        let summary = summarize(id, &rows, saved_accounts);
        logging::log_debug(&format!(
            "[block {}] Indexed unfinalized, {} events",
            id, summary.events
        ));
        Ok(Some(summary))
    }

    async fn fetch_checked(&self, id: u64) -> Result<FetchedBlock, BlockProcessorError> {
        let fetched = self.fetcher.fetch(id).await?;
        if fetched.block.header.number != id {
            return Err(BlockProcessorError::Processing(format!(
                "node returned block #{} for id {}",
                fetched.block.header.number, id
            )));
        }
        Ok(fetched)
    }

    fn account_manager(&self, fetched: &FetchedBlock) -> AccountManager {
        AccountManager::new(
            fetched.id,
            &fetched.hash,
            fetched.timestamp,
            self.pool.clone(),
            self.native_token.clone(),
        )
    }

    async fn resolve_block(
        &self,
        fetched: &FetchedBlock,
        accounts: &AccountManager,
        first_of_run: bool,
    ) -> Result<BlockRows, BlockProcessorError> {
        let id = fetched.id;
        let header = &fetched.block.header;

        try_join_all(
            fetched
                .block
                .extrinsics
                .iter()
                .filter_map(|extrinsic| extrinsic.signer.as_deref())
                .map(|signer| accounts.use_account(signer)),
        )
        .await?;

        let known_contracts = self.known_contracts(fetched).await?;
        let ctx = ResolveContext {
            block: fetched,
            accounts,
            known_contracts: &known_contracts,
        };
        let resolved = try_join_all(
            fetched
                .events
                .iter()
                .map(|event| self.resolver.resolve(&ctx, event)),
        )
        .await?;

        let mut rows = BlockRows {
            block: vec![Block {
                id,
                hash: fetched.hash.clone(),
                parent_hash: header.parent_hash.clone(),
                state_root: header.state_root.clone(),
                extrinsics_root: header.extrinsics_root.clone(),
                author: header.author.clone().unwrap_or_default(),
                finalized: false,
                timestamp: fetched.timestamp,
            }],
            logs: header
                .logs
                .iter()
                .map(|log| BlockLog {
                    block_id: id,
                    index: log.index,
                    kind: log.kind.clone(),
                    data: log.value.clone(),
                })
                .collect(),
            ..Default::default()
        };

        for extrinsic in &fetched.block.extrinsics {
            let status = extrinsic_status(fetched.events_of_extrinsic(extrinsic.index));
            let (fee_info, signed_data) = fee_columns(extrinsic);
            rows.extrinsics.push(Extrinsic {
                id: record_id(id, extrinsic.index),
                block_id: id,
                index: extrinsic.index,
                hash: extrinsic.hash.clone(),
                section: extrinsic.section.clone(),
                method: extrinsic.method.clone(),
                signer: extrinsic.signer.clone(),
                args: extrinsic.args.clone(),
                success: status.success,
                error_message: status.error_message,
                fee_info,
                signed_data,
                timestamp: fetched.timestamp,
            });
        }

        for (event, semantic) in fetched.events.iter().zip(resolved) {
            rows.events.push(event_row(fetched, event));
            match semantic {
                SemanticEvent::NativeTransfer(transfer) => rows.transfers.push(transfer),
                SemanticEvent::TokenTransfer {
                    log,
                    transfers,
                    holders,
                } => {
                    rows.evm_events.push(log);
                    rows.transfers.extend(transfers);
                    rows.holders.extend(holders);
                }
                SemanticEvent::EvmLog(log) | SemanticEvent::ExecutionFailed(log) => {
                    rows.evm_events.push(log)
                }
                SemanticEvent::ContractCreated(contract) => rows.contracts.push(contract),
                SemanticEvent::ContractPublished { address } => rows.published.push(address),
                SemanticEvent::ContractOwnerChanged(change) => rows.owner_changes.push(change),
                SemanticEvent::StakingReward(record) | SemanticEvent::StakingSlash(record) => {
                    rows.staking.push(record)
                }
                SemanticEvent::AccountEndowed { .. }
                | SemanticEvent::AccountReserved { .. }
                | SemanticEvent::AccountKilled { .. }
                | SemanticEvent::EvmAccountClaimed { .. }
                | SemanticEvent::Default => {}
            }
        }

        let code_updated = fetched
            .events
            .iter()
            .any(|event| event.is("system", "CodeUpdated"));
        if code_updated || first_of_run {
            let hash = fetched.hash.clone();
            let version = self
                .pool
                .query(move |node| {
                    let hash = hash.clone();
                    async move { node.runtime_version(&hash).await }
                })
                .await?;
            rows.runtime = Some(RuntimeVersionRecord {
                spec_version: version.spec_version,
                spec_name: version.spec_name,
                transaction_version: version.transaction_version,
                block_id: id,
            });
        }

        Ok(rows)
    }

    /// Contracts referenced by this block that are indexed already or created in it
    async fn known_contracts(
        &self,
        fetched: &FetchedBlock,
    ) -> Result<HashSet<String>, BlockProcessorError> {
        let mut created = HashSet::new();
        let mut referenced = HashSet::new();
        for event in &fetched.events {
            match classify(&event.section, &event.method) {
                EventKind::ContractCreated => created.extend(contract_address_of(event)),
                EventKind::EvmLog => {
                    if let Some(log) = parse_evm_log(&event.data) {
                        referenced.insert(log.address);
                        // token holders can be contracts too
                        referenced.extend(
                            log.topics
                                .iter()
                                .skip(1)
                                .filter_map(|topic| word_to_address(topic)),
                        );
                    }
                }
                EventKind::ExecutionFailed => referenced.extend(contract_address_of(event)),
                _ => {}
            }
        }

        let lookup: Vec<String> = referenced.difference(&created).cloned().collect();
        let mut known = if lookup.is_empty() {
            HashSet::new()
        } else {
            self.repository.known_contracts(&lookup).await?
        };
        known.extend(created);
        Ok(known)
    }

    /// Writes the rows parent first. Returns the number of account snapshots saved.
    async fn persist(
        &self,
        rows: &BlockRows,
        accounts: &AccountManager,
    ) -> Result<usize, BlockProcessorError> {
        let repository = self.repository.as_ref();
        repository.upsert_blocks(&rows.block).await?;
        repository.upsert_logs(&rows.logs).await?;
        repository.upsert_extrinsics(&rows.extrinsics).await?;
        repository.upsert_events(&rows.events).await?;
        repository.upsert_contracts(&rows.contracts).await?;
        repository.mark_contracts_published(&rows.published).await?;
        repository.update_contract_owners(&rows.owner_changes).await?;
        repository.upsert_evm_events(&rows.evm_events).await?;
        repository.upsert_transfers(&rows.transfers).await?;
        repository.upsert_staking_records(&rows.staking).await?;
        let saved = accounts.save(repository).await?;
        repository.upsert_token_holders(&rows.holders).await?;
        if let Some(runtime) = &rows.runtime {
            repository.upsert_runtime(runtime).await?;
        }
        Ok(saved)
    }
}

fn summarize(id: u64, rows: &BlockRows, accounts: usize) -> BlockSummary {
    BlockSummary {
        id,
        extrinsics: rows.extrinsics.len(),
        events: rows.events.len(),
        transfers: rows.transfers.len(),
        staking: rows.staking.len(),
        accounts,
    }
}

fn event_row(fetched: &FetchedBlock, event: &EventRecord) -> Event {
    Event {
        id: record_id(fetched.id, event.index),
        block_id: fetched.id,
        extrinsic_id: event
            .phase
            .extrinsic_index()
            .map(|index| record_id(fetched.id, index)),
        index: event.index,
        section: event.section.clone(),
        method: event.method.clone(),
        data: serde_json::Value::Array(event.data.clone()),
        phase: event.phase.to_json(),
        timestamp: fetched.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NATIVE_TOKEN_ADDRESS;
    use crate::domain::models::chain::{Phase, RuntimeVersion, SignedBlock};
    use crate::infrastructure::monitoring::RecordingReporter;
    use crate::infrastructure::node::fixture::{self, event, extrinsic};
    use crate::infrastructure::node::{ChainNode, FixtureNode, PoolConfig};
    use crate::infrastructure::persistence::MemoryRepository;
    use serde_json::json;
    use std::time::Duration;

    const ALICE: &str = "5Alice";
    const BOB: &str = "5Bob";

    async fn setup(next_id: u64) -> (Arc<FixtureNode>, Arc<MemoryRepository>, BlockProcessor) {
        let node = Arc::new(FixtureNode::with_empty_chain("a", 3));
        node.insert_block(
            SignedBlock {
                header: fixture::header(3),
                extrinsics: vec![
                    extrinsic(0, "timestamp", "set", None, json!({ "now": 1_600_000_018_000u64 })),
                    extrinsic(
                        1,
                        "balances",
                        "transferKeepAlive",
                        Some(ALICE),
                        json!({ "dest": BOB, "value": "500" }),
                    ),
                ],
            },
            vec![
                event(0, "system", "ExtrinsicSuccess", vec![json!({})], Phase::ApplyExtrinsic(0)),
                event(
                    1,
                    "balances",
                    "Transfer",
                    vec![json!(ALICE), json!(BOB), json!("500")],
                    Phase::ApplyExtrinsic(1),
                ),
                event(2, "system", "ExtrinsicSuccess", vec![json!({})], Phase::ApplyExtrinsic(1)),
            ],
            1_600_000_018_000,
        );
        node.set_heads(3, 3);

        let reporter = Arc::new(RecordingReporter::new());
        let pool = NodeConnectionPool::initialize(
            vec![node.clone() as Arc<dyn ChainNode>],
            PoolConfig::default(),
            reporter.clone(),
        )
        .await
        .unwrap();
        let repository = Arc::new(MemoryRepository::new());
        let processor = BlockProcessor::new(
            pool,
            repository.clone(),
            Arc::new(CommitTracker::new(next_id)),
            reporter,
            DEFAULT_NATIVE_TOKEN_ADDRESS,
        );
        (node, repository, processor)
    }

    #[tokio::test]
    async fn test_block_rows_are_written_unfinalized() {
        let (node, repository, processor) = setup(3).await;
        let (_cancel_tx, mut cancel) = watch::channel(false);

        let summary = processor.process_block(3, &mut cancel).await.unwrap();
        assert_eq!(summary.extrinsics, 2);
        assert_eq!(summary.events, 3);
        assert_eq!(summary.transfers, 1);

        let block = repository.block(3).unwrap();
        assert!(!block.finalized);
        assert_eq!(block.parent_hash, fixture::block_hash_for(2));

        let extrinsics = repository.extrinsics();
        assert!(extrinsics.iter().all(|e| e.success));
        assert_eq!(extrinsics[1].signer.as_deref(), Some(ALICE));

        let events = repository.events();
        assert_eq!(events[1].extrinsic_id, Some(record_id(3, 1)));

        let transfers = repository.transfers();
        assert_eq!(transfers[0].from_address, ALICE);
        assert_eq!(transfers[0].amount, "500");

        assert!(repository.account(ALICE).is_some());
        assert!(repository.account(BOB).is_some());
        assert_eq!(repository.runtimes().len(), 1);
        assert_eq!(node.call_count("runtime_version"), 1);
        assert_eq!(processor.commits().next_id(), 4);
    }

    #[tokio::test]
    async fn test_runtime_version_read_once_per_run() {
        let (node, repository, processor) = setup(1).await;
        node.set_runtime(RuntimeVersion {
            spec_name: "fixture".to_string(),
            spec_version: 9,
            transaction_version: 2,
        });
        let (_cancel_tx, mut cancel) = watch::channel(false);

        for id in 1..=3 {
            processor.process_block(id, &mut cancel).await.unwrap();
        }
        assert_eq!(node.call_count("runtime_version"), 1);
        let runtimes = repository.runtimes();
        assert_eq!(runtimes.len(), 1);
        assert_eq!(runtimes[0].block_id, 1);
        assert_eq!(runtimes[0].spec_version, 9);
    }

    #[tokio::test]
    async fn test_successor_writes_after_predecessor() {
        let (_node, repository, processor) = setup(2).await;
        let processor = Arc::new(processor);
        let (_cancel_tx, cancel) = watch::channel(false);

        let successor = {
            let processor = processor.clone();
            let mut cancel = cancel.clone();
            tokio::spawn(async move { processor.process_block(3, &mut cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(repository.block(3).is_none());

        let mut cancel = cancel.clone();
        processor.process_block(2, &mut cancel).await.unwrap();
        successor.await.unwrap().unwrap();
        assert!(repository.block(2).is_some());
        assert!(repository.block(3).is_some());
        assert_eq!(processor.commits().last_committed(), Some(3));
    }

    #[tokio::test]
    async fn test_write_failure_leaves_block_uncommitted() {
        let (_node, repository, processor) = setup(3).await;
        let (_cancel_tx, mut cancel) = watch::channel(false);

        repository.fail_next_writes(1);
        let err = processor.process_block(3, &mut cancel).await.unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(processor.commits().next_id(), 3);

        processor.process_block(3, &mut cancel).await.unwrap();
        assert_eq!(processor.commits().next_id(), 4);
    }

    #[tokio::test]
    async fn test_unfinalized_block_is_fully_indexed() {
        let (_node, repository, processor) = setup(0).await;

        let summary = processor.process_unfinalized(3).await.unwrap().unwrap();
        assert_eq!(summary.events, 3);
        assert_eq!(summary.transfers, 1);

        let block = repository.block(3).unwrap();
        assert!(!block.finalized);
        assert_eq!(block.author, "5FixtureAuthor");
        assert_eq!(repository.events().len(), 3);
        assert_eq!(repository.transfers().len(), 1);
        assert_eq!(processor.commits().next_id(), 0);
        assert!(repository.runtimes().is_empty());
    }

    #[tokio::test]
    async fn test_unfinalized_write_yields_to_committed_block() {
        let (_node, repository, processor) = setup(4).await;

        assert!(processor.process_unfinalized(3).await.unwrap().is_none());
        assert!(repository.block(3).is_none());
    }

    #[tokio::test]
    async fn test_committed_write_replaces_rows_of_orphaned_tail_block() {
        let (_node, repository, processor) = setup(3).await;
        repository
            .upsert_blocks(&[Block::placeholder(3, "0xorphan".to_string())])
            .await
            .unwrap();
        repository
            .upsert_events(&[Event {
                id: record_id(3, 9),
                block_id: 3,
                extrinsic_id: None,
                index: 9,
                section: "balances".into(),
                method: "Deposit".into(),
                data: json!([]),
                phase: json!("Finalization"),
                timestamp: chrono::Utc::now(),
            }])
            .await
            .unwrap();
        let (_cancel_tx, mut cancel) = watch::channel(false);

        processor.process_block(3, &mut cancel).await.unwrap();

        assert_eq!(repository.block(3).unwrap().hash, fixture::block_hash_for(3));
        let indexes: Vec<u32> = repository.events().iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
