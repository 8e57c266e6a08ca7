use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use chain_indexer::application::indexer::{
    BlockProcessor, BlockWalker, CommitTracker, IndexerService,
};
use chain_indexer::config::{IndexerConfig, DEFAULT_NATIVE_TOKEN_ADDRESS};
use chain_indexer::domain::errors::{BlockProcessorError, IndexerError};
use chain_indexer::domain::models::chain::{AccountBalances, Phase, SignedBlock};
use chain_indexer::domain::models::Block;
use chain_indexer::infrastructure::monitoring::RecordingReporter;
use chain_indexer::infrastructure::node::fixture::{self, event, extrinsic};
use chain_indexer::infrastructure::node::{ChainNode, FixtureNode, NodeConnectionPool, PoolConfig};
use chain_indexer::infrastructure::persistence::{IndexRepository, MemoryRepository};

fn test_config() -> IndexerConfig {
    IndexerConfig {
        max_blocks_per_step: 4,
        catch_up_chunk_size: 5,
        poll_interval_ms: 10,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        persistence_retry_budget: 3,
        shutdown_drain_timeout_ms: 1_000,
        ..IndexerConfig::default()
    }
}

async fn connect(node: Arc<FixtureNode>, reporter: Arc<RecordingReporter>) -> Arc<NodeConnectionPool> {
    NodeConnectionPool::initialize(
        vec![node as Arc<dyn ChainNode>],
        PoolConfig::default(),
        reporter,
    )
    .await
    .expect("fixture node should connect")
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

struct RunningIndexer {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<Result<(), IndexerError>>,
}

impl RunningIndexer {
    fn start(
        pool: Arc<NodeConnectionPool>,
        repository: Arc<MemoryRepository>,
        reporter: Arc<RecordingReporter>,
        config: IndexerConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let service = IndexerService::new(pool, repository, reporter, config);
        let task = tokio::spawn(async move { service.run(shutdown_rx).await });
        Self { shutdown, task }
    }

    async fn stop(self) -> Result<(), IndexerError> {
        self.shutdown.send_replace(true);
        self.task.await.expect("indexer task should not panic")
    }
}

#[tokio::test]
async fn test_every_finalized_block_indexed_once_despite_node_failures() {
    let node = Arc::new(FixtureNode::with_empty_chain("a", 30));
    node.fail_block(7, 2);
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node.clone(), reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());

    let indexer = RunningIndexer::start(pool, repository.clone(), reporter.clone(), test_config());
    wait_until("30 finalized blocks", || repository.finalized_ids().len() == 30).await;
    indexer.stop().await.unwrap();

    assert_eq!(repository.finalized_ids(), (0..30).collect::<Vec<u64>>());
    assert!(!repository.finalization_ever_reverted());
    assert!(reporter.count_for("walker") >= 1);
    assert_eq!(repository.runtimes().len(), 1);
}

#[tokio::test]
async fn test_restart_purges_unfinalized_rows_and_resumes() {
    let node = Arc::new(FixtureNode::with_empty_chain("a", 20));
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node.clone(), reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());

    let finalized: Vec<Block> = (0..10)
        .map(|id| Block {
            finalized: true,
            ..Block::placeholder(id, fixture::block_hash_for(id))
        })
        .collect();
    repository.upsert_blocks(&finalized).await.unwrap();
    repository
        .insert_placeholder_blocks(&[Block::placeholder(15, "0xstale".to_string())])
        .await
        .unwrap();

    let indexer = RunningIndexer::start(pool, repository.clone(), reporter, test_config());
    wait_until("20 finalized blocks", || repository.finalized_ids().len() == 20).await;
    indexer.stop().await.unwrap();

    assert_eq!(node.call_count("block_body"), 10);
    let replaced = repository.block(15).unwrap();
    assert_eq!(replaced.hash, fixture::block_hash_for(15));
    assert_eq!(replaced.author, "5FixtureAuthor");
    assert!(!repository.finalization_ever_reverted());
}

#[tokio::test]
async fn test_live_tail_is_indexed_before_finalization() {
    let node = Arc::new(FixtureNode::with_empty_chain("a", 13));
    node.insert_block(
        SignedBlock {
            header: fixture::header(11),
            extrinsics: vec![extrinsic(
                0,
                "balances",
                "transfer",
                Some("5Alice"),
                json!({ "dest": "5Bob", "value": "42" }),
            )],
        },
        vec![
            event(
                0,
                "balances",
                "Transfer",
                vec![json!("5Alice"), json!("5Bob"), json!("42")],
                Phase::ApplyExtrinsic(0),
            ),
            event(1, "system", "ExtrinsicSuccess", vec![json!({})], Phase::ApplyExtrinsic(0)),
        ],
        1_600_000_066_000,
    );
    node.set_heads(12, 9);
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node.clone(), reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());

    let indexer = RunningIndexer::start(pool, repository.clone(), reporter, test_config());
    wait_until("catch-up and a resolved tail", || {
        repository.finalized_ids().len() == 10
            && (10..=12).all(|id| {
                repository
                    .block(id)
                    .map_or(false, |block| block.author == "5FixtureAuthor")
            })
    })
    .await;

    for id in 10..=12 {
        assert!(!repository.block(id).unwrap().finalized);
    }
    let tail_events: Vec<_> = repository
        .events()
        .into_iter()
        .filter(|event| event.block_id == 11)
        .collect();
    assert_eq!(tail_events.len(), 2);
    assert_eq!(repository.transfers().len(), 1);
    assert_eq!(repository.transfers()[0].block_id, 11);
    assert_eq!(repository.extrinsics().len(), 1);

    node.set_heads(12, 12);
    wait_until("live tail finalized", || repository.finalized_ids().len() == 13).await;
    indexer.stop().await.unwrap();

    assert_eq!(repository.transfers().len(), 1);
    assert_eq!(repository.events().len(), 2);
    assert!(!repository.finalization_ever_reverted());
}

#[tokio::test]
async fn test_shutdown_finalizes_exactly_the_committed_prefix() {
    let node = Arc::new(FixtureNode::with_empty_chain("a", 40));
    // block 12 never resolves, so 13..=15 stay in flight behind it
    node.fail_block(12, usize::MAX);
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node.clone(), reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());

    let indexer = RunningIndexer::start(pool, repository.clone(), reporter, test_config());
    // 10 and 11 are committed but not flushed yet
    wait_until("blocks queued behind #12", || {
        repository.block(11).is_some()
            && repository.finalized_ids().len() == 10
            && node.call_count("block_body") == 15
    })
    .await;
    assert!(!repository.block(11).unwrap().finalized);

    indexer.stop().await.unwrap();

    assert_eq!(repository.finalized_ids(), (0..12).collect::<Vec<u64>>());
    assert_eq!(repository.blocks().len(), 12);
    assert!((12..16).all(|id| repository.block(id).is_none()));
    assert!(!repository.finalization_ever_reverted());
}

#[tokio::test]
async fn test_exhausted_persistence_budget_stops_the_walker() {
    let node = Arc::new(FixtureNode::with_empty_chain("a", 10));
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node, reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());
    repository.fail_next_writes(1_000);

    let config = IndexerConfig {
        persistence_retry_budget: 2,
        ..test_config()
    };
    let walker = BlockWalker::new(pool, repository.clone(), reporter, config);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        walker.run(Arc::new(CommitTracker::new(0)), shutdown_rx),
    )
    .await
    .expect("walker should stop on its own");

    match result {
        Err(IndexerError::Block {
            block_id: 0,
            source: BlockProcessorError::Db(_),
        }) => {}
        other => panic!("unexpected walker result: {:?}", other),
    }
    assert!(repository.blocks().is_empty());
}

#[tokio::test]
async fn test_reprocessing_a_block_reproduces_the_same_rows() {
    let alice = "5Alice";
    let bob = "5Bob";
    let node = Arc::new(FixtureNode::with_empty_chain("a", 3));
    node.insert_block(
        SignedBlock {
            header: fixture::header(3),
            extrinsics: vec![extrinsic(
                0,
                "balances",
                "transfer",
                Some(alice),
                json!({ "dest": bob, "value": "42" }),
            )],
        },
        vec![
            event(
                0,
                "balances",
                "Transfer",
                vec![json!(alice), json!(bob), json!("42")],
                Phase::ApplyExtrinsic(0),
            ),
            event(1, "system", "ExtrinsicSuccess", vec![json!({})], Phase::ApplyExtrinsic(0)),
            event(2, "staking", "Rewarded", vec![json!(bob), json!("7")], Phase::Finalization),
        ],
        1_600_000_018_000,
    );
    node.set_identity(alice, json!({ "display": "Alice" }));
    node.set_balances(
        alice,
        AccountBalances {
            free: "958".to_string(),
            reserved: "0".to_string(),
            locked: "0".to_string(),
            available: "958".to_string(),
            voting: "0".to_string(),
            vested: "0".to_string(),
            nonce: 1,
        },
    );
    node.set_heads(3, 3);
    let reporter = Arc::new(RecordingReporter::new());
    let pool = connect(node, reporter.clone()).await;
    let repository = Arc::new(MemoryRepository::new());
    let (_cancel_tx, mut cancel) = watch::channel(false);

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        let processor = BlockProcessor::new(
            pool.clone(),
            repository.clone(),
            Arc::new(CommitTracker::new(3)),
            reporter.clone(),
            DEFAULT_NATIVE_TOKEN_ADDRESS,
        );
        processor.process_block(3, &mut cancel).await.unwrap();
        snapshots.push((
            repository.blocks(),
            repository.extrinsics(),
            repository.events(),
            repository.transfers(),
            repository.accounts(),
            repository.token_holders(),
            repository.staking_records(),
        ));
    }

    assert_eq!(snapshots[0], snapshots[1]);
    let (_, _, _, transfers, accounts, holders, staking) = &snapshots[0];
    assert_eq!(transfers.len(), 1);
    assert_eq!(accounts.len(), 2);
    let alice_row = accounts.iter().find(|a| a.address == alice).unwrap();
    assert_eq!(alice_row.identity, json!({ "display": "Alice" }));
    assert_eq!(staking.len(), 1);
    assert_eq!(staking[0].signer_address, bob);
    assert_eq!(staking[0].era, None);
    assert!(holders
        .iter()
        .any(|holder| holder.signer_address.as_deref() == Some(alice) && holder.balance == "958"));
}
