use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

use super::{NodeConnectionPool, NodeError};
use crate::domain::models::chain::{value_to_decimal, EventRecord, SignedBlock};

/// Everything the resolver needs about one block
#[derive(Debug, Clone)]
pub struct FetchedBlock {
    pub id: u64,
    pub hash: String,
    pub block: SignedBlock,
    pub events: Vec<EventRecord>,
    pub timestamp: DateTime<Utc>,
}

impl FetchedBlock {
    /// Events emitted while applying extrinsic `index`, in block order
    pub fn events_of_extrinsic(&self, index: u32) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(move |event| event.phase.extrinsic_index() == Some(index))
    }

    pub fn parent_hash(&self) -> &str {
        &self.block.header.parent_hash
    }
}

/// Retrieves block hash, body, events and timestamp through the pool
#[derive(Debug, Clone)]
pub struct BlockFetcher {
    pool: Arc<NodeConnectionPool>,
}

impl BlockFetcher {
    pub fn new(pool: Arc<NodeConnectionPool>) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, id: u64) -> Result<FetchedBlock, NodeError> {
        let hash = self
            .pool
            .query(|node| async move { node.block_hash(id).await })
            .await?;

        let (block, events) = {
            let body_hash = hash.clone();
            let events_hash = hash.clone();
            tokio::try_join!(
                self.pool.query(move |node| {
                    let hash = body_hash.clone();
                    async move { node.block_body(&hash).await }
                }),
                self.pool.query(move |node| {
                    let hash = events_hash.clone();
                    async move { node.events_at(&hash).await }
                }),
            )?
        };

        let millis = match inherent_timestamp(&block) {
            Some(millis) => millis,
            None => {
                let at = hash.clone();
                self.pool
                    .query(move |node| {
                        let at = at.clone();
                        async move { node.timestamp_at(&at).await }
                    })
                    .await?
            }
        };

        let timestamp = Utc
            .timestamp_millis_opt(millis as i64)
            .single()
            .ok_or_else(|| NodeError::Decode(format!("invalid timestamp {} in block {}", millis, id)))?;

        Ok(FetchedBlock {
            id,
            hash,
            block,
            events,
            timestamp,
        })
    }
}

/// Timestamp set by the `timestamp.set` inherent, when the block carries one
pub fn inherent_timestamp(block: &SignedBlock) -> Option<u64> {
    block
        .extrinsics
        .iter()
        .find(|extrinsic| extrinsic.is("timestamp", "set"))
        .and_then(|extrinsic| extrinsic.arg("now", 0))
        .and_then(value_to_decimal)
        .and_then(|now| now.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::monitoring::LogReporter;
    use crate::infrastructure::node::fixture::{self, FixtureNode};
    use crate::infrastructure::node::{ChainNode, PoolConfig};
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_prefers_inherent_timestamp() {
        let node = Arc::new(FixtureNode::with_empty_chain("a", 3));
        node.insert_block(
            SignedBlock {
                header: fixture::header(3),
                extrinsics: vec![fixture::extrinsic(
                    0,
                    "timestamp",
                    "set",
                    None,
                    json!({ "now": "1650000000000" }),
                )],
            },
            Vec::new(),
            42,
        );
        node.set_heads(3, 3);
        let pool = NodeConnectionPool::initialize(
            vec![node.clone() as Arc<dyn ChainNode>],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();
        let fetcher = BlockFetcher::new(pool.clone());

        let fetched = fetcher.fetch(3).await.unwrap();
        assert_eq!(fetched.hash, fixture::block_hash_for(3));
        assert_eq!(fetched.timestamp.timestamp_millis(), 1_650_000_000_000);
        assert_eq!(node.call_count("timestamp_at"), 0);

        // no inherent: falls back to storage
        let fetched = fetcher.fetch(1).await.unwrap();
        assert_eq!(fetched.timestamp.timestamp_millis(), 1_600_000_006_000);
        assert_eq!(node.call_count("timestamp_at"), 1);
        pool.close().await;
    }
}
