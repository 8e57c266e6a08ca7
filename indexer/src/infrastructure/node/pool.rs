//! Redundant node connections with lag-aware routing.
//!
//! Each connection owns its head counters and availability flags; they are written only by the
//! connection's head watcher and by query outcomes, and read as atomics. Routing is the pure
//! function [`select_connection`] over a snapshot of that state.

use futures::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{ChainNode, NodeError};
use crate::config::NodeConfig;
use crate::infrastructure::monitoring::ErrorReporter;
use crate::utils::logging;

/// Consecutive query failures after which a connection stops taking round-robin traffic
const DEGRADE_AFTER_FAILURES: u64 = 3;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub query_timeout: Duration,
    pub reconnect_delay: Duration,
    pub stale_read_check: bool,
}

impl PoolConfig {
    pub fn from_node_config(config: &NodeConfig, stale_read_check: bool) -> Self {
        Self {
            query_timeout: config.query_timeout(),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            stale_read_check,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
            stale_read_check: false,
        }
    }
}

#[derive(Debug, Default)]
struct ConnectionState {
    best_head: AtomicU64,
    finalized_head: AtomicU64,
    /// Connected and receiving head notifications
    available: AtomicBool,
    /// Consecutive failed queries
    failures: AtomicU64,
}

#[derive(Debug)]
struct PoolConnection {
    index: usize,
    node: Arc<dyn ChainNode>,
    state: ConnectionState,
}

impl PoolConnection {
    fn view(&self) -> ConnectionView {
        ConnectionView {
            available: self.state.available.load(Ordering::Acquire),
            degraded: self.state.failures.load(Ordering::Acquire) >= DEGRADE_AFTER_FAILURES,
            best_head: self.state.best_head.load(Ordering::Acquire),
        }
    }

    fn record_success(&self) {
        self.state.failures.store(0, Ordering::Release);
    }

    fn record_failure(&self) {
        self.state.failures.fetch_add(1, Ordering::AcqRel);
    }
}

/// Routing-relevant snapshot of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionView {
    pub available: bool,
    pub degraded: bool,
    pub best_head: u64,
}

/// Outcome of [`select_connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    /// The chosen connection is behind the watermark
    pub stale: bool,
}

/// Picks the connection for the next query.
///
/// Round-robin from `start` over connections that are available, not degraded and whose best
/// head is at or above `watermark`. When none qualifies, the available connection with the
/// highest head is used instead so lag never blocks a read; `None` only when every connection
/// is unavailable.
pub fn select_connection(views: &[ConnectionView], watermark: u64, start: usize) -> Option<Selection> {
    let count = views.len();
    if count == 0 {
        return None;
    }

    for offset in 0..count {
        let index = (start + offset) % count;
        let view = views[index];
        if view.available && !view.degraded && view.best_head >= watermark {
            return Some(Selection { index, stale: false });
        }
    }

    views
        .iter()
        .enumerate()
        .filter(|(_, view)| view.available)
        .max_by_key(|(_, view)| (view.best_head >= watermark, !view.degraded, view.best_head))
        .map(|(index, view)| Selection {
            index,
            stale: view.best_head < watermark,
        })
}

/// Pool of node connections
#[derive(Debug)]
pub struct NodeConnectionPool {
    connections: Vec<PoolConnection>,
    cursor: AtomicUsize,
    watermark: AtomicU64,
    best_head_tx: watch::Sender<u64>,
    finalized_head_tx: watch::Sender<u64>,
    watchers: Mutex<Vec<JoinHandle<()>>>,
    config: PoolConfig,
    reporter: Arc<dyn ErrorReporter>,
}

impl NodeConnectionPool {
    /// Connects every endpoint and starts its head watcher.
    ///
    /// Endpoints that fail to answer are kept and retried by their watcher; the call fails only
    /// when no endpoint answers.
    pub async fn initialize(
        nodes: Vec<Arc<dyn ChainNode>>,
        config: PoolConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Arc<Self>, NodeError> {
        if nodes.is_empty() {
            return Err(NodeError::Config("no node endpoints configured".to_string()));
        }

        let (best_head_tx, _) = watch::channel(0);
        let (finalized_head_tx, _) = watch::channel(0);
        let pool = Arc::new(Self {
            connections: nodes
                .into_iter()
                .enumerate()
                .map(|(index, node)| PoolConnection {
                    index,
                    node,
                    state: ConnectionState::default(),
                })
                .collect(),
            cursor: AtomicUsize::new(0),
            watermark: AtomicU64::new(0),
            best_head_tx,
            finalized_head_tx,
            watchers: Mutex::new(Vec::new()),
            config,
            reporter,
        });

        let mut connected = 0;
        for connection in &pool.connections {
            match pool.probe(connection).await {
                Ok((best, finalized)) => {
                    connected += 1;
                    logging::log_info(&format!(
                        "[pool] ✅ Connected to {} (best #{}, finalized #{})",
                        connection.node.provider_name(),
                        best,
                        finalized
                    ));
                }
                Err(e) => {
                    logging::log_warning(&format!(
                        "[pool] ⚠️ Could not connect to {}: {}",
                        connection.node.provider_name(),
                        e
                    ));
                    pool.reporter
                        .report("pool", &connection.node.provider_name(), &e);
                }
            }
        }

        if connected == 0 {
            return Err(NodeError::AllEndpointsUnavailable);
        }

        pool.spawn_watchers();
        Ok(pool)
    }

    async fn probe(&self, connection: &PoolConnection) -> Result<(u64, u64), NodeError> {
        let timeout = self.config.query_timeout;
        let timeout_ms = timeout.as_millis() as u64;
        let best = tokio::time::timeout(timeout, connection.node.best_head())
            .await
            .map_err(|_| NodeError::Timeout(timeout_ms))??;
        let finalized = tokio::time::timeout(timeout, connection.node.finalized_head())
            .await
            .map_err(|_| NodeError::Timeout(timeout_ms))??;

        self.update_best_head(connection, best);
        self.update_finalized_head(connection, finalized);
        connection.state.available.store(true, Ordering::Release);
        Ok((best, finalized))
    }

    fn update_best_head(&self, connection: &PoolConnection, head: u64) {
        connection.state.best_head.store(head, Ordering::Release);
        let max = self.last_best_head();
        self.best_head_tx.send_if_modified(|current| {
            let changed = *current != max;
            *current = max;
            changed
        });
    }

    fn update_finalized_head(&self, connection: &PoolConnection, head: u64) {
        connection.state.finalized_head.store(head, Ordering::Release);
        let max = self.last_finalized_head();
        self.finalized_head_tx.send_if_modified(|current| {
            let changed = *current != max;
            *current = max;
            changed
        });
    }

    fn spawn_watchers(self: &Arc<Self>) {
        let handles: Vec<JoinHandle<()>> = (0..self.connections.len())
            .map(|index| {
                let pool = Arc::clone(self);
                tokio::spawn(async move { pool.watch_connection(index).await })
            })
            .collect();
        if let Ok(mut watchers) = self.watchers.lock() {
            watchers.extend(handles);
        }
    }

    /// Follows head notifications of one connection, reconnecting after the stream ends
    async fn watch_connection(self: Arc<Self>, index: usize) {
        let connection = &self.connections[index];
        let name = connection.node.provider_name();

        loop {
            let subscriptions = async {
                let new_heads = connection.node.subscribe_new_heads().await?;
                let finalized_heads = connection.node.subscribe_finalized_heads().await?;
                Ok::<_, NodeError>((new_heads, finalized_heads))
            }
            .await;

            match subscriptions {
                Ok((new_heads, finalized_heads)) => {
                    let mut heads = futures::stream::select(
                        new_heads.map(|head| (false, head)),
                        finalized_heads.map(|head| (true, head)),
                    );
                    while let Some((finalized, head)) = heads.next().await {
                        match head {
                            Ok(head) => {
                                if !connection.state.available.swap(true, Ordering::AcqRel) {
                                    logging::log_info(&format!("[pool] 🔌 {} is back online", name));
                                }
                                connection.record_success();
                                if finalized {
                                    self.update_finalized_head(connection, head);
                                } else {
                                    self.update_best_head(connection, head);
                                }
                            }
                            Err(e) => {
                                self.reporter.report("pool", &name, &e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => self.reporter.report("pool", &name, &e),
            }

            connection.state.available.store(false, Ordering::Release);
            logging::log_warning(&format!(
                "[pool] 🔌 {} disconnected, reconnecting in {}ms",
                name,
                self.config.reconnect_delay.as_millis()
            ));
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    /// Routes a query to an eligible connection, failing over to another connection on
    /// timeouts, transient errors and undecodable responses.
    ///
    /// A decode error is returned only when no connection produced anything else.
    pub async fn query<T, F, Fut>(&self, operation: F) -> Result<T, NodeError>
    where
        F: Fn(Arc<dyn ChainNode>) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let watermark = self.watermark.load(Ordering::Acquire);
        let timeout_ms = self.config.query_timeout.as_millis() as u64;
        let mut tried = vec![false; self.connections.len()];
        let mut last_error = None;
        let mut decode_error = None;

        loop {
            let views: Vec<ConnectionView> = self
                .connections
                .iter()
                .zip(&tried)
                .map(|(connection, tried)| {
                    let mut view = connection.view();
                    view.available &= !tried;
                    view
                })
                .collect();

            let start = self.cursor.fetch_add(1, Ordering::Relaxed);
            let Some(selection) = select_connection(&views, watermark, start) else {
                return Err(last_error
                    .or(decode_error)
                    .unwrap_or(NodeError::AllEndpointsUnavailable));
            };
            let connection = &self.connections[selection.index];
            tried[selection.index] = true;

            if selection.stale && self.config.stale_read_check {
                self.reporter.report(
                    "pool",
                    "stale read",
                    &format!(
                        "connection #{} at #{} is behind watermark #{}",
                        connection.index, views[selection.index].best_head, watermark
                    ),
                );
            }

            match tokio::time::timeout(self.config.query_timeout, operation(connection.node.clone()))
                .await
            {
                Ok(Ok(value)) => {
                    connection.record_success();
                    return Ok(value);
                }
                Ok(Err(e)) if e.is_transient() => {
                    connection.record_failure();
                    logging::log_debug(&format!(
                        "[pool] Query on connection #{} failed: {}",
                        connection.index, e
                    ));
                    last_error = Some(e);
                }
                Ok(Err(e @ NodeError::Decode(_))) => {
                    connection.record_failure();
                    logging::log_warning(&format!(
                        "[pool] Connection #{} returned an undecodable response: {}",
                        connection.index, e
                    ));
                    decode_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    connection.record_failure();
                    logging::log_debug(&format!(
                        "[pool] Query on connection #{} timed out",
                        connection.index
                    ));
                    last_error = Some(NodeError::Timeout(timeout_ms));
                }
            }
        }
    }

    /// Raises the do-not-query-behind watermark; it never moves backwards
    pub fn set_watermark(&self, block_id: u64) {
        self.watermark.fetch_max(block_id, Ordering::AcqRel);
    }

    pub fn watermark(&self) -> u64 {
        self.watermark.load(Ordering::Acquire)
    }

    /// Highest best head seen by any connection
    pub fn last_best_head(&self) -> u64 {
        self.connections
            .iter()
            .map(|c| c.state.best_head.load(Ordering::Acquire))
            .max()
            .unwrap_or(0)
    }

    /// Highest finalized head seen by any connection
    pub fn last_finalized_head(&self) -> u64 {
        self.connections
            .iter()
            .map(|c| c.state.finalized_head.load(Ordering::Acquire))
            .max()
            .unwrap_or(0)
    }

    pub fn subscribe_best_head(&self) -> watch::Receiver<u64> {
        self.best_head_tx.subscribe()
    }

    pub fn subscribe_finalized_head(&self) -> watch::Receiver<u64> {
        self.finalized_head_tx.subscribe()
    }

    pub fn available_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.state.available.load(Ordering::Acquire))
            .count()
    }

    /// Whether any reachable connection reports that its node is still syncing
    pub async fn are_any_syncing(&self) -> bool {
        for connection in &self.connections {
            if !connection.state.available.load(Ordering::Acquire) {
                continue;
            }
            match tokio::time::timeout(self.config.query_timeout, connection.node.health()).await {
                Ok(Ok(health)) if health.is_syncing => return true,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => self
                    .reporter
                    .report("pool", &connection.node.provider_name(), &e),
                Err(_) => logging::log_warning(&format!(
                    "[pool] Health check on {} timed out",
                    connection.node.provider_name()
                )),
            }
        }
        false
    }

    /// Stops the head watchers and releases every connection
    pub async fn close(&self) {
        let watchers = self
            .watchers
            .lock()
            .map(|mut watchers| std::mem::take(&mut *watchers))
            .unwrap_or_default();
        for watcher in watchers {
            watcher.abort();
        }
        for connection in &self.connections {
            connection.state.available.store(false, Ordering::Release);
            connection.node.close().await;
        }
        logging::log_info("[pool] All node connections closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::monitoring::{LogReporter, RecordingReporter};
    use crate::infrastructure::node::FixtureNode;

    fn view(best_head: u64) -> ConnectionView {
        ConnectionView {
            available: true,
            degraded: false,
            best_head,
        }
    }

    #[test]
    fn test_select_never_routes_behind_watermark() {
        let views = [view(100), view(80), view(95)];
        for start in 0..12 {
            let selection = select_connection(&views, 90, start).unwrap();
            assert_ne!(selection.index, 1);
            assert!(!selection.stale);
        }
    }

    #[test]
    fn test_select_round_robins_among_eligible() {
        let views = [view(100), view(80), view(95)];
        let picked: Vec<usize> = (0..3)
            .map(|start| select_connection(&views, 90, start).unwrap().index)
            .collect();
        assert_eq!(picked, vec![0, 2, 2]);
    }

    #[test]
    fn test_select_falls_back_to_highest_head_when_all_lag() {
        let views = [view(70), view(85), view(60)];
        assert_eq!(
            select_connection(&views, 90, 0),
            Some(Selection { index: 1, stale: true })
        );
    }

    #[test]
    fn test_select_skips_unavailable_and_degraded() {
        let mut views = [view(100), view(100), view(100)];
        views[0].available = false;
        views[1].degraded = true;
        assert_eq!(select_connection(&views, 50, 0).unwrap().index, 2);

        views[2].available = false;
        // only the degraded connection is left
        assert_eq!(select_connection(&views, 50, 0).unwrap().index, 1);

        views[1].available = false;
        assert_eq!(select_connection(&views, 50, 0), None);
    }

    #[tokio::test]
    async fn test_query_never_uses_lagging_connection() {
        let heads = [100u64, 80, 95];
        let nodes: Vec<Arc<FixtureNode>> = heads
            .iter()
            .enumerate()
            .map(|(i, head)| {
                let node = FixtureNode::with_empty_chain(&format!("n{}", i), head + 1);
                Arc::new(node)
            })
            .collect();
        let pool = NodeConnectionPool::initialize(
            nodes.iter().map(|n| n.clone() as Arc<dyn ChainNode>).collect(),
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();

        assert_eq!(pool.last_best_head(), 100);
        pool.set_watermark(90);
        for _ in 0..20 {
            pool.query(|node| async move { node.block_hash(10).await })
                .await
                .unwrap();
        }

        assert_eq!(nodes[1].call_count("block_hash"), 0);
        assert!(nodes[0].call_count("block_hash") > 0);
        assert!(nodes[2].call_count("block_hash") > 0);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_query_fails_over_on_transient_error() {
        let healthy = Arc::new(FixtureNode::with_empty_chain("healthy", 10));
        let flaky = Arc::new(FixtureNode::with_empty_chain("flaky", 10));
        flaky.fail_block(5, 100);

        let pool = NodeConnectionPool::initialize(
            vec![flaky.clone() as Arc<dyn ChainNode>, healthy.clone()],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();

        for _ in 0..4 {
            let hash = pool
                .query(|node| async move { node.block_hash(5).await })
                .await
                .unwrap();
            assert_eq!(hash, crate::infrastructure::node::fixture::block_hash_for(5));
        }
        pool.close().await;
    }

    #[tokio::test]
    async fn test_query_fails_over_on_undecodable_response() {
        let garbled = Arc::new(FixtureNode::with_empty_chain("garbled", 10));
        let healthy = Arc::new(FixtureNode::with_empty_chain("healthy", 10));
        garbled.corrupt_block(5, 100);

        let pool = NodeConnectionPool::initialize(
            vec![garbled.clone() as Arc<dyn ChainNode>, healthy.clone()],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();

        let hash = crate::infrastructure::node::fixture::block_hash_for(5);
        for _ in 0..4 {
            let hash = hash.clone();
            let body = pool
                .query(move |node| {
                    let hash = hash.clone();
                    async move { node.block_body(&hash).await }
                })
                .await
                .unwrap();
            assert_eq!(body.header.number, 5);
        }
        assert!(healthy.call_count("block_body") >= 4);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_decode_error_surfaces_when_every_connection_garbles() {
        let first = Arc::new(FixtureNode::with_empty_chain("first", 10));
        let second = Arc::new(FixtureNode::with_empty_chain("second", 10));
        first.corrupt_block(5, 100);
        second.corrupt_block(5, 100);

        let pool = NodeConnectionPool::initialize(
            vec![first.clone() as Arc<dyn ChainNode>, second.clone()],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();

        let hash = crate::infrastructure::node::fixture::block_hash_for(5);
        let result = pool
            .query(move |node| {
                let hash = hash.clone();
                async move { node.block_body(&hash).await }
            })
            .await;
        assert!(matches!(result, Err(NodeError::Decode(_))));
        assert_eq!(first.call_count("block_body"), 1);
        assert_eq!(second.call_count("block_body"), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_initialize_tolerates_partial_failure() {
        let up = Arc::new(FixtureNode::with_empty_chain("up", 5));
        let down = Arc::new(FixtureNode::with_empty_chain("down", 5));
        down.set_offline(true);
        let reporter = Arc::new(RecordingReporter::new());

        let pool = NodeConnectionPool::initialize(
            vec![down as Arc<dyn ChainNode>, up],
            PoolConfig::default(),
            reporter.clone(),
        )
        .await
        .unwrap();

        assert!(reporter.count_for("pool") >= 1);
        assert!(pool.available_connections() >= 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn test_initialize_fails_when_every_endpoint_fails() {
        let down = Arc::new(FixtureNode::with_empty_chain("down", 5));
        down.set_offline(true);

        let result = NodeConnectionPool::initialize(
            vec![down as Arc<dyn ChainNode>],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await;

        assert!(matches!(result, Err(NodeError::AllEndpointsUnavailable)));
    }

    #[tokio::test]
    async fn test_watermark_is_monotonic_and_syncing_is_reported() {
        let node = Arc::new(FixtureNode::with_empty_chain("a", 5));
        node.set_syncing(true);
        let pool = NodeConnectionPool::initialize(
            vec![node.clone() as Arc<dyn ChainNode>],
            PoolConfig::default(),
            Arc::new(LogReporter),
        )
        .await
        .unwrap();

        pool.set_watermark(4);
        pool.set_watermark(2);
        assert_eq!(pool.watermark(), 4);

        assert!(pool.are_any_syncing().await);
        node.set_syncing(false);
        assert!(!pool.are_any_syncing().await);
        pool.close().await;
    }
}
