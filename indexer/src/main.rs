use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

use chain_indexer::application::indexer::IndexerService;
use chain_indexer::config::AppConfig;
use chain_indexer::infrastructure::monitoring::{ErrorReporter, LogReporter};
use chain_indexer::infrastructure::node::{NodeConnectionPool, PoolConfig, ProviderFactory};
use chain_indexer::infrastructure::persistence::{DbPool, IndexRepository, RepositoryFactory};
use chain_indexer::utils::logging;

#[tokio::main]
async fn main() {
    logging::init_logger();
    logging::log_info(&format!(
        "[indexer] Starting chain-indexer v{}",
        env!("CARGO_PKG_VERSION")
    ));

    if let Err(e) = run().await {
        logging::log_error(&format!("[indexer] ❌ {:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter);

    let db_pool = DbPool::new(&config)
        .await
        .context("Failed to connect to database")?;
    let repository: Arc<dyn IndexRepository> =
        Arc::new(RepositoryFactory::create_repositories(&db_pool));

    let providers =
        ProviderFactory::create_providers(&config.node).context("Invalid node configuration")?;
    let pool = NodeConnectionPool::initialize(
        providers,
        PoolConfig::from_node_config(&config.node, config.indexer.stale_read_check),
        reporter.clone(),
    )
    .await
    .context("No node endpoint reachable")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => logging::log_info("[indexer] 🛑 Shutdown requested"),
            Err(e) => logging::log_error(&format!("[indexer] Failed to listen for Ctrl+C: {}", e)),
        }
        shutdown_tx.send_replace(true);
    });

    let service = IndexerService::new(pool.clone(), repository, reporter, config.indexer.clone());
    let result = service.run(shutdown_rx).await;
    pool.close().await;

    result.context("Indexer stopped")
}
