use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;

use chain_indexer::config::AppConfig;
use chain_indexer::utils::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logger();

    let config = AppConfig::from_env();

    logging::log_info("Running database migrations...");

    let connection = Database::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    Migrator::up(&connection, None)
        .await
        .context("Migration failed")?;

    logging::log_info("Migrations completed successfully!");

    Ok(())
}
