use crate::infrastructure::persistence::connection::DbPool;
use crate::infrastructure::persistence::repositories::{
    AccountRepository, BlockRepository, ContractRepository, ExtrinsicRepository, Repositories,
    RuntimeRepository, StakingRepository, TransferRepository,
};

/// Factory for creating repositories
pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Create all repositories
    pub fn create_repositories(db_pool: &DbPool) -> Repositories {
        let conn = db_pool.get_connection().clone();

        Repositories::new(
            BlockRepository::new(conn.clone()),
            ExtrinsicRepository::new(conn.clone()),
            TransferRepository::new(conn.clone()),
            AccountRepository::new(conn.clone()),
            StakingRepository::new(conn.clone()),
            ContractRepository::new(conn.clone()),
            RuntimeRepository::new(conn),
        )
    }
}
