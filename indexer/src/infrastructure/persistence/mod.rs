pub mod connection;
pub mod entities;
pub mod error;
pub mod factory;
pub mod memory;
pub mod repositories;

pub use connection::DbPool;
pub use error::DbError;
pub use factory::RepositoryFactory;
pub use memory::MemoryRepository;
pub use repositories::{IndexRepository, Repositories};
