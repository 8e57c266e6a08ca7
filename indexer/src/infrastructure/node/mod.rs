//! Chain node access: the provider trait, concrete providers and the connection pool.

pub mod error;
pub mod fetcher;
pub mod fixture;
pub mod pool;
pub mod provider_factory;
pub mod sidecar;

pub use error::NodeError;
pub use fetcher::{BlockFetcher, FetchedBlock};
pub use fixture::FixtureNode;
pub use pool::{NodeConnectionPool, PoolConfig};
pub use provider_factory::ProviderFactory;
pub use sidecar::SidecarNode;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::domain::models::chain::{
    AccountBalances, EventRecord, NodeHealth, RewardDestination, RuntimeVersion, SignedBlock,
};

/// Stream of head block numbers
pub type HeadStream = BoxStream<'static, Result<u64, NodeError>>;

/// Query surface of one chain node endpoint
#[async_trait]
pub trait ChainNode: Send + Sync + std::fmt::Debug {
    /// Get the provider name for identification
    fn provider_name(&self) -> String;

    async fn block_hash(&self, id: u64) -> Result<String, NodeError>;

    async fn block_body(&self, hash: &str) -> Result<SignedBlock, NodeError>;

    /// Events of a block in chain order
    async fn events_at(&self, hash: &str) -> Result<Vec<EventRecord>, NodeError>;

    /// Timestamp storage value (milliseconds) at a block
    async fn timestamp_at(&self, hash: &str) -> Result<u64, NodeError>;

    async fn runtime_version(&self, hash: &str) -> Result<RuntimeVersion, NodeError>;

    /// Registered identity, `Value::Null` when none is set
    async fn account_identity(&self, address: &str, at: Option<&str>)
        -> Result<Value, NodeError>;

    async fn balances_all(
        &self,
        address: &str,
        at: Option<&str>,
    ) -> Result<AccountBalances, NodeError>;

    async fn reward_destination(
        &self,
        at: &str,
        address: &str,
    ) -> Result<RewardDestination, NodeError>;

    /// EVM address claimed by a native account
    async fn evm_address_of(&self, address: &str, at: Option<&str>)
        -> Result<Option<String>, NodeError>;

    /// Native account linked to an EVM address
    async fn native_address_of(
        &self,
        evm_address: &str,
        at: Option<&str>,
    ) -> Result<Option<String>, NodeError>;

    async fn evm_nonce(&self, evm_address: &str, at: Option<&str>) -> Result<u64, NodeError>;

    /// EVM address of a contract's maintainer
    async fn contract_maintainer(
        &self,
        contract: &str,
        at: &str,
    ) -> Result<Option<String>, NodeError>;

    /// ERC20 `balanceOf(holder)` or ERC1155 `balanceOf(holder, id)` at a block
    async fn erc_balance_of(
        &self,
        contract: &str,
        holder: &str,
        token_id: Option<&str>,
        block_id: u64,
    ) -> Result<String, NodeError>;

    async fn best_head(&self) -> Result<u64, NodeError>;

    async fn finalized_head(&self) -> Result<u64, NodeError>;

    async fn subscribe_new_heads(&self) -> Result<HeadStream, NodeError>;

    async fn subscribe_finalized_heads(&self) -> Result<HeadStream, NodeError>;

    async fn health(&self) -> Result<NodeHealth, NodeError>;

    /// Release provider resources
    async fn close(&self) {}
}
