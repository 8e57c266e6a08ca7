pub mod account_manager;
pub mod bytecode;
pub mod event_resolver;
pub mod evm_abi;
pub mod extrinsic_status;
pub mod staking_attribution;

// Re-export services for direct imports
pub use account_manager::{AccountManager, NativeToken};
pub use event_resolver::{classify, EventKind, EventResolver, ResolveContext, SemanticEvent};
pub use staking_attribution::{attribute, Attribution, AttributionSource};
