pub mod account;
pub mod block;
pub mod block_log;
pub mod contract;
pub mod event;
pub mod evm_event;
pub mod extrinsic;
pub mod runtime_version;
pub mod staking_record;
pub mod token_holder;
pub mod transfer;
