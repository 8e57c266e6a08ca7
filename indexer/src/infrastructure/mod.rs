pub mod monitoring;
pub mod node;
pub mod persistence;
