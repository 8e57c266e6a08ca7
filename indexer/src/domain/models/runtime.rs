/// First block seen running a given runtime spec version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeVersionRecord {
    pub spec_version: u32,
    pub spec_name: String,
    pub transaction_version: u32,
    pub block_id: u64,
}
