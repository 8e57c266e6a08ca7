use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Native,
    Erc20,
    Erc721,
    Erc1155,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Native => "Native",
            TransferKind::Erc20 => "ERC20",
            TransferKind::Erc721 => "ERC721",
            TransferKind::Erc1155 => "ERC1155",
        }
    }
}

/// Derived transfer row.
///
/// Keyed by `(block_id, event_index, batch_index)`; `batch_index` is the position inside an
/// expanded ERC1155 batch and 0 for every other transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub block_id: u64,
    pub extrinsic_id: Option<i64>,
    pub event_index: u32,
    pub batch_index: u32,
    pub kind: TransferKind,
    pub from_address: String,
    pub to_address: String,
    pub from_aux_address: Option<String>,
    pub to_aux_address: Option<String>,
    pub token_address: String,
    pub amount: String,
    pub nft_id: Option<String>,
    pub fee_amount: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}
