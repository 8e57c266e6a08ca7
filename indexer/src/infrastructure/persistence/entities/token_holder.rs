//! SeaORM Entity for token_holder table
//! One row per (holder, token, nft); `nft_key` is the nft id or '' for fungible tokens

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "token_holder")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub holder_key: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub token_address: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub nft_key: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub signer_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub evm_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub nft_id: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub kind: String,
    #[sea_orm(column_type = "Text")]
    pub balance: String,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub info: Option<Json>,
    pub block_id: i64,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
