//! SeaORM Entity for account table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "account")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub address: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub evm_address: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub free_balance: String,
    #[sea_orm(column_type = "Text")]
    pub locked_balance: String,
    #[sea_orm(column_type = "Text")]
    pub available_balance: String,
    #[sea_orm(column_type = "Text")]
    pub reserved_balance: String,
    #[sea_orm(column_type = "Text")]
    pub voting_balance: String,
    #[sea_orm(column_type = "Text")]
    pub vested_balance: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub identity: Json,
    pub nonce: i64,
    pub evm_nonce: i64,
    pub block_id: i64,
    pub active: bool,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
