//! SeaORM Entity for staking table
//! Rewards and slashes with their attributed era and validator

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "staking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub block_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_index: i32,
    #[sea_orm(column_type = "Text")]
    pub signer_address: String,
    #[sea_orm(column_type = "Text")]
    pub amount: String,
    pub era: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub validator_stash_address: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub kind: String,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
