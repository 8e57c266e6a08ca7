//! SeaORM Entity for contract table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contract")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub address: String,
    pub extrinsic_id: Option<i64>,
    pub block_id: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub maintainer: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub bytecode: String,
    #[sea_orm(column_type = "Text")]
    pub bytecode_context: String,
    #[sea_orm(column_type = "Text")]
    pub bytecode_arguments: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub gas_limit: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub storage_limit: Option<String>,
    pub published: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub owner: Option<String>,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
