//! SeaORM Entity for block_log table
//! Header digest logs

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "block_log")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub block_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub index: i32,
    #[sea_orm(column_type = "Text")]
    pub kind: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
