//! SeaORM Entity for runtime_version table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "runtime_version")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub spec_version: i64,
    #[sea_orm(column_type = "Text")]
    pub spec_name: String,
    pub transaction_version: i64,
    pub block_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
