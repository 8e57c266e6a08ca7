//! SeaORM Entity for block table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "block")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub hash: String,
    #[sea_orm(column_type = "Text")]
    pub parent_hash: String,
    #[sea_orm(column_type = "Text")]
    pub state_root: String,
    #[sea_orm(column_type = "Text")]
    pub extrinsic_root: String,
    #[sea_orm(column_type = "Text")]
    pub author: String,
    pub finalized: bool,
    #[sea_orm(column_type = "TimestampWithTimeZone")]
    pub timestamp: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
