use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::domain::models::RuntimeVersionRecord;
use crate::infrastructure::persistence::entities::runtime_version;
use crate::infrastructure::persistence::error::DbError;

/// Repository for runtime versions
#[derive(Clone, Debug)]
pub struct RuntimeRepository {
    conn: DatabaseConnection,
}

impl RuntimeRepository {
    /// Create a new RuntimeRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Record a runtime version, keeping the earliest block it was seen at
    pub async fn upsert_runtime(&self, record: &RuntimeVersionRecord) -> Result<(), DbError> {
        let model = runtime_version::ActiveModel {
            spec_version: Set(record.spec_version as i64),
            spec_name: Set(record.spec_name.clone()),
            transaction_version: Set(record.transaction_version as i64),
            block_id: Set(record.block_id as i64),
        };
        runtime_version::Entity::insert(model)
            .on_conflict(
                OnConflict::column(runtime_version::Column::SpecVersion)
                    .value(
                        runtime_version::Column::BlockId,
                        Expr::cust(r#"LEAST("runtime_version"."block_id", EXCLUDED."block_id")"#),
                    )
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;
        Ok(())
    }
}
