use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use super::BATCH_SIZE;
use crate::domain::models::StakingRecord;
use crate::infrastructure::persistence::entities::staking_record;
use crate::infrastructure::persistence::error::DbError;

/// Repository for staking rewards and slashes
#[derive(Clone, Debug)]
pub struct StakingRepository {
    conn: DatabaseConnection,
}

impl StakingRepository {
    /// Create a new StakingRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn upsert_staking_records(&self, rows: &[StakingRecord]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| staking_record::ActiveModel {
                block_id: Set(row.block_id as i64),
                event_index: Set(row.event_index as i32),
                signer_address: Set(row.signer_address.clone()),
                amount: Set(row.amount.clone()),
                era: Set(row.era.map(|era| era as i32)),
                validator_stash_address: Set(row.validator_stash_address.clone()),
                kind: Set(row.kind.as_str().to_string()),
                timestamp: Set(row.timestamp),
            });
            staking_record::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        staking_record::Column::BlockId,
                        staking_record::Column::EventIndex,
                    ])
                    .update_columns([
                        staking_record::Column::SignerAddress,
                        staking_record::Column::Amount,
                        staking_record::Column::Era,
                        staking_record::Column::ValidatorStashAddress,
                        staking_record::Column::Kind,
                        staking_record::Column::Timestamp,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
