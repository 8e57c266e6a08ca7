use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use super::BATCH_SIZE;
use crate::domain::models::{Event, Extrinsic};
use crate::infrastructure::persistence::entities::{event, extrinsic};
use crate::infrastructure::persistence::error::DbError;

/// Repository for extrinsics and their events
#[derive(Clone, Debug)]
pub struct ExtrinsicRepository {
    conn: DatabaseConnection,
}

impl ExtrinsicRepository {
    /// Create a new ExtrinsicRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn upsert_extrinsics(&self, rows: &[Extrinsic]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| extrinsic::ActiveModel {
                id: Set(row.id),
                block_id: Set(row.block_id as i64),
                index: Set(row.index as i32),
                hash: Set(row.hash.clone()),
                section: Set(row.section.clone()),
                method: Set(row.method.clone()),
                signer: Set(row.signer.clone()),
                args: Set(row.args.clone()),
                success: Set(row.success),
                error_message: Set(row.error_message.clone()),
                fee_info: Set(row.fee_info.clone()),
                signed_data: Set(row.signed_data.clone()),
                timestamp: Set(row.timestamp),
            });
            extrinsic::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(extrinsic::Column::Id)
                        .update_columns([
                            extrinsic::Column::BlockId,
                            extrinsic::Column::Index,
                            extrinsic::Column::Hash,
                            extrinsic::Column::Section,
                            extrinsic::Column::Method,
                            extrinsic::Column::Signer,
                            extrinsic::Column::Args,
                            extrinsic::Column::Success,
                            extrinsic::Column::ErrorMessage,
                            extrinsic::Column::FeeInfo,
                            extrinsic::Column::SignedData,
                            extrinsic::Column::Timestamp,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }

    pub async fn upsert_events(&self, rows: &[Event]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| event::ActiveModel {
                id: Set(row.id),
                block_id: Set(row.block_id as i64),
                extrinsic_id: Set(row.extrinsic_id),
                index: Set(row.index as i32),
                section: Set(row.section.clone()),
                method: Set(row.method.clone()),
                data: Set(row.data.clone()),
                phase: Set(row.phase.clone()),
                timestamp: Set(row.timestamp),
            });
            event::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(event::Column::Id)
                        .update_columns([
                            event::Column::BlockId,
                            event::Column::ExtrinsicId,
                            event::Column::Index,
                            event::Column::Section,
                            event::Column::Method,
                            event::Column::Data,
                            event::Column::Phase,
                            event::Column::Timestamp,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
