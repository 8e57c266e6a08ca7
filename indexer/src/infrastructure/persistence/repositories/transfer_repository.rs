use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use super::BATCH_SIZE;
use crate::domain::models::Transfer;
use crate::infrastructure::persistence::entities::transfer;
use crate::infrastructure::persistence::error::DbError;

/// Repository for native and token transfers
#[derive(Clone, Debug)]
pub struct TransferRepository {
    conn: DatabaseConnection,
}

impl TransferRepository {
    /// Create a new TransferRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn upsert_transfers(&self, rows: &[Transfer]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| transfer::ActiveModel {
                block_id: Set(row.block_id as i64),
                event_index: Set(row.event_index as i32),
                batch_index: Set(row.batch_index as i32),
                extrinsic_id: Set(row.extrinsic_id),
                kind: Set(row.kind.as_str().to_string()),
                from_address: Set(row.from_address.clone()),
                to_address: Set(row.to_address.clone()),
                from_evm_address: Set(row.from_aux_address.clone()),
                to_evm_address: Set(row.to_aux_address.clone()),
                token_address: Set(row.token_address.clone()),
                amount: Set(row.amount.clone()),
                nft_id: Set(row.nft_id.clone()),
                fee_amount: Set(row.fee_amount.clone()),
                success: Set(row.success),
                error_message: Set(row.error_message.clone()),
                timestamp: Set(row.timestamp),
            });
            transfer::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        transfer::Column::BlockId,
                        transfer::Column::EventIndex,
                        transfer::Column::BatchIndex,
                    ])
                    .update_columns([
                        transfer::Column::ExtrinsicId,
                        transfer::Column::Kind,
                        transfer::Column::FromAddress,
                        transfer::Column::ToAddress,
                        transfer::Column::FromEvmAddress,
                        transfer::Column::ToEvmAddress,
                        transfer::Column::TokenAddress,
                        transfer::Column::Amount,
                        transfer::Column::NftId,
                        transfer::Column::FeeAmount,
                        transfer::Column::Success,
                        transfer::Column::ErrorMessage,
                        transfer::Column::Timestamp,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
