use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use super::BATCH_SIZE;
use crate::domain::models::{Block, BlockLog};
use crate::infrastructure::persistence::entities::{block, block_log};
use crate::infrastructure::persistence::error::DbError;

/// Repository for block and block log operations
#[derive(Clone, Debug)]
pub struct BlockRepository {
    conn: DatabaseConnection,
}

impl BlockRepository {
    /// Create a new BlockRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn to_active_model(row: &Block) -> block::ActiveModel {
        block::ActiveModel {
            id: Set(row.id as i64),
            hash: Set(row.hash.clone()),
            parent_hash: Set(row.parent_hash.clone()),
            state_root: Set(row.state_root.clone()),
            extrinsic_root: Set(row.extrinsics_root.clone()),
            author: Set(row.author.clone()),
            finalized: Set(row.finalized),
            timestamp: Set(row.timestamp),
        }
    }

    /// Insert or replace block rows. A finalized row stays finalized.
    pub async fn upsert_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            block::Entity::insert_many(chunk.iter().map(Self::to_active_model))
                .on_conflict(
                    OnConflict::column(block::Column::Id)
                        .update_columns([
                            block::Column::Hash,
                            block::Column::ParentHash,
                            block::Column::StateRoot,
                            block::Column::ExtrinsicRoot,
                            block::Column::Author,
                            block::Column::Timestamp,
                        ])
                        .value(
                            block::Column::Finalized,
                            Expr::cust(r#""block"."finalized" OR EXCLUDED."finalized""#),
                        )
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }

    /// Insert rows for ids not stored yet
    pub async fn insert_placeholder_blocks(&self, rows: &[Block]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            block::Entity::insert_many(chunk.iter().map(Self::to_active_model))
                .on_conflict(
                    OnConflict::column(block::Column::Id)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }

    /// Mark blocks `from_id..=to_id` finalized
    pub async fn finalize_blocks_in_range(&self, from_id: u64, to_id: u64) -> Result<u64, DbError> {
        let result = block::Entity::update_many()
            .col_expr(block::Column::Finalized, Expr::value(true))
            .filter(block::Column::Id.gte(from_id as i64))
            .filter(block::Column::Id.lte(to_id as i64))
            .filter(block::Column::Finalized.eq(false))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Remove every unfinalized block row
    pub async fn delete_unfinished_blocks(&self) -> Result<u64, DbError> {
        let result = block::Entity::delete_many()
            .filter(block::Column::Finalized.eq(false))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Remove the unfinalized row of block `id` unless it carries `hash`; derived rows cascade
    pub async fn delete_stale_block(&self, id: u64, hash: &str) -> Result<bool, DbError> {
        let result = block::Entity::delete_many()
            .filter(block::Column::Id.eq(id as i64))
            .filter(block::Column::Finalized.eq(false))
            .filter(block::Column::Hash.ne(hash))
            .exec(&self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Highest finalized block id
    pub async fn last_finalized_id(&self) -> Result<Option<u64>, DbError> {
        let result = block::Entity::find()
            .filter(block::Column::Finalized.eq(true))
            .order_by_desc(block::Column::Id)
            .one(&self.conn)
            .await?;
        Ok(result.map(|b| b.id as u64))
    }

    pub async fn upsert_logs(&self, rows: &[BlockLog]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| block_log::ActiveModel {
                block_id: Set(row.block_id as i64),
                index: Set(row.index as i32),
                kind: Set(row.kind.clone()),
                data: Set(row.data.clone()),
            });
            block_log::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([block_log::Column::BlockId, block_log::Column::Index])
                        .update_columns([block_log::Column::Kind, block_log::Column::Data])
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
