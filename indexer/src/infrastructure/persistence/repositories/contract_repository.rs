use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set};
use std::collections::HashSet;

use super::BATCH_SIZE;
use crate::domain::models::{Contract, ContractOwnerChange, EvmEvent};
use crate::infrastructure::persistence::entities::{contract, evm_event};
use crate::infrastructure::persistence::error::DbError;

/// Repository for EVM contracts and their events
#[derive(Clone, Debug)]
pub struct ContractRepository {
    conn: DatabaseConnection,
}

impl ContractRepository {
    /// Create a new ContractRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert contracts that are not known yet
    pub async fn upsert_contracts(&self, rows: &[Contract]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| contract::ActiveModel {
                address: Set(row.address.clone()),
                extrinsic_id: Set(row.extrinsic_id),
                block_id: Set(row.block_id as i64),
                maintainer: Set(row.maintainer.clone()),
                bytecode: Set(row.bytecode.clone()),
                bytecode_context: Set(row.context.clone()),
                bytecode_arguments: Set(row.args.clone()),
                gas_limit: Set(row.gas_limit.clone()),
                storage_limit: Set(row.storage_limit.clone()),
                published: Set(row.published),
                owner: Set(row.owner.clone()),
                timestamp: Set(row.timestamp),
            });
            contract::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(contract::Column::Address)
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }

    pub async fn mark_contracts_published(&self, addresses: &[String]) -> Result<(), DbError> {
        if addresses.is_empty() {
            return Ok(());
        }
        contract::Entity::update_many()
            .col_expr(contract::Column::Published, Expr::value(true))
            .filter(contract::Column::Address.is_in(addresses.iter().cloned()))
            .exec(&self.conn)
            .await?;
        Ok(())
    }

    pub async fn update_contract_owners(
        &self,
        changes: &[ContractOwnerChange],
    ) -> Result<(), DbError> {
        for change in changes {
            contract::Entity::update_many()
                .col_expr(contract::Column::Owner, Expr::value(change.owner.clone()))
                .filter(contract::Column::Address.eq(change.address.clone()))
                .exec(&self.conn)
                .await?;
        }
        Ok(())
    }

    /// The subset of `addresses` with a stored contract
    pub async fn known_contracts(&self, addresses: &[String]) -> Result<HashSet<String>, DbError> {
        if addresses.is_empty() {
            return Ok(HashSet::new());
        }
        let found: Vec<String> = contract::Entity::find()
            .select_only()
            .column(contract::Column::Address)
            .filter(contract::Column::Address.is_in(addresses.iter().cloned()))
            .into_tuple()
            .all(&self.conn)
            .await?;
        Ok(found.into_iter().collect())
    }

    pub async fn upsert_evm_events(&self, rows: &[EvmEvent]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| evm_event::ActiveModel {
                event_id: Set(row.event_id),
                block_id: Set(row.block_id as i64),
                event_index: Set(row.event_index as i32),
                extrinsic_index: Set(row.extrinsic_index.map(|i| i as i32)),
                contract_address: Set(row.contract_address.clone()),
                topics: Set(serde_json::json!(row.topics)),
                data: Set(row.data.clone()),
                method: Set(row.method.as_str().to_string()),
                verified: Set(row.verified),
                status: Set(if row.success { "Success" } else { "Error" }.to_string()),
                error_message: Set(row.error_message.clone()),
            });
            evm_event::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(evm_event::Column::EventId)
                        .update_columns([
                            evm_event::Column::ContractAddress,
                            evm_event::Column::Topics,
                            evm_event::Column::Data,
                            evm_event::Column::Method,
                            evm_event::Column::Verified,
                            evm_event::Column::Status,
                            evm_event::Column::ErrorMessage,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
