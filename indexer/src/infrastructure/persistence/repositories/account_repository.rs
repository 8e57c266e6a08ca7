use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::collections::BTreeMap;

use super::BATCH_SIZE;
use crate::domain::models::{Account, TokenHolder};
use crate::infrastructure::persistence::entities::{account, token_holder};
use crate::infrastructure::persistence::error::DbError;

/// Repository for account snapshots and token holder balances
#[derive(Clone, Debug)]
pub struct AccountRepository {
    conn: DatabaseConnection,
}

impl AccountRepository {
    /// Create a new AccountRepository
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Upsert account snapshots; a snapshot from an older block never replaces a newer one
    pub async fn upsert_accounts(&self, rows: &[Account]) -> Result<(), DbError> {
        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|row| account::ActiveModel {
                address: Set(row.address.clone()),
                evm_address: Set(row.evm_address.clone()),
                free_balance: Set(row.free_balance.clone()),
                locked_balance: Set(row.locked_balance.clone()),
                available_balance: Set(row.available_balance.clone()),
                reserved_balance: Set(row.reserved_balance.clone()),
                voting_balance: Set(row.voting_balance.clone()),
                vested_balance: Set(row.vested_balance.clone()),
                identity: Set(row.identity.clone()),
                nonce: Set(row.nonce as i64),
                evm_nonce: Set(row.evm_nonce as i64),
                block_id: Set(row.block_id as i64),
                active: Set(row.active),
                timestamp: Set(row.timestamp),
            });
            account::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::column(account::Column::Address)
                        .update_columns([
                            account::Column::EvmAddress,
                            account::Column::FreeBalance,
                            account::Column::LockedBalance,
                            account::Column::AvailableBalance,
                            account::Column::ReservedBalance,
                            account::Column::VotingBalance,
                            account::Column::VestedBalance,
                            account::Column::Identity,
                            account::Column::Nonce,
                            account::Column::EvmNonce,
                            account::Column::BlockId,
                            account::Column::Active,
                            account::Column::Timestamp,
                        ])
                        .action_and_where(Expr::cust(
                            r#"EXCLUDED."block_id" >= "account"."block_id""#,
                        ))
                        .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }

    /// Upsert absolute holder balances keyed by (holder, token, nft)
    pub async fn upsert_token_holders(&self, rows: &[TokenHolder]) -> Result<(), DbError> {
        // one statement cannot touch the same key twice; the last snapshot wins
        let deduped: BTreeMap<(String, String, String), &TokenHolder> = rows
            .iter()
            .map(|row| {
                (
                    (
                        row.holder_key().to_string(),
                        row.token_address.clone(),
                        row.nft_id.clone().unwrap_or_default(),
                    ),
                    row,
                )
            })
            .collect();
        let rows: Vec<_> = deduped.into_iter().collect();

        for chunk in rows.chunks(BATCH_SIZE) {
            let models = chunk.iter().map(|((holder_key, token, nft_key), row)| {
                token_holder::ActiveModel {
                    holder_key: Set(holder_key.clone()),
                    token_address: Set(token.clone()),
                    nft_key: Set(nft_key.clone()),
                    signer_address: Set(row.signer_address.clone()),
                    evm_address: Set(row.evm_address.clone()),
                    nft_id: Set(row.nft_id.clone()),
                    kind: Set(row.kind.as_str().to_string()),
                    balance: Set(row.balance.clone()),
                    info: Set(row.info.clone()),
                    block_id: Set(row.block_id as i64),
                    timestamp: Set(row.timestamp),
                }
            });
            token_holder::Entity::insert_many(models)
                .on_conflict(
                    OnConflict::columns([
                        token_holder::Column::HolderKey,
                        token_holder::Column::TokenAddress,
                        token_holder::Column::NftKey,
                    ])
                    .update_columns([
                        token_holder::Column::SignerAddress,
                        token_holder::Column::EvmAddress,
                        token_holder::Column::NftId,
                        token_holder::Column::Kind,
                        token_holder::Column::Balance,
                        token_holder::Column::Info,
                        token_holder::Column::BlockId,
                        token_holder::Column::Timestamp,
                    ])
                    .action_and_where(Expr::cust(
                        r#"EXCLUDED."block_id" >= "token_holder"."block_id""#,
                    ))
                    .to_owned(),
                )
                .exec_without_returning(&self.conn)
                .await?;
        }
        Ok(())
    }
}
