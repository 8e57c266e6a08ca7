use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Foreign key from a per-block table to `block`; rows go away with their block
fn block_fk<T: IntoIden + 'static>(name: &str, table: T, column: T) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(name)
        .from(table, column)
        .to(Block::Table, Block::Id)
        .on_delete(ForeignKeyAction::Cascade)
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Block::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Block::Id).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(Block::Hash).text().not_null())
                    .col(ColumnDef::new(Block::ParentHash).text().not_null())
                    .col(ColumnDef::new(Block::StateRoot).text().not_null())
                    .col(ColumnDef::new(Block::ExtrinsicRoot).text().not_null())
                    .col(ColumnDef::new(Block::Author).text().not_null().default(""))
                    .col(ColumnDef::new(Block::Finalized).boolean().not_null().default(false))
                    .col(ColumnDef::new(Block::Timestamp).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Startup purge and resume point both filter on finalized
        manager
            .create_index(
                Index::create()
                    .name("idx_block_finalized")
                    .table(Block::Table)
                    .col(Block::Finalized)
                    .col(Block::Id)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BlockLog::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BlockLog::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(BlockLog::Index).integer().not_null())
                    .col(ColumnDef::new(BlockLog::Kind).text().not_null())
                    .col(ColumnDef::new(BlockLog::Data).json_binary().not_null())
                    .primary_key(Index::create().col(BlockLog::BlockId).col(BlockLog::Index))
                    .foreign_key(&mut block_fk("fk_block_log_block", BlockLog::Table, BlockLog::BlockId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Extrinsic::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Extrinsic::Id).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(Extrinsic::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Extrinsic::Index).integer().not_null())
                    .col(ColumnDef::new(Extrinsic::Hash).text().not_null())
                    .col(ColumnDef::new(Extrinsic::Section).text().not_null())
                    .col(ColumnDef::new(Extrinsic::Method).text().not_null())
                    .col(ColumnDef::new(Extrinsic::Signer).text())
                    .col(ColumnDef::new(Extrinsic::Args).json_binary().not_null())
                    .col(ColumnDef::new(Extrinsic::Success).boolean().not_null())
                    .col(ColumnDef::new(Extrinsic::ErrorMessage).text())
                    .col(ColumnDef::new(Extrinsic::FeeInfo).json_binary())
                    .col(ColumnDef::new(Extrinsic::SignedData).json_binary())
                    .col(ColumnDef::new(Extrinsic::Timestamp).timestamp_with_time_zone().not_null())
                    .foreign_key(&mut block_fk("fk_extrinsic_block", Extrinsic::Table, Extrinsic::BlockId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_extrinsic_block_id")
                    .table(Extrinsic::Table)
                    .col(Extrinsic::BlockId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_extrinsic_signer")
                    .table(Extrinsic::Table)
                    .col(Extrinsic::Signer)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Event::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Event::Id).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(Event::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Event::ExtrinsicId).big_integer())
                    .col(ColumnDef::new(Event::Index).integer().not_null())
                    .col(ColumnDef::new(Event::Section).text().not_null())
                    .col(ColumnDef::new(Event::Method).text().not_null())
                    .col(ColumnDef::new(Event::Data).json_binary().not_null())
                    .col(ColumnDef::new(Event::Phase).json_binary().not_null())
                    .col(ColumnDef::new(Event::Timestamp).timestamp_with_time_zone().not_null())
                    .foreign_key(&mut block_fk("fk_event_block", Event::Table, Event::BlockId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_event_section_method")
                    .table(Event::Table)
                    .col(Event::Section)
                    .col(Event::Method)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transfer::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Transfer::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Transfer::EventIndex).integer().not_null())
                    .col(ColumnDef::new(Transfer::BatchIndex).integer().not_null().default(0))
                    .col(ColumnDef::new(Transfer::ExtrinsicId).big_integer())
                    .col(ColumnDef::new(Transfer::Kind).text().not_null())
                    .col(ColumnDef::new(Transfer::FromAddress).text().not_null())
                    .col(ColumnDef::new(Transfer::ToAddress).text().not_null())
                    .col(ColumnDef::new(Transfer::FromEvmAddress).text())
                    .col(ColumnDef::new(Transfer::ToEvmAddress).text())
                    .col(ColumnDef::new(Transfer::TokenAddress).text().not_null())
                    .col(ColumnDef::new(Transfer::Amount).text().not_null())
                    .col(ColumnDef::new(Transfer::NftId).text())
                    .col(ColumnDef::new(Transfer::FeeAmount).text().not_null().default("0"))
                    .col(ColumnDef::new(Transfer::Success).boolean().not_null())
                    .col(ColumnDef::new(Transfer::ErrorMessage).text())
                    .col(ColumnDef::new(Transfer::Timestamp).timestamp_with_time_zone().not_null())
                    .primary_key(
                        Index::create()
                            .col(Transfer::BlockId)
                            .col(Transfer::EventIndex)
                            .col(Transfer::BatchIndex),
                    )
                    .foreign_key(&mut block_fk("fk_transfer_block", Transfer::Table, Transfer::BlockId))
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_transfer_from_address", Transfer::FromAddress),
            ("idx_transfer_to_address", Transfer::ToAddress),
            ("idx_transfer_token_address", Transfer::TokenAddress),
        ] {
            manager
                .create_index(
                    Index::create()
                        .name(name)
                        .table(Transfer::Table)
                        .col(column)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;
        }

        manager
            .create_table(
                Table::create()
                    .table(Account::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Account::Address).text().not_null().primary_key())
                    .col(ColumnDef::new(Account::EvmAddress).text())
                    .col(ColumnDef::new(Account::FreeBalance).text().not_null())
                    .col(ColumnDef::new(Account::LockedBalance).text().not_null())
                    .col(ColumnDef::new(Account::AvailableBalance).text().not_null())
                    .col(ColumnDef::new(Account::ReservedBalance).text().not_null())
                    .col(ColumnDef::new(Account::VotingBalance).text().not_null())
                    .col(ColumnDef::new(Account::VestedBalance).text().not_null())
                    .col(ColumnDef::new(Account::Identity).json_binary().not_null())
                    .col(ColumnDef::new(Account::Nonce).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Account::EvmNonce).big_integer().not_null().default(0))
                    .col(ColumnDef::new(Account::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Account::Active).boolean().not_null().default(true))
                    .col(ColumnDef::new(Account::Timestamp).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_account_evm_address")
                    .table(Account::Table)
                    .col(Account::EvmAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TokenHolder::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TokenHolder::HolderKey).text().not_null())
                    .col(ColumnDef::new(TokenHolder::TokenAddress).text().not_null())
                    .col(ColumnDef::new(TokenHolder::NftKey).text().not_null().default(""))
                    .col(ColumnDef::new(TokenHolder::SignerAddress).text())
                    .col(ColumnDef::new(TokenHolder::EvmAddress).text())
                    .col(ColumnDef::new(TokenHolder::NftId).text())
                    .col(ColumnDef::new(TokenHolder::Kind).text().not_null())
                    .col(ColumnDef::new(TokenHolder::Balance).text().not_null())
                    .col(ColumnDef::new(TokenHolder::Info).json_binary())
                    .col(ColumnDef::new(TokenHolder::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(TokenHolder::Timestamp).timestamp_with_time_zone().not_null())
                    .primary_key(
                        Index::create()
                            .col(TokenHolder::HolderKey)
                            .col(TokenHolder::TokenAddress)
                            .col(TokenHolder::NftKey),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_token_holder_token_address")
                    .table(TokenHolder::Table)
                    .col(TokenHolder::TokenAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Staking::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Staking::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Staking::EventIndex).integer().not_null())
                    .col(ColumnDef::new(Staking::SignerAddress).text().not_null())
                    .col(ColumnDef::new(Staking::Amount).text().not_null())
                    .col(ColumnDef::new(Staking::Era).integer())
                    .col(ColumnDef::new(Staking::ValidatorStashAddress).text())
                    .col(ColumnDef::new(Staking::Kind).text().not_null())
                    .col(ColumnDef::new(Staking::Timestamp).timestamp_with_time_zone().not_null())
                    .primary_key(Index::create().col(Staking::BlockId).col(Staking::EventIndex))
                    .foreign_key(&mut block_fk("fk_staking_block", Staking::Table, Staking::BlockId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_staking_signer_address")
                    .table(Staking::Table)
                    .col(Staking::SignerAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contract::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Contract::Address).text().not_null().primary_key())
                    .col(ColumnDef::new(Contract::ExtrinsicId).big_integer())
                    .col(ColumnDef::new(Contract::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(Contract::Maintainer).text())
                    .col(ColumnDef::new(Contract::Bytecode).text().not_null())
                    .col(ColumnDef::new(Contract::BytecodeContext).text().not_null())
                    .col(ColumnDef::new(Contract::BytecodeArguments).text().not_null())
                    .col(ColumnDef::new(Contract::GasLimit).text())
                    .col(ColumnDef::new(Contract::StorageLimit).text())
                    .col(ColumnDef::new(Contract::Published).boolean().not_null().default(false))
                    .col(ColumnDef::new(Contract::Owner).text())
                    .col(ColumnDef::new(Contract::Timestamp).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EvmEvent::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(EvmEvent::EventId).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(EvmEvent::BlockId).big_integer().not_null())
                    .col(ColumnDef::new(EvmEvent::EventIndex).integer().not_null())
                    .col(ColumnDef::new(EvmEvent::ExtrinsicIndex).integer())
                    .col(ColumnDef::new(EvmEvent::ContractAddress).text().not_null())
                    .col(ColumnDef::new(EvmEvent::Topics).json_binary().not_null())
                    .col(ColumnDef::new(EvmEvent::Data).text().not_null())
                    .col(ColumnDef::new(EvmEvent::Method).text().not_null())
                    .col(ColumnDef::new(EvmEvent::Verified).boolean().not_null().default(false))
                    .col(ColumnDef::new(EvmEvent::Status).text().not_null())
                    .col(ColumnDef::new(EvmEvent::ErrorMessage).text())
                    .foreign_key(&mut block_fk("fk_evm_event_block", EvmEvent::Table, EvmEvent::BlockId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_evm_event_contract_address")
                    .table(EvmEvent::Table)
                    .col(EvmEvent::ContractAddress)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RuntimeVersion::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RuntimeVersion::SpecVersion).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(RuntimeVersion::SpecName).text().not_null())
                    .col(ColumnDef::new(RuntimeVersion::TransactionVersion).big_integer().not_null())
                    .col(ColumnDef::new(RuntimeVersion::BlockId).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RuntimeVersion::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EvmEvent::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contract::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Staking::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TokenHolder::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Account::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transfer::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Event::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Extrinsic::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BlockLog::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Block::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Block {
    Table,
    Id,
    Hash,
    ParentHash,
    StateRoot,
    ExtrinsicRoot,
    Author,
    Finalized,
    Timestamp,
}

#[derive(DeriveIden)]
enum BlockLog {
    Table,
    BlockId,
    Index,
    Kind,
    Data,
}

#[derive(DeriveIden)]
enum Extrinsic {
    Table,
    Id,
    BlockId,
    Index,
    Hash,
    Section,
    Method,
    Signer,
    Args,
    Success,
    ErrorMessage,
    FeeInfo,
    SignedData,
    Timestamp,
}

#[derive(DeriveIden)]
enum Event {
    Table,
    Id,
    BlockId,
    ExtrinsicId,
    Index,
    Section,
    Method,
    Data,
    Phase,
    Timestamp,
}

#[derive(DeriveIden)]
enum Transfer {
    Table,
    BlockId,
    EventIndex,
    BatchIndex,
    ExtrinsicId,
    Kind,
    FromAddress,
    ToAddress,
    FromEvmAddress,
    ToEvmAddress,
    TokenAddress,
    Amount,
    NftId,
    FeeAmount,
    Success,
    ErrorMessage,
    Timestamp,
}

#[derive(DeriveIden)]
enum Account {
    Table,
    Address,
    EvmAddress,
    FreeBalance,
    LockedBalance,
    AvailableBalance,
    ReservedBalance,
    VotingBalance,
    VestedBalance,
    Identity,
    Nonce,
    EvmNonce,
    BlockId,
    Active,
    Timestamp,
}

#[derive(DeriveIden)]
enum TokenHolder {
    Table,
    HolderKey,
    TokenAddress,
    NftKey,
    SignerAddress,
    EvmAddress,
    NftId,
    Kind,
    Balance,
    Info,
    BlockId,
    Timestamp,
}

#[derive(DeriveIden)]
enum Staking {
    Table,
    BlockId,
    EventIndex,
    SignerAddress,
    Amount,
    Era,
    ValidatorStashAddress,
    Kind,
    Timestamp,
}

#[derive(DeriveIden)]
enum Contract {
    Table,
    Address,
    ExtrinsicId,
    BlockId,
    Maintainer,
    Bytecode,
    BytecodeContext,
    BytecodeArguments,
    GasLimit,
    StorageLimit,
    Published,
    Owner,
    Timestamp,
}

#[derive(DeriveIden)]
enum EvmEvent {
    Table,
    EventId,
    BlockId,
    EventIndex,
    ExtrinsicIndex,
    ContractAddress,
    Topics,
    Data,
    Method,
    Verified,
    Status,
    ErrorMessage,
}

#[derive(DeriveIden)]
enum RuntimeVersion {
    Table,
    SpecVersion,
    SpecName,
    TransactionVersion,
    BlockId,
}
