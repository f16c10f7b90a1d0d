use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Users, keyed by lowercased wallet address
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Users::Address)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string_len(255).null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Static per-chain faucet configuration, synced from the config file at boot
        manager
            .create_table(
                Table::create()
                    .table(FaucetConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaucetConfigs::Chain)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaucetConfigs::Name).string_len(64).not_null())
                    .col(ColumnDef::new(FaucetConfigs::Token).string_len(16).not_null())
                    .col(ColumnDef::new(FaucetConfigs::RpcUrl).string_len(255).not_null())
                    .col(
                        ColumnDef::new(FaucetConfigs::FaucetUrl)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FaucetConfigs::CooldownHours)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FaucetConfigs::MaxAmount)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FaucetConfigs::MinBalance)
                            .string_len(32)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Donation pool mirror, one row per chain
        manager
            .create_table(
                Table::create()
                    .table(DonationPools::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DonationPools::Chain)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DonationPools::Token).string_len(16).not_null())
                    .col(
                        ColumnDef::new(DonationPools::TotalAmount)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DonationPools::Available)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DonationPools::Distributed)
                            .string_len(32)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Faucet request history; the newest row with a future cooldown blocks
        // further requests for that (user, chain)
        manager
            .create_table(
                Table::create()
                    .table(FaucetRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FaucetRequests::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FaucetRequests::UserId).big_integer().not_null())
                    .col(ColumnDef::new(FaucetRequests::Chain).string_len(32).not_null())
                    .col(ColumnDef::new(FaucetRequests::Token).string_len(16).not_null())
                    .col(ColumnDef::new(FaucetRequests::Amount).string_len(32).not_null())
                    .col(ColumnDef::new(FaucetRequests::Source).string_len(16).not_null())
                    .col(ColumnDef::new(FaucetRequests::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(FaucetRequests::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FaucetRequests::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FaucetRequests::CooldownUntil)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(FaucetRequests::TxHash).string_len(128).null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_faucet_requests_user")
                            .from(FaucetRequests::Table, FaucetRequests::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    // Index for the cooldown lookup (latest request per user+chain)
                    .index(
                        Index::create()
                            .name("idx_faucet_user_chain_time")
                            .col(FaucetRequests::UserId)
                            .col(FaucetRequests::Chain)
                            .col(FaucetRequests::RequestedAt),
                    )
                    // Index for active-cooldown scans
                    .index(
                        Index::create()
                            .name("idx_faucet_cooldown_until")
                            .col(FaucetRequests::UserId)
                            .col(FaucetRequests::Chain)
                            .col(FaucetRequests::CooldownUntil),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FaucetRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DonationPools::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(FaucetConfigs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Address,
    Email,
    CreatedAt,
}

#[derive(DeriveIden)]
enum FaucetConfigs {
    Table,
    Chain,
    Name,
    Token,
    RpcUrl,
    FaucetUrl,
    CooldownHours,
    MaxAmount,
    MinBalance,
}

#[derive(DeriveIden)]
enum DonationPools {
    Table,
    Chain,
    Token,
    TotalAmount,
    Available,
    Distributed,
}

#[derive(DeriveIden)]
enum FaucetRequests {
    Table,
    Id,
    UserId,
    Chain,
    Token,
    Amount,
    Source,
    Status,
    RequestedAt,
    CompletedAt,
    CooldownUntil,
    TxHash,
}
