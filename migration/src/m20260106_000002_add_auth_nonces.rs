use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Single-use login challenges, keyed by (address, nonce)
        manager
            .create_table(
                Table::create()
                    .table(AuthNonces::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuthNonces::Address).string_len(128).not_null())
                    .col(ColumnDef::new(AuthNonces::Nonce).string_len(64).not_null())
                    .col(
                        ColumnDef::new(AuthNonces::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthNonces::UsedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AuthNonces::Address)
                            .col(AuthNonces::Nonce),
                    )
                    .index(
                        Index::create()
                            .name("idx_auth_nonces_expiry")
                            .col(AuthNonces::ExpiresAt),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthNonces::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuthNonces {
    Table,
    Address,
    Nonce,
    ExpiresAt,
    UsedAt,
}
