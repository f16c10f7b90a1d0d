pub use sea_orm_migration::prelude::*;

mod m20260106_000001_create_faucet_tables;
mod m20260106_000002_add_auth_nonces;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260106_000001_create_faucet_tables::Migration),
            Box::new(m20260106_000002_add_auth_nonces::Migration),
        ]
    }
}
