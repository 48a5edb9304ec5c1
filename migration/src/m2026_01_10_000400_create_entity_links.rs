//! Migration to create the entity_links table.
//!
//! Maps local entities to the remote identifier each service knows them
//! by; webhook handlers resolve inbound events through this table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EntityLinks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EntityLinks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EntityLinks::EntityType).text().not_null())
                    .col(
                        ColumnDef::new(EntityLinks::EntityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(EntityLinks::Service).text().not_null())
                    .col(ColumnDef::new(EntityLinks::RemoteId).text().not_null())
                    .col(ColumnDef::new(EntityLinks::LocalState).text().null())
                    .col(
                        ColumnDef::new(EntityLinks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EntityLinks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_entity_links_service_remote")
                    .table(EntityLinks::Table)
                    .col(EntityLinks::Service)
                    .col(EntityLinks::RemoteId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uq_entity_links_service_remote")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(EntityLinks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EntityLinks {
    Table,
    Id,
    EntityType,
    EntityId,
    Service,
    RemoteId,
    LocalState,
    CreatedAt,
    UpdatedAt,
}
