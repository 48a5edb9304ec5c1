//! Migration to create the sync_logs table.
//!
//! Append-only audit trail of every inbound and outbound sync attempt.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncLogs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncLogs::EntityType).text().null())
                    .col(ColumnDef::new(SyncLogs::EntityId).big_integer().null())
                    .col(ColumnDef::new(SyncLogs::Direction).text().not_null())
                    .col(ColumnDef::new(SyncLogs::Service).text().not_null())
                    .col(ColumnDef::new(SyncLogs::Action).text().not_null())
                    .col(ColumnDef::new(SyncLogs::Status).text().not_null())
                    .col(ColumnDef::new(SyncLogs::RequestData).json_binary().null())
                    .col(ColumnDef::new(SyncLogs::ResponseData).json_binary().null())
                    .col(ColumnDef::new(SyncLogs::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(SyncLogs::DurationMs)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncLogs::SyncedAt)
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
                    .name("idx_sync_logs_service_direction_synced")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::Service)
                    .col(SyncLogs::Direction)
                    .col(SyncLogs::SyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_logs_service_direction_synced")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncLogs {
    Table,
    Id,
    EntityType,
    EntityId,
    Direction,
    Service,
    Action,
    Status,
    RequestData,
    ResponseData,
    ErrorMessage,
    DurationMs,
    SyncedAt,
}
