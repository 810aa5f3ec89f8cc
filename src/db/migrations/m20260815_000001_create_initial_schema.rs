use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create resources table
        manager
            .create_table(
                Table::create()
                    .table(Resources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Resources::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Resources::Name).string().not_null())
                    .col(ColumnDef::new(Resources::SourceUrl).string().not_null())
                    .col(ColumnDef::new(Resources::Kind).string().not_null())
                    .col(ColumnDef::new(Resources::Host).string())
                    .col(ColumnDef::new(Resources::Username).string())
                    .col(ColumnDef::new(Resources::Password).string())
                    .col(
                        ColumnDef::new(Resources::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Resources::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Resources::Stats).json())
                    .col(ColumnDef::new(Resources::LastSyncedAt).timestamp())
                    .col(
                        ColumnDef::new(Resources::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Resources::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Create content_chunks table. No foreign key: the staging
        // keyspace (temp_<id>) intentionally has no resources row.
        manager
            .create_table(
                Table::create()
                    .table(ContentChunks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ContentChunks::ResourceId).string().not_null())
                    .col(
                        ColumnDef::new(ContentChunks::ChunkIndex)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ContentChunks::Items).json().not_null())
                    .col(
                        ColumnDef::new(ContentChunks::WrittenAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(ContentChunks::ResourceId)
                            .col(ContentChunks::ChunkIndex),
                    )
                    .to_owned(),
            )
            .await?;

        // Create link_status table
        manager
            .create_table(
                Table::create()
                    .table(LinkStatus::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LinkStatus::Url)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LinkStatus::Status).string().not_null())
                    .col(
                        ColumnDef::new(LinkStatus::CheckedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LinkStatus::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ContentChunks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Resources::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Resources {
    Table,
    Id,
    Name,
    SourceUrl,
    Kind,
    Host,
    Username,
    Password,
    Active,
    Status,
    Stats,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ContentChunks {
    Table,
    ResourceId,
    ChunkIndex,
    Items,
    WrittenAt,
}

#[derive(DeriveIden)]
enum LinkStatus {
    Table,
    Url,
    Status,
    CheckedAt,
}
