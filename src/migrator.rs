use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20240301_000001_create_documents_table::Migration)]
    }
}

#[allow(elided_lifetimes_in_paths)] // matches sea-orm-migration's MigrationTrait signature
mod m20240301_000001_create_documents_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_documents_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::document Model
            manager
                .create_table(
                    Table::create()
                        .table(Documents::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Documents::Collection).string().not_null())
                        .col(ColumnDef::new(Documents::Id).string().not_null())
                        .col(ColumnDef::new(Documents::Body).json().not_null())
                        .col(
                            ColumnDef::new(Documents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Documents::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(Documents::Collection)
                                .col(Documents::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_documents_collection_created_at")
                        .table(Documents::Table)
                        .col(Documents::Collection)
                        .col(Documents::CreatedAt)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Documents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Documents {
        Table,
        Collection,
        Id,
        Body,
        CreatedAt,
        UpdatedAt,
    }
}
