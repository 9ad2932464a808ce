use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_inventory_tables::Migration),
            Box::new(m20240101_000002_create_period_tables::Migration),
            Box::new(m20240101_000003_create_sales_and_recipe_tables::Migration),
            Box::new(m20240101_000004_create_usage_analysis_table::Migration),
            Box::new(m20240101_000005_create_pos_raw_tables::Migration),
            Box::new(m20240101_000006_create_csv_tables::Migration),
        ]
    }
}

mod m20240101_000001_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(InventoryItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(InventoryItems::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(InventoryItems::Name).string().not_null())
                        .col(ColumnDef::new(InventoryItems::Unit).string_len(32).not_null())
                        .col(ColumnDef::new(InventoryItems::Category).string().null())
                        .col(ColumnDef::new(InventoryItems::CategoryId).uuid().null())
                        .col(ColumnDef::new(InventoryItems::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryItems::UnitCost)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CurrentStock)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::VarianceThresholdQuantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(5),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::VarianceThresholdDollar)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(50),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::HighValueFlag)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::TheoreticalYieldFactor)
                                .decimal_len(10, 4)
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(InventoryItems::SourcePosProvider).string_len(20).null())
                        .col(ColumnDef::new(InventoryItems::SourcePosItemId).string().null())
                        .col(ColumnDef::new(InventoryItems::SourcePosData).json().null())
                        .col(
                            ColumnDef::new(InventoryItems::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Reconciliation key. NULL providers (manually created items) never collide.
            manager
                .create_index(
                    Index::create()
                        .name("ux_inventory_items_source_key")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::RestaurantId)
                        .col(InventoryItems::SourcePosProvider)
                        .col(InventoryItems::SourcePosItemId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::RestaurantId).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryTransactions::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryTransactions::TransactionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::Reference).string().null())
                        .col(ColumnDef::new(InventoryTransactions::Reason).text().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::RequiresApproval)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(InventoryTransactions::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryTransactions::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_transactions_item")
                                .from(InventoryTransactions::Table, InventoryTransactions::InventoryItemId)
                                .to(InventoryItems::Table, InventoryItems::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_transactions_item_date")
                        .table(InventoryTransactions::Table)
                        .col(InventoryTransactions::InventoryItemId)
                        .col(InventoryTransactions::TransactionDate)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryTransactions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum InventoryItems {
        Table,
        Id,
        RestaurantId,
        Name,
        Unit,
        Category,
        CategoryId,
        SupplierId,
        UnitCost,
        CurrentStock,
        VarianceThresholdQuantity,
        VarianceThresholdDollar,
        HighValueFlag,
        TheoreticalYieldFactor,
        SourcePosProvider,
        SourcePosItemId,
        SourcePosData,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum InventoryTransactions {
        Table,
        Id,
        RestaurantId,
        InventoryItemId,
        TransactionType,
        Quantity,
        UnitCost,
        TransactionDate,
        Reference,
        Reason,
        RequiresApproval,
        ApprovedBy,
        ApprovedAt,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240101_000002_create_period_tables {
    use super::m20240101_000001_create_inventory_tables::InventoryItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_period_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryPeriods::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(InventoryPeriods::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(InventoryPeriods::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(InventoryPeriods::Name).string().not_null())
                        .col(ColumnDef::new(InventoryPeriods::PeriodType).string_len(20).not_null())
                        .col(ColumnDef::new(InventoryPeriods::PeriodStart).date().not_null())
                        .col(ColumnDef::new(InventoryPeriods::PeriodEnd).date().not_null())
                        .col(ColumnDef::new(InventoryPeriods::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(InventoryPeriods::BeginningSnapshotCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::EndingSnapshotCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::VarianceAnalysisCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::LockedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryPeriods::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_inventory_periods_restaurant_range")
                        .table(InventoryPeriods::Table)
                        .col(InventoryPeriods::RestaurantId)
                        .col(InventoryPeriods::PeriodStart)
                        .col(InventoryPeriods::PeriodEnd)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PeriodInventorySnapshots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PeriodInventorySnapshots::PeriodId).uuid().not_null())
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::SnapshotType)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::Verified)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(PeriodInventorySnapshots::VerifiedBy).uuid().null())
                        .col(ColumnDef::new(PeriodInventorySnapshots::CountedBy).uuid().null())
                        .col(ColumnDef::new(PeriodInventorySnapshots::Notes).text().null())
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeriodInventorySnapshots::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_snapshots_period")
                                .from(PeriodInventorySnapshots::Table, PeriodInventorySnapshots::PeriodId)
                                .to(InventoryPeriods::Table, InventoryPeriods::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_snapshots_item")
                                .from(
                                    PeriodInventorySnapshots::Table,
                                    PeriodInventorySnapshots::InventoryItemId,
                                )
                                .to(InventoryItems::Table, InventoryItems::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_snapshots_period_item_type")
                        .table(PeriodInventorySnapshots::Table)
                        .col(PeriodInventorySnapshots::PeriodId)
                        .col(PeriodInventorySnapshots::InventoryItemId)
                        .col(PeriodInventorySnapshots::SnapshotType)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PeriodInventorySnapshots::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryPeriods::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    pub enum InventoryPeriods {
        Table,
        Id,
        RestaurantId,
        Name,
        PeriodType,
        PeriodStart,
        PeriodEnd,
        Status,
        BeginningSnapshotCompleted,
        EndingSnapshotCompleted,
        VarianceAnalysisCompleted,
        ClosedAt,
        LockedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum PeriodInventorySnapshots {
        Table,
        Id,
        PeriodId,
        InventoryItemId,
        SnapshotType,
        Quantity,
        UnitCost,
        Verified,
        VerifiedBy,
        CountedBy,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_sales_and_recipe_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_sales_and_recipe_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SalesTransactions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SalesTransactions::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(SalesTransactions::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(SalesTransactions::InventoryItemId).uuid().null())
                        .col(ColumnDef::new(SalesTransactions::ItemName).string().not_null())
                        .col(
                            ColumnDef::new(SalesTransactions::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::UnitPrice)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::TotalAmount)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::TransactionDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::SourcePosProvider)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::SourcePosOrderId).string().not_null())
                        .col(
                            ColumnDef::new(SalesTransactions::SourcePosLineItemId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SalesTransactions::SourcePosData).json().null())
                        .col(
                            ColumnDef::new(SalesTransactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SalesTransactions::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_sales_transactions_source_line")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::SourcePosProvider)
                        .col(SalesTransactions::SourcePosLineItemId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_sales_transactions_item_date")
                        .table(SalesTransactions::Table)
                        .col(SalesTransactions::InventoryItemId)
                        .col(SalesTransactions::TransactionDate)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Recipes::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Recipes::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Recipes::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::Name).string().not_null())
                        .col(ColumnDef::new(Recipes::MenuItemId).uuid().not_null())
                        .col(ColumnDef::new(Recipes::RecipeData).json().null())
                        .col(ColumnDef::new(Recipes::IsActive).boolean().not_null().default(true))
                        .col(
                            ColumnDef::new(Recipes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Recipes::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RecipeIngredients::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(RecipeIngredients::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(RecipeIngredients::RecipeId).uuid().not_null())
                        .col(ColumnDef::new(RecipeIngredients::InventoryItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(RecipeIngredients::QuantityPerServing)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(RecipeIngredients::Unit).string_len(32).not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_recipe_ingredients_recipe")
                                .from(RecipeIngredients::Table, RecipeIngredients::RecipeId)
                                .to(Recipes::Table, Recipes::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_recipe_ingredients_item")
                        .table(RecipeIngredients::Table)
                        .col(RecipeIngredients::InventoryItemId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RecipeIngredients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Recipes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SalesTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum SalesTransactions {
        Table,
        Id,
        RestaurantId,
        InventoryItemId,
        ItemName,
        Quantity,
        UnitPrice,
        TotalAmount,
        TransactionDate,
        SourcePosProvider,
        SourcePosOrderId,
        SourcePosLineItemId,
        SourcePosData,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum Recipes {
        Table,
        Id,
        RestaurantId,
        Name,
        MenuItemId,
        RecipeData,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(Iden)]
    enum RecipeIngredients {
        Table,
        Id,
        RecipeId,
        InventoryItemId,
        QuantityPerServing,
        Unit,
    }
}

mod m20240101_000004_create_usage_analysis_table {
    use super::m20240101_000002_create_period_tables::InventoryPeriods;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_usage_analysis_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TheoreticalUsageAnalysis::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TheoreticalUsageAnalysis::PeriodId).uuid().not_null())
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::InventoryItemId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::RestaurantId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::TheoreticalQuantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::ActualQuantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::UnitCost)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::VarianceQuantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::VariancePercentage)
                                .decimal_len(10, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::VarianceDollarValue)
                                .decimal_len(19, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::Priority)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::CalculationMethod)
                                .string_len(30)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::Confidence)
                                .decimal_len(5, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::InvestigationStatus)
                                .string_len(20)
                                .not_null()
                                .default("pending"),
                        )
                        .col(ColumnDef::new(TheoreticalUsageAnalysis::AssignedTo).uuid().null())
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::AssignedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(TheoreticalUsageAnalysis::InvestigatedBy).uuid().null())
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::InvestigationNotes)
                                .text()
                                .null(),
                        )
                        .col(ColumnDef::new(TheoreticalUsageAnalysis::Explanation).text().null())
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::ResolvedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(TheoreticalUsageAnalysis::RecipeData).json().null())
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::CalculatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TheoreticalUsageAnalysis::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_usage_analysis_period")
                                .from(TheoreticalUsageAnalysis::Table, TheoreticalUsageAnalysis::PeriodId)
                                .to(InventoryPeriods::Table, InventoryPeriods::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // One analysis per item per period; concurrent recalculations serialize here.
            manager
                .create_index(
                    Index::create()
                        .name("ux_usage_analysis_period_item")
                        .table(TheoreticalUsageAnalysis::Table)
                        .col(TheoreticalUsageAnalysis::PeriodId)
                        .col(TheoreticalUsageAnalysis::InventoryItemId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TheoreticalUsageAnalysis::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum TheoreticalUsageAnalysis {
        Table,
        Id,
        PeriodId,
        InventoryItemId,
        RestaurantId,
        TheoreticalQuantity,
        ActualQuantity,
        UnitCost,
        VarianceQuantity,
        VariancePercentage,
        VarianceDollarValue,
        Priority,
        CalculationMethod,
        Confidence,
        InvestigationStatus,
        AssignedTo,
        AssignedAt,
        InvestigatedBy,
        InvestigationNotes,
        Explanation,
        ResolvedAt,
        RecipeData,
        CalculatedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_pos_raw_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_pos_raw_tables"
        }
    }

    fn raw_table_base(table: impl IntoIden + 'static) -> TableCreateStatement {
        Table::create()
            .table(table)
            .if_not_exists()
            .col(ColumnDef::new(RawCommon::Id).uuid().primary_key().not_null())
            .col(ColumnDef::new(RawCommon::RestaurantId).uuid().not_null())
            .col(ColumnDef::new(RawCommon::RawData).json().not_null())
            .col(
                ColumnDef::new(RawCommon::SyncedAt)
                    .timestamp_with_time_zone()
                    .not_null(),
            )
            .to_owned()
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    raw_table_base(SquareMenuItems::Table)
                        .col(ColumnDef::new(SquareMenuItems::SquareItemId).string().not_null())
                        .col(ColumnDef::new(SquareMenuItems::SquareVariationId).string().not_null())
                        .col(ColumnDef::new(SquareMenuItems::Name).string().not_null())
                        .col(ColumnDef::new(SquareMenuItems::VariationName).string().null())
                        .col(ColumnDef::new(SquareMenuItems::CategoryName).string().null())
                        .col(ColumnDef::new(SquareMenuItems::PriceMoneyAmount).big_integer().null())
                        .col(ColumnDef::new(SquareMenuItems::PriceMoneyCurrency).string_len(3).null())
                        .col(
                            ColumnDef::new(SquareMenuItems::IsDeleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("ux_square_menu_items_variation")
                        .table(SquareMenuItems::Table)
                        .col(RawCommon::RestaurantId)
                        .col(SquareMenuItems::SquareVariationId)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    raw_table_base(SquareOrderItems::Table)
                        .col(ColumnDef::new(SquareOrderItems::SquareOrderId).string().not_null())
                        .col(ColumnDef::new(SquareOrderItems::SquareLineItemUid).string().not_null())
                        .col(ColumnDef::new(SquareOrderItems::CatalogObjectId).string().null())
                        .col(ColumnDef::new(SquareOrderItems::Name).string().not_null())
                        .col(ColumnDef::new(SquareOrderItems::Quantity).string_len(32).not_null())
                        .col(
                            ColumnDef::new(SquareOrderItems::BasePriceMoneyAmount)
                                .big_integer()
                                .null(),
                        )
                        .col(ColumnDef::new(SquareOrderItems::TotalMoneyAmount).big_integer().null())
                        .col(ColumnDef::new(SquareOrderItems::OrderState).string_len(20).not_null())
                        .col(
                            ColumnDef::new(SquareOrderItems::OrderCreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("ux_square_order_items_line")
                        .table(SquareOrderItems::Table)
                        .col(SquareOrderItems::SquareOrderId)
                        .col(SquareOrderItems::SquareLineItemUid)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    raw_table_base(SquareInventoryCounts::Table)
                        .col(
                            ColumnDef::new(SquareInventoryCounts::CatalogObjectId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SquareInventoryCounts::LocationId).string().not_null())
                        .col(ColumnDef::new(SquareInventoryCounts::State).string_len(32).not_null())
                        .col(ColumnDef::new(SquareInventoryCounts::Quantity).string_len(32).not_null())
                        .col(
                            ColumnDef::new(SquareInventoryCounts::CalculatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    raw_table_base(ToastMenuItems::Table)
                        .col(ColumnDef::new(ToastMenuItems::ToastItemGuid).string().not_null())
                        .col(ColumnDef::new(ToastMenuItems::Name).string().not_null())
                        .col(ColumnDef::new(ToastMenuItems::MenuGroupName).string().null())
                        .col(ColumnDef::new(ToastMenuItems::PriceCents).big_integer().null())
                        .col(
                            ColumnDef::new(ToastMenuItems::Visible)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("ux_toast_menu_items_guid")
                        .table(ToastMenuItems::Table)
                        .col(RawCommon::RestaurantId)
                        .col(ToastMenuItems::ToastItemGuid)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    raw_table_base(ToastOrderItems::Table)
                        .col(ColumnDef::new(ToastOrderItems::ToastOrderGuid).string().not_null())
                        .col(ColumnDef::new(ToastOrderItems::ToastSelectionGuid).string().not_null())
                        .col(ColumnDef::new(ToastOrderItems::ItemGuid).string().null())
                        .col(ColumnDef::new(ToastOrderItems::DisplayName).string().not_null())
                        .col(
                            ColumnDef::new(ToastOrderItems::Quantity)
                                .decimal_len(19, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ToastOrderItems::PriceCents).big_integer().null())
                        .col(
                            ColumnDef::new(ToastOrderItems::Voided)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ToastOrderItems::BusinessDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("ux_toast_order_items_selection")
                        .table(ToastOrderItems::Table)
                        .col(ToastOrderItems::ToastSelectionGuid)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            for table in [
                SquareMenuItems::Table.into_iden(),
                SquareOrderItems::Table.into_iden(),
                SquareInventoryCounts::Table.into_iden(),
                ToastMenuItems::Table.into_iden(),
                ToastOrderItems::Table.into_iden(),
            ] {
                manager
                    .drop_table(Table::drop().table(table).to_owned())
                    .await?;
            }
            Ok(())
        }
    }

    #[derive(Iden)]
    enum RawCommon {
        Id,
        RestaurantId,
        RawData,
        SyncedAt,
    }

    #[derive(Iden)]
    enum SquareMenuItems {
        Table,
        SquareItemId,
        SquareVariationId,
        Name,
        VariationName,
        CategoryName,
        PriceMoneyAmount,
        PriceMoneyCurrency,
        IsDeleted,
    }

    #[derive(Iden)]
    enum SquareOrderItems {
        Table,
        SquareOrderId,
        SquareLineItemUid,
        CatalogObjectId,
        Name,
        Quantity,
        BasePriceMoneyAmount,
        TotalMoneyAmount,
        OrderState,
        OrderCreatedAt,
    }

    #[derive(Iden)]
    enum SquareInventoryCounts {
        Table,
        CatalogObjectId,
        LocationId,
        State,
        Quantity,
        CalculatedAt,
    }

    #[derive(Iden)]
    enum ToastMenuItems {
        Table,
        ToastItemGuid,
        Name,
        MenuGroupName,
        PriceCents,
        Visible,
    }

    #[derive(Iden)]
    enum ToastOrderItems {
        Table,
        ToastOrderGuid,
        ToastSelectionGuid,
        ItemGuid,
        DisplayName,
        Quantity,
        PriceCents,
        Voided,
        BusinessDate,
    }
}

mod m20240101_000006_create_csv_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_csv_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CsvUploads::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CsvUploads::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CsvUploads::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(CsvUploads::Filename).string().not_null())
                        .col(ColumnDef::new(CsvUploads::UploadType).string_len(20).not_null())
                        .col(ColumnDef::new(CsvUploads::Status).string_len(20).not_null())
                        .col(ColumnDef::new(CsvUploads::RowsTotal).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvUploads::RowsValid).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvUploads::RowsInvalid).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvUploads::BatchCount).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvUploads::ValidationErrors).json().null())
                        .col(
                            ColumnDef::new(CsvUploads::ValidatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(CsvUploads::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CsvUploadBatches::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CsvUploadBatches::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CsvUploadBatches::UploadId).uuid().not_null())
                        .col(ColumnDef::new(CsvUploadBatches::BatchNumber).integer().not_null())
                        .col(ColumnDef::new(CsvUploadBatches::RowCount).integer().not_null())
                        .col(ColumnDef::new(CsvUploadBatches::Rows).json().not_null())
                        .col(ColumnDef::new(CsvUploadBatches::Errors).json().not_null())
                        .col(
                            ColumnDef::new(CsvUploadBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_csv_upload_batches_upload")
                                .from(CsvUploadBatches::Table, CsvUploadBatches::UploadId)
                                .to(CsvUploads::Table, CsvUploads::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("ux_csv_upload_batches_number")
                        .table(CsvUploadBatches::Table)
                        .col(CsvUploadBatches::UploadId)
                        .col(CsvUploadBatches::BatchNumber)
                        .unique()
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CsvTransforms::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CsvTransforms::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CsvTransforms::UploadId).uuid().not_null())
                        .col(ColumnDef::new(CsvTransforms::RestaurantId).uuid().not_null())
                        .col(ColumnDef::new(CsvTransforms::TransformType).string_len(20).not_null())
                        .col(ColumnDef::new(CsvTransforms::Status).string_len(20).not_null())
                        .col(ColumnDef::new(CsvTransforms::DryRun).boolean().not_null().default(false))
                        .col(ColumnDef::new(CsvTransforms::ProcessedCount).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvTransforms::CreatedCount).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvTransforms::UpdatedCount).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvTransforms::SkippedCount).integer().not_null().default(0))
                        .col(ColumnDef::new(CsvTransforms::ErrorCount).integer().not_null().default(0))
                        .col(
                            ColumnDef::new(CsvTransforms::ErrorRate)
                                .decimal_len(7, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CsvTransforms::Summary).json().null())
                        .col(ColumnDef::new(CsvTransforms::Errors).json().null())
                        .col(
                            ColumnDef::new(CsvTransforms::StartedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CsvTransforms::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_csv_transforms_upload")
                                .from(CsvTransforms::Table, CsvTransforms::UploadId)
                                .to(CsvUploads::Table, CsvUploads::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CsvTransforms::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CsvUploadBatches::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CsvUploads::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum CsvUploads {
        Table,
        Id,
        RestaurantId,
        Filename,
        UploadType,
        Status,
        RowsTotal,
        RowsValid,
        RowsInvalid,
        BatchCount,
        ValidationErrors,
        ValidatedAt,
        CreatedAt,
    }

    #[derive(Iden)]
    enum CsvUploadBatches {
        Table,
        Id,
        UploadId,
        BatchNumber,
        RowCount,
        Rows,
        Errors,
        CreatedAt,
    }

    #[derive(Iden)]
    enum CsvTransforms {
        Table,
        Id,
        UploadId,
        RestaurantId,
        TransformType,
        Status,
        DryRun,
        ProcessedCount,
        CreatedCount,
        UpdatedCount,
        SkippedCount,
        ErrorCount,
        ErrorRate,
        Summary,
        Errors,
        StartedAt,
        CompletedAt,
    }
}
