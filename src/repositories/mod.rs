//! Persistence seams. Every aggregate is reached through an `async_trait` repository so
//! services receive their storage explicitly and tests can swap in mocks.

use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod analysis_repository;
pub mod csv_repository;
pub mod item_repository;
pub mod ledger_repository;
pub mod period_repository;
pub mod pos_raw_repository;
pub mod recipe_repository;
pub mod sales_repository;

pub use analysis_repository::{AnalysisRepository, AnalysisTransition, SeaOrmAnalysisRepository};
pub use csv_repository::{CsvRepository, SeaOrmCsvRepository};
pub use item_repository::{ItemRepository, SeaOrmItemRepository};
pub use ledger_repository::{LedgerRepository, SeaOrmLedgerRepository};
pub use period_repository::{PeriodRepository, SeaOrmPeriodRepository};
pub use pos_raw_repository::{PosRawRepository, SeaOrmPosRawRepository};
pub use recipe_repository::{RecipeRepository, SeaOrmRecipeRepository};
pub use sales_repository::{SalesRepository, SeaOrmSalesRepository};

/// Repository trait for common database operations
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

#[derive(Debug, Clone)]
pub struct BaseRepository {
    db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl Repository for BaseRepository {
    fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// All repositories, constructed once per process and handed to the services.
#[derive(Clone)]
pub struct Repositories {
    pub periods: Arc<dyn PeriodRepository>,
    pub items: Arc<dyn ItemRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub recipes: Arc<dyn RecipeRepository>,
    pub sales: Arc<dyn SalesRepository>,
    pub analyses: Arc<dyn AnalysisRepository>,
    pub csv: Arc<dyn CsvRepository>,
    pub pos_raw: Arc<dyn PosRawRepository>,
}

impl Repositories {
    pub fn sea_orm(db: Arc<DatabaseConnection>) -> Self {
        Self {
            periods: Arc::new(SeaOrmPeriodRepository::new(db.clone())),
            items: Arc::new(SeaOrmItemRepository::new(db.clone())),
            ledger: Arc::new(SeaOrmLedgerRepository::new(db.clone())),
            recipes: Arc::new(SeaOrmRecipeRepository::new(db.clone())),
            sales: Arc::new(SeaOrmSalesRepository::new(db.clone())),
            analyses: Arc::new(SeaOrmAnalysisRepository::new(db.clone())),
            csv: Arc::new(SeaOrmCsvRepository::new(db.clone())),
            pos_raw: Arc::new(SeaOrmPosRawRepository::new(db)),
        }
    }
}
