use std::sync::Arc;

use crate::{
    config::AppConfig,
    events::EventSender,
    repositories::Repositories,
    services::{
        csv::{CsvTransformService, CsvUploadService},
        ledger::LedgerService,
        periods::PeriodService,
        pos::{PosTransformService, TransformerRegistry},
        variance::{
            InvestigationService, UsageCalculationEngine, VarianceReportingService,
            VarianceThresholds,
        },
    },
};

/// Factory for creating service instances with shared dependencies
pub struct ServiceFactory {
    repos: Repositories,
    thresholds: VarianceThresholds,
    csv_batch_size: usize,
    event_sender: Option<EventSender>,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(
        repos: Repositories,
        thresholds: VarianceThresholds,
        csv_batch_size: usize,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            repos,
            thresholds,
            csv_batch_size,
            event_sender,
        }
    }

    pub fn from_config(
        repos: Repositories,
        config: &AppConfig,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self::new(
            repos,
            config.variance.thresholds(),
            config.csv.batch_size,
            event_sender,
        )
    }

    pub fn period_service(&self) -> PeriodService {
        PeriodService::new(
            self.repos.periods.clone(),
            self.repos.items.clone(),
            self.event_sender.clone(),
        )
    }

    pub fn ledger_service(&self) -> LedgerService {
        LedgerService::new(
            self.repos.ledger.clone(),
            self.repos.items.clone(),
            self.event_sender.clone(),
        )
    }

    pub fn usage_engine(&self) -> UsageCalculationEngine {
        UsageCalculationEngine::new(
            self.repos.clone(),
            self.thresholds.clone(),
            self.event_sender.clone(),
        )
    }

    pub fn investigation_service(&self) -> InvestigationService {
        InvestigationService::new(self.repos.analyses.clone(), self.event_sender.clone())
    }

    pub fn reporting_service(&self) -> VarianceReportingService {
        VarianceReportingService::new(
            self.repos.periods.clone(),
            self.repos.analyses.clone(),
            self.thresholds.clone(),
        )
    }

    pub fn pos_transform_service(&self) -> PosTransformService {
        PosTransformService::new(
            self.repos.items.clone(),
            self.repos.sales.clone(),
            self.repos.pos_raw.clone(),
            TransformerRegistry::default(),
            self.event_sender.clone(),
        )
    }

    pub fn csv_upload_service(&self) -> CsvUploadService {
        CsvUploadService::new(
            self.repos.csv.clone(),
            self.csv_batch_size,
            self.event_sender.clone(),
        )
    }

    pub fn csv_transform_service(&self) -> CsvTransformService {
        CsvTransformService::new(
            self.repos.csv.clone(),
            self.repos.items.clone(),
            self.repos.sales.clone(),
            self.event_sender.clone(),
        )
    }

    /// Gets a reference to the repositories
    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    /// Gets a reference to the event sender
    pub fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub periods: Arc<PeriodService>,
    pub ledger: Arc<LedgerService>,
    pub usage: Arc<UsageCalculationEngine>,
    pub investigations: Arc<InvestigationService>,
    pub reporting: Arc<VarianceReportingService>,
    pub pos: Arc<PosTransformService>,
    pub csv_upload: Arc<CsvUploadService>,
    pub csv_transform: Arc<CsvTransformService>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        Self {
            periods: Arc::new(factory.period_service()),
            ledger: Arc::new(factory.ledger_service()),
            usage: Arc::new(factory.usage_engine()),
            investigations: Arc::new(factory.investigation_service()),
            reporting: Arc::new(factory.reporting_service()),
            pos: Arc::new(factory.pos_transform_service()),
            csv_upload: Arc::new(factory.csv_upload_service()),
            csv_transform: Arc::new(factory.csv_transform_service()),
        }
    }
}
