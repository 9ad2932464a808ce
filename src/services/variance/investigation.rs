//! Investigation lifecycle over computed analyses.
//!
//! ```text
//! pending ──► investigating ──► resolved | accepted | escalated
//!    └───────────────────────────►┘
//! ```
//! Terminal states accept no further transition.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::theoretical_usage_analysis::{InvestigationStatus, Model as AnalysisModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{AnalysisRepository, AnalysisTransition};

/// Outcomes a reviewer may close an investigation with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Resolution {
    Resolved,
    Accepted,
    Escalated,
}

impl From<Resolution> for InvestigationStatus {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Resolved => InvestigationStatus::Resolved,
            Resolution::Accepted => InvestigationStatus::Accepted,
            Resolution::Escalated => InvestigationStatus::Escalated,
        }
    }
}

impl Resolution {
    pub fn parse(value: &str) -> Result<Self, ServiceError> {
        Resolution::from_str(value).map_err(|_| {
            ServiceError::ValidationError(format!(
                "resolution must be resolved, accepted or escalated, got '{}'",
                value
            ))
        })
    }
}

/// The transition table.
pub fn can_transition(from: InvestigationStatus, to: InvestigationStatus) -> bool {
    use InvestigationStatus::*;
    matches!(
        (from, to),
        (Pending, Investigating)
            | (Pending | Investigating, Resolved)
            | (Pending | Investigating, Accepted)
            | (Pending | Investigating, Escalated)
    )
}

fn ensure_transition(from: InvestigationStatus, to: InvestigationStatus) -> Result<(), ServiceError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InvestigateRequest {
    pub assigned_to: Uuid,
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ResolveRequest {
    pub resolved_by: Uuid,
    #[validate(length(min = 1, max = 4000))]
    pub explanation: String,
    pub resolution: Resolution,
}

pub struct InvestigationService {
    analyses: Arc<dyn AnalysisRepository>,
    event_sender: Option<EventSender>,
}

impl InvestigationService {
    pub fn new(analyses: Arc<dyn AnalysisRepository>, event_sender: Option<EventSender>) -> Self {
        Self {
            analyses,
            event_sender,
        }
    }

    async fn load(&self, analysis_id: Uuid) -> Result<AnalysisModel, ServiceError> {
        self.analyses
            .find_by_id(analysis_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Analysis {} not found", analysis_id)))
    }

    /// Applies `change` if the row is still in `from`. A lost race is reported against the
    /// state that won it.
    async fn apply(
        &self,
        current: &AnalysisModel,
        change: AnalysisTransition,
    ) -> Result<AnalysisModel, ServiceError> {
        let to = change.to;
        let moved = self
            .analyses
            .transition(current.id, current.investigation_status, change)
            .await?;

        let fresh = self.load(current.id).await?;
        if moved == 0 {
            warn!(
                analysis_id = %current.id,
                expected = %current.investigation_status,
                found = %fresh.investigation_status,
                "investigation transition lost a race"
            );
            return Err(if fresh.investigation_status != current.investigation_status {
                ServiceError::InvalidTransition {
                    from: fresh.investigation_status.to_string(),
                    to: to.to_string(),
                }
            } else {
                ServiceError::ConcurrentModification(current.id)
            });
        }
        Ok(fresh)
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!("Failed to publish investigation event: {}", e);
            }
        }
    }

    /// `pending → investigating`; records the assignee.
    #[instrument(skip(self, request), fields(assigned_to = %request.assigned_to))]
    pub async fn investigate_variance(
        &self,
        analysis_id: Uuid,
        request: InvestigateRequest,
    ) -> Result<AnalysisModel, ServiceError> {
        request.validate()?;
        let current = self.load(analysis_id).await?;
        ensure_transition(current.investigation_status, InvestigationStatus::Investigating)?;

        let updated = self
            .apply(
                &current,
                AnalysisTransition {
                    to: InvestigationStatus::Investigating,
                    assigned_to: Some(request.assigned_to),
                    investigated_by: None,
                    notes: request.notes,
                    explanation: None,
                    at: Utc::now(),
                },
            )
            .await?;

        info!(analysis_id = %analysis_id, "Variance investigation started");
        self.publish(Event::InvestigationStarted {
            analysis_id,
            assigned_to: request.assigned_to,
        })
        .await;
        Ok(updated)
    }

    /// Any non-terminal state to the chosen resolution.
    #[instrument(skip(self, request), fields(resolution = %request.resolution))]
    pub async fn resolve_variance_investigation(
        &self,
        analysis_id: Uuid,
        request: ResolveRequest,
    ) -> Result<AnalysisModel, ServiceError> {
        request.validate()?;
        let to = InvestigationStatus::from(request.resolution);
        let current = self.load(analysis_id).await?;
        ensure_transition(current.investigation_status, to)?;

        let updated = self
            .apply(
                &current,
                AnalysisTransition {
                    to,
                    assigned_to: None,
                    investigated_by: Some(request.resolved_by),
                    notes: None,
                    explanation: Some(request.explanation),
                    at: Utc::now(),
                },
            )
            .await?;

        info!(analysis_id = %analysis_id, status = %to, "Variance investigation resolved");
        self.publish(Event::InvestigationResolved {
            analysis_id,
            resolution: to.to_string(),
            resolved_by: request.resolved_by,
        })
        .await;
        Ok(updated)
    }
}
