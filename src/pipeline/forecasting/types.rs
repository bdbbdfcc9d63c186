use std::future::Future;

use serde::Serialize;

use super::ForecastError;
use crate::models::{CardCategory, HistoricalPoint};

/// Everything sent upstream for one forecast. Built fresh per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRequest {
    pub series: Vec<HistoricalPoint>,
    pub horizon_days: u32,
    pub domain_context: CardCategory,
    /// Rendered user prompt: compact series plus the output schema.
    pub prompt: String,
}

impl ForecastRequest {
    /// Last observed day; predictions must start the day after.
    pub fn last_historical_date(&self) -> Option<chrono::NaiveDate> {
        self.series.last().map(|p| p.date)
    }
}

/// Orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Aggregating,
    RequestBuilding,
    Calling,
    Validating,
    Done,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aggregating => write!(f, "aggregating"),
            Self::RequestBuilding => write!(f, "request_building"),
            Self::Calling => write!(f, "calling"),
            Self::Validating => write!(f, "validating"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Upstream text-generation service abstraction (allows mocking).
///
/// Returns the raw, untrusted text produced by the service. Timeouts are applied by
/// the caller.
pub trait ForecastClient: Send + Sync {
    fn complete(
        &self,
        system: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<String, ForecastError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_matches_serde() {
        for stage in [
            PipelineStage::Aggregating,
            PipelineStage::RequestBuilding,
            PipelineStage::Calling,
            PipelineStage::Validating,
            PipelineStage::Done,
            PipelineStage::Failed,
        ] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn last_historical_date_of_empty_series() {
        let request = ForecastRequest {
            series: vec![],
            horizon_days: 1,
            domain_context: CardCategory::All,
            prompt: String::new(),
        };
        assert!(request.last_historical_date().is_none());
    }
}
