use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::forecasting::ForecastError;

/// A completed appointment as handed over by the persistence layer.
///
/// Callers filter to completed status before handing records over; nothing here
/// re-checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub completed_at: DateTime<Utc>,
    pub service_category: String,
}

impl AppointmentRecord {
    pub fn new(completed_at: DateTime<Utc>, service_category: &str) -> Self {
        Self {
            completed_at,
            service_category: service_category.to_string(),
        }
    }
}

/// Load a JSON array of appointment records from disk.
pub fn load_records(path: &Path) -> Result<Vec<AppointmentRecord>, ForecastError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        ForecastError::RecordParsing(format!("{}: {e}", path.display()))
    })
}
