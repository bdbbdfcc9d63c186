use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::Trend;

/// One day of aggregated history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub count: u32,
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, or 0 when `start > end`.
    pub fn num_days(&self) -> usize {
        let days = (self.end - self.start).num_days() + 1;
        usize::try_from(days).unwrap_or(0)
    }
}

/// One forecast day returned by the upstream service, after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub date: NaiveDate,
    pub predicted_count: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
}

/// Fit quality reported by the upstream model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mse: f64,
}

/// Fully validated forecast, ready for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub predictions: Vec<PredictionPoint>,
    pub model_version: String,
    pub trend: Trend,
    pub seasonality_detected: bool,
    pub accuracy: AccuracyMetrics,
}

impl ForecastResult {
    /// Sum of predicted counts over the horizon.
    pub fn total_predicted(&self) -> f64 {
        self.predictions.iter().map(|p| p.predicted_count).sum()
    }

    /// Day with the highest predicted count (first one on ties).
    pub fn peak(&self) -> Option<&PredictionPoint> {
        self.predictions.iter().fold(None, |best, p| match best {
            Some(b) if b.predicted_count >= p.predicted_count => Some(b),
            _ => Some(p),
        })
    }
}
