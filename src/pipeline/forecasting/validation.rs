// Strict validation of upstream forecast responses.
// The upstream service is a text generator: everything it returns is untrusted.
// Nothing is defaulted, clamped, swapped or otherwise repaired. The first failing
// check decides the error kind.

use chrono::{Duration, NaiveDate};
use serde_json::{Map, Value};

use super::parser::{json_kind, parse_response_object};
use super::types::ForecastRequest;
use super::{BoundsIssue, FieldIssue, FieldProblem, ForecastError};
use crate::config::MIN_HISTORY_DAYS;
use crate::models::{AccuracyMetrics, ForecastResult, PredictionPoint, Trend};

/// Relative tolerance before `rmse` and `sqrt(mse)` are reported as inconsistent.
const RMSE_MSE_TOLERANCE: f64 = 0.05;

/// Keys under `accuracy`.
const METRIC_NAMES: [&str; 4] = ["r_squared", "rmse", "mae", "mse"];

/// Parse and validate a raw upstream response against the request that produced it.
///
/// Checks run in order: parse, schema, length, date sequence, per-point bounds,
/// accuracy metrics. Pure: the same input always yields the same output.
pub fn validate_forecast_response(
    raw: &str,
    request: &ForecastRequest,
) -> Result<ForecastResult, ForecastError> {
    let object = parse_response_object(raw)
        .map_err(|e| find_non_finite_metric(raw).unwrap_or(e))?;
    let result = read_forecast(&object)?;

    check_length(&result.predictions, request)?;
    check_date_sequence(&result.predictions, request)?;
    check_bounds(&result.predictions)?;
    check_metrics(&result.accuracy)?;
    warn_on_metric_inconsistency(&result.accuracy);

    Ok(result)
}

// ═══════════════════════════════════════════════════════════
// Schema
// ═══════════════════════════════════════════════════════════

/// Collects every missing or mistyped field instead of stopping at the first one.
#[derive(Default)]
struct SchemaReader {
    issues: Vec<FieldIssue>,
}

impl SchemaReader {
    fn missing(&mut self, path: String) {
        self.issues.push(FieldIssue {
            path,
            problem: FieldProblem::Missing,
        });
    }

    fn mistyped(&mut self, path: String, expected: &'static str) {
        self.issues.push(FieldIssue {
            path,
            problem: FieldProblem::Mistyped { expected },
        });
    }

    /// A present, non-null value. `null` counts as missing.
    fn present<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        prefix: &str,
    ) -> Option<(&'a Value, String)> {
        let path = join_path(prefix, key);
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.missing(path);
                None
            }
            Some(value) => Some((value, path)),
        }
    }

    fn number(&mut self, obj: &Map<String, Value>, key: &str, prefix: &str) -> Option<f64> {
        let (value, path) = self.present(obj, key, prefix)?;
        match value {
            Value::Number(n) => n.as_f64().or_else(|| {
                self.mistyped(path, "number");
                None
            }),
            _ => {
                self.mistyped(path, "number");
                None
            }
        }
    }

    fn non_empty_string(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        prefix: &str,
    ) -> Option<String> {
        let (value, path) = self.present(obj, key, prefix)?;
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => Some(s.to_string()),
            _ => {
                self.mistyped(path, "non-empty string");
                None
            }
        }
    }

    fn boolean(&mut self, obj: &Map<String, Value>, key: &str, prefix: &str) -> Option<bool> {
        let (value, path) = self.present(obj, key, prefix)?;
        value.as_bool().or_else(|| {
            self.mistyped(path, "boolean");
            None
        })
    }

    fn date(&mut self, obj: &Map<String, Value>, key: &str, prefix: &str) -> Option<NaiveDate> {
        let (value, path) = self.present(obj, key, prefix)?;
        value
            .as_str()
            .and_then(parse_strict_date)
            .or_else(|| {
                self.mistyped(path, "YYYY-MM-DD date string");
                None
            })
    }

    fn trend(&mut self, obj: &Map<String, Value>, key: &str, prefix: &str) -> Option<Trend> {
        let (value, path) = self.present(obj, key, prefix)?;
        value
            .as_str()
            .and_then(|s| s.parse::<Trend>().ok())
            .or_else(|| {
                self.mistyped(path, "one of increasing, decreasing, stable");
                None
            })
    }

    fn object<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        prefix: &str,
    ) -> Option<&'a Map<String, Value>> {
        let (value, path) = self.present(obj, key, prefix)?;
        value.as_object().or_else(|| {
            self.mistyped(path, "object");
            None
        })
    }

    fn array<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        prefix: &str,
    ) -> Option<&'a Vec<Value>> {
        let (value, path) = self.present(obj, key, prefix)?;
        value.as_array().or_else(|| {
            self.mistyped(path, "array");
            None
        })
    }

    fn prediction(&mut self, item: &Value, index: usize) -> Option<PredictionPoint> {
        let prefix = format!("predictions[{index}]");
        let Some(obj) = item.as_object() else {
            tracing::debug!(index, found = json_kind(item), "Prediction is not an object");
            self.mistyped(prefix, "object");
            return None;
        };

        let date = self.date(obj, "date", &prefix);
        let predicted_count = self.number(obj, "predicted_count", &prefix);
        let lower_bound = self.number(obj, "lower_bound", &prefix);
        let upper_bound = self.number(obj, "upper_bound", &prefix);
        let confidence_level = self.number(obj, "confidence_level", &prefix);

        Some(PredictionPoint {
            date: date?,
            predicted_count: predicted_count?,
            lower_bound: lower_bound?,
            upper_bound: upper_bound?,
            confidence_level: confidence_level?,
        })
    }

    fn accuracy(&mut self, root: &Map<String, Value>) -> Option<AccuracyMetrics> {
        let obj = self.object(root, "accuracy", "")?;
        let r_squared = self.number(obj, "r_squared", "accuracy");
        let rmse = self.number(obj, "rmse", "accuracy");
        let mae = self.number(obj, "mae", "accuracy");
        let mse = self.number(obj, "mse", "accuracy");

        Some(AccuracyMetrics {
            r_squared: r_squared?,
            rmse: rmse?,
            mae: mae?,
            mse: mse?,
        })
    }
}

/// Exactly `YYYY-MM-DD`: no padding, no single-digit month or day.
fn parse_strict_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Read every required field into a typed result, or report all schema problems.
fn read_forecast(root: &Map<String, Value>) -> Result<ForecastResult, ForecastError> {
    let mut reader = SchemaReader::default();

    let predictions: Option<Vec<PredictionPoint>> = reader
        .array(root, "predictions", "")
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| reader.prediction(item, i))
                .collect()
        });
    let model_version = reader.non_empty_string(root, "model_version", "");
    let trend = reader.trend(root, "trend", "");
    let seasonality_detected = reader.boolean(root, "seasonality_detected", "");
    let accuracy = reader.accuracy(root);

    if !reader.issues.is_empty() {
        return Err(ForecastError::SchemaValidation {
            fields: reader.issues,
        });
    }

    let (
        Some(predictions),
        Some(model_version),
        Some(trend),
        Some(seasonality_detected),
        Some(accuracy),
    ) = (predictions, model_version, trend, seasonality_detected, accuracy)
    else {
        return Err(ForecastError::SchemaValidation {
            fields: reader.issues,
        });
    };

    Ok(ForecastResult {
        predictions,
        model_version,
        trend,
        seasonality_detected,
        accuracy,
    })
}

// ═══════════════════════════════════════════════════════════
// Semantic checks
// ═══════════════════════════════════════════════════════════

fn check_length(
    predictions: &[PredictionPoint],
    request: &ForecastRequest,
) -> Result<(), ForecastError> {
    let expected = request.horizon_days as usize;
    if predictions.len() != expected {
        return Err(ForecastError::LengthMismatch {
            expected,
            actual: predictions.len(),
        });
    }
    Ok(())
}

fn check_date_sequence(
    predictions: &[PredictionPoint],
    request: &ForecastRequest,
) -> Result<(), ForecastError> {
    let Some(last) = request.last_historical_date() else {
        return Err(ForecastError::InsufficientData {
            available: 0,
            required: MIN_HISTORY_DAYS,
        });
    };

    for (index, point) in predictions.iter().enumerate() {
        let expected = last + Duration::days(index as i64 + 1);
        if point.date != expected {
            return Err(ForecastError::DateSequence {
                index,
                expected,
                found: point.date,
            });
        }
    }
    Ok(())
}

/// Every point is checked so the error names all offenders at once.
fn check_bounds(predictions: &[PredictionPoint]) -> Result<(), ForecastError> {
    let mut issues = Vec::new();

    for (index, p) in predictions.iter().enumerate() {
        let mut flag = |reason: String| {
            issues.push(BoundsIssue {
                index,
                date: p.date,
                reason,
            })
        };

        let values = [p.predicted_count, p.lower_bound, p.upper_bound, p.confidence_level];
        if values.iter().any(|v| !v.is_finite()) {
            flag("non-finite value".into());
            continue;
        }
        if p.predicted_count < 0.0 {
            flag(format!("predicted_count {} is negative", p.predicted_count));
        }
        if p.lower_bound > p.predicted_count {
            flag(format!(
                "lower_bound {} > predicted_count {}",
                p.lower_bound, p.predicted_count
            ));
        }
        if p.predicted_count > p.upper_bound {
            flag(format!(
                "predicted_count {} > upper_bound {}",
                p.predicted_count, p.upper_bound
            ));
        }
        if !(0.0..=1.0).contains(&p.confidence_level) {
            flag(format!(
                "confidence_level {} outside [0, 1]",
                p.confidence_level
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ForecastError::BoundsViolation { points: issues })
    }
}

fn check_metrics(accuracy: &AccuracyMetrics) -> Result<(), ForecastError> {
    let metrics = [
        ("r_squared", accuracy.r_squared),
        ("rmse", accuracy.rmse),
        ("mae", accuracy.mae),
        ("mse", accuracy.mse),
    ];

    for (metric, value) in metrics {
        if !value.is_finite() {
            return Err(ForecastError::MetricValidation {
                metric,
                reason: format!("{value} is not a finite number"),
            });
        }
    }

    if accuracy.r_squared > 1.0 {
        return Err(ForecastError::MetricValidation {
            metric: "r_squared",
            reason: format!("{} exceeds 1", accuracy.r_squared),
        });
    }

    for &(metric, value) in &metrics[1..] {
        if value < 0.0 {
            return Err(ForecastError::MetricValidation {
                metric,
                reason: format!("{value} is negative"),
            });
        }
    }

    Ok(())
}

/// `NaN`, `Infinity` and out-of-range numbers such as `1e999` are not JSON, so a metric
/// written that way fails parsing. Find it in the raw text so the error names the metric.
fn find_non_finite_metric(raw: &str) -> Option<ForecastError> {
    for metric in METRIC_NAMES {
        let key = format!("\"{metric}\"");
        let mut rest = raw;
        while let Some(pos) = rest.find(&key) {
            rest = &rest[pos + key.len()..];
            let Some(value) = rest.trim_start().strip_prefix(':') else {
                continue;
            };
            let value = value.trim_start();
            let end = value
                .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')))
                .unwrap_or(value.len());
            let token = &value[..end];
            if token.parse::<f64>().is_ok_and(|v| !v.is_finite()) {
                return Some(ForecastError::MetricValidation {
                    metric,
                    reason: format!("{token} is not a finite number"),
                });
            }
        }
    }
    None
}

/// Internally inconsistent metrics are suspicious but not fatal.
fn warn_on_metric_inconsistency(accuracy: &AccuracyMetrics) {
    let implied_rmse = accuracy.mse.sqrt();
    let scale = accuracy.rmse.max(1.0);
    if (accuracy.rmse - implied_rmse).abs() > RMSE_MSE_TOLERANCE * scale {
        tracing::warn!(
            rmse = accuracy.rmse,
            mse = accuracy.mse,
            implied_rmse,
            "Forecast accuracy: rmse does not match sqrt(mse)"
        );
    }
    if accuracy.mae > accuracy.rmse + RMSE_MSE_TOLERANCE * scale {
        tracing::warn!(
            mae = accuracy.mae,
            rmse = accuracy.rmse,
            "Forecast accuracy: mae exceeds rmse"
        );
    }
}
