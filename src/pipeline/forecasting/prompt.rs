use std::fmt::Write;

use chrono::{Duration, NaiveDate};

use super::summary::SeriesSummary;
use crate::models::{CardCategory, HistoricalPoint};

pub const FORECAST_SYSTEM_PROMPT: &str = r#"
You are a time-series forecasting engine for a municipal health office. You apply
seasonal ARIMA (SARIMA) reasoning to daily counts of completed health-card
appointments and project future daily demand.

RULES (ABSOLUTE, NO EXCEPTIONS):
1. Output ONLY one JSON object. No prose, no Markdown, no code fences.
2. Use exactly the field names given in the schema. Do not add or rename fields.
3. Every numeric field must be a finite JSON number. Never use null, strings, NaN or Infinity.
4. Return exactly one prediction per requested day, in date order, with no gaps.
5. For every prediction: lower_bound <= predicted_count <= upper_bound, predicted_count >= 0.
6. confidence_level is a fraction between 0 and 1 (0.95 means 95%).
7. rmse, mae and mse are non-negative; r_squared is at most 1.
"#;

/// Render the user prompt for one forecast request.
///
/// Deterministic: the same series, horizon and context always render the same text.
pub fn render_forecast_prompt(
    series: &[HistoricalPoint],
    horizon_days: u32,
    context: CardCategory,
    summary: &SeriesSummary,
) -> String {
    let mut out = String::new();

    let (first_day, last_day) = match (series.first(), series.last()) {
        (Some(first), Some(last)) => (first.date, last.date),
        _ => return out,
    };
    let forecast_start = last_day + Duration::days(1);
    let forecast_end = last_day + Duration::days(i64::from(horizon_days));

    let _ = writeln!(
        out,
        "Forecast daily demand for {} ({}).",
        context.label(),
        context.as_str()
    );
    let _ = writeln!(
        out,
        "History: {} days from {} to {}, one line per day as date,count.",
        series.len(),
        first_day,
        last_day
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "<series>");
    for point in series {
        let _ = writeln!(out, "{},{}", point.date, point.count);
    }
    let _ = writeln!(out, "</series>");
    let _ = writeln!(out);

    let _ = writeln!(out, "Summary:");
    let _ = writeln!(out, "- total completed: {}", summary.total);
    let _ = writeln!(out, "- mean per day: {:.2}", summary.mean_per_day);
    let _ = writeln!(out, "- days with activity: {}", summary.non_zero_days);
    if let Some(peak) = summary.peak {
        let _ = writeln!(out, "- busiest day: {} ({})", peak.date, peak.count);
    }
    let _ = writeln!(
        out,
        "- weekday means Mon..Sun: {}",
        summary
            .weekday_means
            .iter()
            .map(|m| format!("{m:.2}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = writeln!(
        out,
        "- weekday spread (busiest minus quietest weekday, over mean): {:.2}",
        summary.weekday_spread()
    );
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Predict exactly {horizon_days} day(s), from {forecast_start} to {forecast_end} inclusive."
    );
    let _ = writeln!(out);
    out.push_str(&output_schema(forecast_start));

    out
}

/// JSON schema description the response is validated against.
fn output_schema(forecast_start: NaiveDate) -> String {
    format!(
        r#"Respond with this JSON structure:
{{
  "predictions": [
    {{
      "date": "YYYY-MM-DD (first is {forecast_start}, then consecutive days)",
      "predicted_count": 0.0,
      "lower_bound": 0.0,
      "upper_bound": 0.0,
      "confidence_level": 0.95
    }}
  ],
  "model_version": "string identifying the model, e.g. SARIMA(1,1,1)(1,1,1)[7]",
  "trend": "increasing | decreasing | stable",
  "seasonality_detected": true,
  "accuracy": {{
    "r_squared": 0.0,
    "rmse": 0.0,
    "mae": 0.0,
    "mse": 0.0
  }}
}}

Units: predicted_count, lower_bound and upper_bound are completed appointments per day.
accuracy describes the in-sample fit on the history above.
"#
    )
}
