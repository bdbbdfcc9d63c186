use super::prompt::render_forecast_prompt;
use super::summary::SeriesSummary;
use super::types::ForecastRequest;
use super::ForecastError;
use crate::config::{MAX_HORIZON_DAYS, MIN_HISTORY_DAYS};
use crate::models::{CardCategory, HistoricalPoint};

/// Validate inputs and build the request sent upstream. Pure; no I/O.
///
/// `horizon_days` is signed so that nonsense from the caller is rejected here rather
/// than silently wrapped.
pub fn build_forecast_request(
    series: Vec<HistoricalPoint>,
    horizon_days: i64,
    context: CardCategory,
) -> Result<ForecastRequest, ForecastError> {
    if series.len() < MIN_HISTORY_DAYS {
        return Err(ForecastError::InsufficientData {
            available: series.len(),
            required: MIN_HISTORY_DAYS,
        });
    }

    if !(1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
        return Err(ForecastError::InvalidHorizon(horizon_days));
    }
    let horizon =
        u32::try_from(horizon_days).map_err(|_| ForecastError::InvalidHorizon(horizon_days))?;

    let summary = SeriesSummary::from_series(&series);
    let prompt = render_forecast_prompt(&series, horizon, context, &summary);

    Ok(ForecastRequest {
        series,
        horizon_days: horizon,
        domain_context: context,
        prompt,
    })
}
