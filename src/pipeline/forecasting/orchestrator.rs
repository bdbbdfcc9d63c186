use std::time::Instant;

use futures_util::future::join_all;
use tracing::Instrument;
use uuid::Uuid;

use super::aggregate::{aggregate, completions_for};
use super::prompt::FORECAST_SYSTEM_PROMPT;
use super::request::build_forecast_request;
use super::types::{ForecastClient, ForecastRequest, PipelineStage};
use super::validation::validate_forecast_response;
use super::ForecastError;
use crate::config::ForecastConfig;
use crate::models::{AppointmentRecord, CardCategory, DateRange, ForecastResult};

/// Runs the forecasting pipeline end to end:
/// aggregate → build request → call upstream (bounded) → validate → result
///
/// Holds no mutable state between runs, so one orchestrator can serve any number of
/// concurrent runs. Dropping a run's future cancels it; nothing is persisted.
pub struct ForecastOrchestrator<C: ForecastClient> {
    client: C,
    config: ForecastConfig,
}

impl<C: ForecastClient> ForecastOrchestrator<C> {
    pub fn new(client: C, config: ForecastConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Forecast `horizon_days` days of demand for `context` from completed appointments
    /// in `range`.
    pub async fn run(
        &self,
        records: &[AppointmentRecord],
        range: DateRange,
        horizon_days: i64,
        context: CardCategory,
    ) -> Result<ForecastResult, ForecastError> {
        self.run_observed(records, range, horizon_days, context, |_| {})
            .await
    }

    /// Same as [`run`](Self::run), reporting every stage transition to `on_stage`.
    ///
    /// The final reported stage is always `Done` or `Failed`.
    pub async fn run_observed<F>(
        &self,
        records: &[AppointmentRecord],
        range: DateRange,
        horizon_days: i64,
        context: CardCategory,
        mut on_stage: F,
    ) -> Result<ForecastResult, ForecastError>
    where
        F: FnMut(PipelineStage) + Send,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "forecast_run",
            %run_id,
            category = %context,
            horizon_days,
        );

        async move {
            let started = Instant::now();
            let mut stage = PipelineStage::Aggregating;

            let outcome = self
                .drive(records, range, horizon_days, context, &mut |next| {
                    tracing::debug!(stage = %next, "Entering stage");
                    stage = next;
                    on_stage(next);
                })
                .await;

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(result) => {
                    on_stage(PipelineStage::Done);
                    tracing::info!(
                        predictions = result.predictions.len(),
                        trend = %result.trend,
                        seasonality = result.seasonality_detected,
                        elapsed_ms,
                        "Forecast complete"
                    );
                    Ok(result)
                }
                Err(e) => {
                    on_stage(PipelineStage::Failed);
                    tracing::warn!(
                        %stage,
                        class = ?e.class(),
                        retryable = e.is_retryable(),
                        elapsed_ms,
                        error = %e,
                        "Forecast failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Run the same range and horizon for several categories concurrently.
    ///
    /// Results come back in the order of `contexts`; one failure does not affect the others.
    pub async fn run_categories(
        &self,
        records: &[AppointmentRecord],
        range: DateRange,
        horizon_days: i64,
        contexts: &[CardCategory],
    ) -> Vec<(CardCategory, Result<ForecastResult, ForecastError>)> {
        let runs = contexts.iter().map(|&context| async move {
            (context, self.run(records, range, horizon_days, context).await)
        });
        join_all(runs).await
    }

    async fn drive<G>(
        &self,
        records: &[AppointmentRecord],
        range: DateRange,
        horizon_days: i64,
        context: CardCategory,
        advance: &mut G,
    ) -> Result<ForecastResult, ForecastError>
    where
        G: FnMut(PipelineStage) + Send,
    {
        advance(PipelineStage::Aggregating);
        let series = aggregate(
            completions_for(records, context),
            range.start,
            range.end,
            &self.config.reporting_offset,
        )?;
        tracing::debug!(days = series.len(), "Aggregated history");

        advance(PipelineStage::RequestBuilding);
        let request = build_forecast_request(series, horizon_days, context)?;

        advance(PipelineStage::Calling);
        let raw = self.call_upstream(&request).await?;

        advance(PipelineStage::Validating);
        validate_forecast_response(&raw, &request)
    }

    /// Single bounded upstream call. Never retried here.
    async fn call_upstream(&self, request: &ForecastRequest) -> Result<String, ForecastError> {
        let timeout = self.config.timeout;
        let call = self.client.complete(FORECAST_SYSTEM_PROMPT, &request.prompt);

        match tokio::time::timeout(timeout, call).await {
            Ok(response) => {
                let raw = response?;
                tracing::debug!(response_chars = raw.len(), "Upstream answered");
                Ok(raw)
            }
            Err(_) => Err(ForecastError::UpstreamTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::forecasting::{MockForecastClient, MockReply};
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() + ChronoDuration::days(n)
    }

    /// Two yellow-card completions per day at 10:00 local (02:00 UTC) for `days` days.
    fn records(days: i64) -> Vec<AppointmentRecord> {
        (0..days)
            .flat_map(|n| {
                let at = day(n).and_hms_opt(2, 0, 0).unwrap().and_utc();
                vec![
                    AppointmentRecord::new(at, "yellow_card"),
                    AppointmentRecord::new(at, "food_handler"),
                ]
            })
            .collect()
    }

    fn valid_response(first: NaiveDate, horizon: i64) -> String {
        let predictions: Vec<String> = (0..horizon)
            .map(|i| {
                format!(
                    r#"{{"date":"{}","predicted_count":2.0,"lower_bound":1.0,"upper_bound":3.0,"confidence_level":0.9}}"#,
                    first + ChronoDuration::days(i)
                )
            })
            .collect();
        format!(
            r#"{{"predictions":[{}],"model_version":"sarima-llm-1","trend":"stable","seasonality_detected":false,"accuracy":{{"r_squared":0.7,"rmse":1.0,"mae":0.8,"mse":1.0}}}}"#,
            predictions.join(",")
        )
    }

    fn range(days: i64) -> DateRange {
        DateRange::new(day(0), day(days - 1))
    }

    #[tokio::test]
    async fn successful_run_walks_every_stage() {
        let client = MockForecastClient::new(&valid_response(day(14), 5));
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let mut stages = Vec::new();
        let result = orchestrator
            .run_observed(&records(14), range(14), 5, CardCategory::FoodHandler, |s| {
                stages.push(s)
            })
            .await
            .unwrap();

        assert_eq!(result.predictions.len(), 5);
        assert_eq!(
            stages,
            vec![
                PipelineStage::Aggregating,
                PipelineStage::RequestBuilding,
                PipelineStage::Calling,
                PipelineStage::Validating,
                PipelineStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn insufficient_history_never_calls_upstream() {
        let client = MockForecastClient::new("{}");
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let mut stages = Vec::new();
        let err = orchestrator
            .run_observed(&records(3), range(14), 5, CardCategory::All, |s| stages.push(s))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                available: 3,
                required: 7
            }
        ));
        assert_eq!(stages, vec![PipelineStage::Aggregating, PipelineStage::Failed]);
        assert_eq!(orchestrator.client().call_count(), 0);
    }

    #[tokio::test]
    async fn bad_horizon_fails_at_request_building() {
        let client = MockForecastClient::new("{}");
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let mut stages = Vec::new();
        let err = orchestrator
            .run_observed(&records(14), range(14), 0, CardCategory::All, |s| stages.push(s))
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::InvalidHorizon(0)));
        assert_eq!(stages.last(), Some(&PipelineStage::Failed));
        assert!(stages.contains(&PipelineStage::RequestBuilding));
        assert_eq!(orchestrator.client().call_count(), 0);
    }

    #[tokio::test]
    async fn slow_upstream_times_out_without_retry() {
        let client = MockForecastClient::new(&valid_response(day(14), 5))
            .with_delay(Duration::from_secs(5));
        let config = ForecastConfig::default().with_timeout(Duration::from_millis(50));
        let orchestrator = ForecastOrchestrator::new(client, config);

        let err = orchestrator
            .run(&records(14), range(14), 5, CardCategory::All)
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::UpstreamTimeout { timeout_ms: 50 }));
        assert!(err.is_retryable());
        assert_eq!(orchestrator.client().call_count(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_is_returned_unwrapped() {
        let client = MockForecastClient::with_reply(MockReply::Status(503));
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let err = orchestrator
            .run(&records(14), range(14), 5, CardCategory::All)
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::UpstreamStatus { status: 503, .. }));
        assert_eq!(orchestrator.client().call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_response_fails_at_validation() {
        let client = MockForecastClient::new("The forecast looks stable.");
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let err = orchestrator
            .run_observed(&records(14), range(14), 5, CardCategory::All, move |s| {
                sink.lock().unwrap().push(s)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ForecastError::MalformedResponse(_)));
        let stages = stages.lock().unwrap();
        assert_eq!(
            stages[stages.len() - 2..],
            [PipelineStage::Validating, PipelineStage::Failed]
        );
    }

    #[tokio::test]
    async fn category_filter_applies_before_aggregation() {
        // Only entertainment records exist, so food-handler history is empty
        let recs: Vec<AppointmentRecord> = records(14)
            .into_iter()
            .map(|r| AppointmentRecord::new(r.completed_at, "pink_card"))
            .collect();
        let orchestrator =
            ForecastOrchestrator::new(MockForecastClient::new("{}"), ForecastConfig::default());

        let err = orchestrator
            .run(&recs, range(14), 5, CardCategory::FoodHandler)
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientData { available: 0, .. }));
    }

    #[tokio::test]
    async fn prompt_sent_upstream_covers_requested_range() {
        let client = MockForecastClient::new(&valid_response(day(14), 5));
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());
        orchestrator
            .run(&records(14), range(14), 5, CardCategory::All)
            .await
            .unwrap();

        let prompt = orchestrator.client().last_prompt().unwrap();
        assert!(prompt.contains(&day(0).to_string()));
        assert!(prompt.contains(&day(13).to_string()));
        assert!(prompt.contains(&day(14).to_string()));
    }

    #[tokio::test]
    async fn run_categories_keeps_order_and_isolates_failures() {
        let client = MockForecastClient::new(&valid_response(day(14), 5));
        let orchestrator = ForecastOrchestrator::new(client, ForecastConfig::default());

        let results = orchestrator
            .run_categories(
                &records(14),
                range(14),
                5,
                &[CardCategory::FoodHandler, CardCategory::Entertainment, CardCategory::All],
            )
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, CardCategory::FoodHandler);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[1].1,
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(results[2].1.is_ok());
        assert_eq!(orchestrator.client().call_count(), 2);
    }
}
