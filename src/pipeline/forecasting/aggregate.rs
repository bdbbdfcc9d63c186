use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use super::ForecastError;
use crate::config::MIN_HISTORY_DAYS;
use crate::models::{AppointmentRecord, CardCategory, HistoricalPoint};

/// Completion timestamps of the records that count towards `category`.
pub fn completions_for(
    records: &[AppointmentRecord],
    category: CardCategory,
) -> impl Iterator<Item = DateTime<Utc>> + '_ {
    records
        .iter()
        .filter(move |r| category.matches(&r.service_category))
        .map(|r| r.completed_at)
}

/// Bucket completion timestamps into a gap-filled daily series over `[start, end]`.
///
/// Days are calendar days in `reporting_offset`, not in whatever offset a timestamp
/// was recorded with. Timestamps outside the range are ignored. Every day in the
/// range gets a point, with `count = 0` when nothing completed.
pub fn aggregate<I>(
    completions: I,
    start: NaiveDate,
    end: NaiveDate,
    reporting_offset: &FixedOffset,
) -> Result<Vec<HistoricalPoint>, ForecastError>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    if start > end {
        return Err(ForecastError::InvalidRange { start, end });
    }

    let mut counts: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for completed_at in completions {
        let day = completed_at.with_timezone(reporting_offset).date_naive();
        if day < start || day > end {
            continue;
        }
        let slot = counts.entry(day).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    // Every key in `counts` has at least one completion
    let non_zero_days = counts.len();
    if non_zero_days < MIN_HISTORY_DAYS {
        tracing::debug!(
            non_zero_days,
            required = MIN_HISTORY_DAYS,
            %start,
            %end,
            "Not enough history to forecast"
        );
        return Err(ForecastError::InsufficientData {
            available: non_zero_days,
            required: MIN_HISTORY_DAYS,
        });
    }

    let series = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|date| HistoricalPoint {
            date,
            count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect();

    Ok(series)
}
