use chrono::Datelike;
use serde::Serialize;

use crate::models::HistoricalPoint;

/// Descriptive statistics of an aggregated series.
///
/// Sent upstream alongside the raw series and logged by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub days: usize,
    pub total: u64,
    pub mean_per_day: f64,
    pub non_zero_days: usize,
    pub peak: Option<HistoricalPoint>,
    /// Mean count per weekday, Monday first.
    pub weekday_means: [f64; 7],
}

impl SeriesSummary {
    pub fn from_series(series: &[HistoricalPoint]) -> Self {
        let total: u64 = series.iter().map(|p| u64::from(p.count)).sum();
        let mean_per_day = if series.is_empty() {
            0.0
        } else {
            total as f64 / series.len() as f64
        };

        let peak = series
            .iter()
            .fold(None::<HistoricalPoint>, |best, p| match best {
                Some(b) if b.count >= p.count => Some(b),
                _ => Some(*p),
            });

        let mut sums = [0u64; 7];
        let mut days = [0u32; 7];
        for p in series {
            let idx = p.date.weekday().num_days_from_monday() as usize;
            sums[idx] += u64::from(p.count);
            days[idx] += 1;
        }
        let mut weekday_means = [0.0; 7];
        for idx in 0..7 {
            if days[idx] > 0 {
                weekday_means[idx] = sums[idx] as f64 / f64::from(days[idx]);
            }
        }

        Self {
            days: series.len(),
            total,
            mean_per_day,
            non_zero_days: series.iter().filter(|p| p.count > 0).count(),
            peak,
            weekday_means,
        }
    }

    /// Relative spread between the busiest and quietest weekday.
    ///
    /// Rendered into the upstream prompt summary; 0.0 when the series is flat or empty.
    pub fn weekday_spread(&self) -> f64 {
        let max = self.weekday_means.iter().copied().fold(f64::MIN, f64::max);
        let min = self.weekday_means.iter().copied().fold(f64::MAX, f64::min);
        if self.mean_per_day <= 0.0 {
            return 0.0;
        }
        (max - min) / self.mean_per_day
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(counts: &[u32]) -> Vec<HistoricalPoint> {
        // 2025-09-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        counts
            .iter()
            .zip(start.iter_days())
            .map(|(&count, date)| HistoricalPoint { date, count })
            .collect()
    }

    #[test]
    fn totals_and_mean() {
        let s = SeriesSummary::from_series(&series(&[5, 5, 6, 4, 7, 5, 0]));
        assert_eq!(s.days, 7);
        assert_eq!(s.total, 32);
        assert_eq!(s.non_zero_days, 6);
        assert!((s.mean_per_day - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn peak_keeps_first_maximum() {
        let s = SeriesSummary::from_series(&series(&[3, 9, 9, 1]));
        let peak = s.peak.unwrap();
        assert_eq!(peak.count, 9);
        assert_eq!(peak.date, NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
    }

    #[test]
    fn weekday_means_are_monday_first() {
        // Two weeks: weekdays 10, weekends 2
        let counts = [10, 10, 10, 10, 10, 2, 2, 10, 10, 10, 10, 10, 2, 2];
        let s = SeriesSummary::from_series(&series(&counts));
        assert_eq!(s.weekday_means[0], 10.0);
        assert_eq!(s.weekday_means[5], 2.0);
        assert_eq!(s.weekday_means[6], 2.0);
        assert!(s.weekday_spread() > 1.0);
    }

    #[test]
    fn flat_and_empty_series_have_no_spread() {
        let flat = SeriesSummary::from_series(&series(&[4; 14]));
        assert_eq!(flat.weekday_spread(), 0.0);

        let empty = SeriesSummary::from_series(&[]);
        assert_eq!(empty.days, 0);
        assert!(empty.peak.is_none());
        assert_eq!(empty.weekday_spread(), 0.0);
    }
}
