//! Conversion funnel over the ordered workflow stages.
//!
//! Each stage's conversion rate is relative to the stage before it, not to
//! the funnel's first stage: [100, 50, 25, 25] converts at [100, 50, 50, 100].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::filter::{Aggregate, Field, FieldValue, GroupKey};
use crate::storage::models::Status;
use crate::validation::params::LookbackWindow;

use super::{AnalyticsEngine, AnalyticsError, Period};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelStage {
    pub status: Status,
    pub count: u64,
    pub avg_quality: f64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub period: Period,
    /// Sum over the funnel stages only; rejected submissions are excluded.
    pub total_submissions: u64,
    pub funnel: Vec<FunnelStage>,
}

/// Stage-over-previous-stage conversion rates in percent.
///
/// The first stage is 100 by definition. A stage following an empty stage
/// converts at 0.
pub fn conversion_rates(counts: &[u64]) -> Vec<f64> {
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            if i == 0 {
                return 100.0;
            }
            match counts[i - 1] {
                0 => 0.0,
                previous => count as f64 / previous as f64 * 100.0,
            }
        })
        .collect()
}

impl AnalyticsEngine {
    pub fn funnel(&self, window: LookbackWindow) -> Result<FunnelReport, AnalyticsError> {
        self.funnel_at(window, Utc::now())
    }

    pub fn funnel_at(
        &self,
        window: LookbackWindow,
        now: DateTime<Utc>,
    ) -> Result<FunnelReport, AnalyticsError> {
        let period = Period::new(window, now);
        let rows = self.store().aggregate(
            &period.filter(),
            &[GroupKey::Field(Field::Status)],
            &[Aggregate::Count, Aggregate::AvgQualityScore],
        )?;

        let by_status: HashMap<String, (u64, f64)> = rows
            .into_iter()
            .filter_map(|row| match row.key(0) {
                FieldValue::Text(status) => Some((
                    status.clone(),
                    (row.count, row.avg_quality_score.unwrap_or(0.0)),
                )),
                _ => None,
            })
            .collect();

        let stages: Vec<(Status, u64, f64)> = Status::FUNNEL
            .iter()
            .map(|status| {
                let (count, avg) = by_status.get(status.as_str()).copied().unwrap_or((0, 0.0));
                (*status, count, avg)
            })
            .collect();

        let counts: Vec<u64> = stages.iter().map(|(_, count, _)| *count).collect();
        let funnel: Vec<FunnelStage> = stages
            .into_iter()
            .zip(conversion_rates(&counts))
            .map(|((status, count, avg_quality), conversion_rate)| FunnelStage {
                status,
                count,
                avg_quality,
                conversion_rate,
            })
            .collect();

        let total_submissions = counts.iter().sum();
        log::info!(
            "FUNNEL_COMPUTED days={} total={} counts={:?}",
            period.days,
            total_submissions,
            counts
        );

        Ok(FunnelReport {
            period,
            total_submissions,
            funnel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stage_over_previous() {
        assert_eq!(conversion_rates(&[100, 50, 25, 25]), vec![100.0, 50.0, 50.0, 100.0]);
    }

    #[test]
    fn test_empty_previous_stage() {
        assert_eq!(conversion_rates(&[0, 0, 3, 0]), vec![100.0, 0.0, 0.0, 0.0]);
        assert_eq!(conversion_rates(&[10, 0, 5]), vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn test_no_stages() {
        assert!(conversion_rates(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_rate_matches_previous_stage(counts in proptest::collection::vec(0u64..10_000, 1..8)) {
            let rates = conversion_rates(&counts);
            prop_assert_eq!(rates.len(), counts.len());
            prop_assert_eq!(rates[0], 100.0);
            for i in 1..counts.len() {
                if counts[i - 1] == 0 {
                    prop_assert_eq!(rates[i], 0.0);
                } else {
                    let expected = counts[i] as f64 * 100.0 / counts[i - 1] as f64;
                    prop_assert!((rates[i] - expected).abs() < 1e-9);
                }
            }
        }
    }
}
