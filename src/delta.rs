use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::TrackedRow;

/// Latest score the live feed reports for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentScore {
    pub score: f64,
    pub percentile: f64,
    pub date: NaiveDate,
}

/// Initial-vs-current comparison for one tracked identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub identifier: String,
    pub initial_score: f64,
    pub current_score: f64,
    pub delta: f64,
    pub delta_pct: f64,
    pub initial_percentile: f64,
    pub current_percentile: f64,
    pub as_of_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increased,
    Decreased,
    Unchanged,
}

impl DeltaRecord {
    pub fn direction(&self) -> Direction {
        if self.delta > 0.0 {
            Direction::Increased
        } else if self.delta < 0.0 {
            Direction::Decreased
        } else {
            Direction::Unchanged
        }
    }
}

/// Compare a tracked row against its live value.
///
/// Without a live value the current fields fall back to the initial ones and
/// `as_of_date` to `fallback_as_of`. `delta_pct` is 0 whenever the initial
/// score is not positive, whatever the current score is.
pub fn build_delta(
    row: &TrackedRow,
    current: Option<&CurrentScore>,
    fallback_as_of: NaiveDate,
) -> DeltaRecord {
    let (current_score, current_percentile, as_of_date) = match current {
        Some(c) => (c.score, c.percentile, c.date),
        None => (row.score, row.percentile, fallback_as_of),
    };

    let delta = current_score - row.score;
    let delta_pct = if row.score > 0.0 {
        delta / row.score * 100.0
    } else {
        0.0
    };

    DeltaRecord {
        identifier: row.identifier.clone(),
        initial_score: row.score,
        current_score,
        delta,
        delta_pct,
        initial_percentile: row.percentile,
        current_percentile,
        as_of_date,
    }
}

/// Status distribution over a set of deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub total: usize,
    pub increased: usize,
    pub decreased: usize,
    pub unchanged: usize,
}

pub fn summarize(deltas: &[DeltaRecord]) -> DeltaSummary {
    deltas
        .iter()
        .fold(DeltaSummary::default(), |mut acc, record| {
            acc.total += 1;
            match record.direction() {
                Direction::Increased => acc.increased += 1,
                Direction::Decreased => acc.decreased += 1,
                Direction::Unchanged => acc.unchanged += 1,
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(score: f64) -> TrackedRow {
        TrackedRow {
            identifier: "CVE-2025-0001".to_string(),
            score,
            percentile: 0.4,
        }
    }

    #[test]
    fn test_delta_and_percentage() {
        let current = CurrentScore {
            score: 0.15,
            percentile: 0.6,
            date: d("2025-10-10"),
        };
        let rec = build_delta(&row(0.1), Some(&current), d("2025-10-01"));
        assert!((rec.delta - 0.05).abs() < 1e-12);
        assert!((rec.delta_pct - 50.0).abs() < 1e-9);
        assert_eq!(rec.current_percentile, 0.6);
        assert_eq!(rec.as_of_date, d("2025-10-10"));
        assert_eq!(rec.direction(), Direction::Increased);
    }

    #[test]
    fn test_zero_initial_gives_zero_pct() {
        let current = CurrentScore {
            score: 0.9,
            percentile: 0.99,
            date: d("2025-10-10"),
        };
        let rec = build_delta(&row(0.0), Some(&current), d("2025-10-01"));
        assert_eq!(rec.delta_pct, 0.0);
        assert!((rec.delta - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_missing_current_falls_back_to_initial() {
        let rec = build_delta(&row(0.2), None, d("2025-10-01"));
        assert_eq!(rec.current_score, 0.2);
        assert_eq!(rec.current_percentile, 0.4);
        assert_eq!(rec.delta, 0.0);
        assert_eq!(rec.delta_pct, 0.0);
        assert_eq!(rec.as_of_date, d("2025-10-01"));
        assert_eq!(rec.direction(), Direction::Unchanged);
    }

    #[test]
    fn test_summary_counts() {
        let fallback = d("2025-10-01");
        let up = CurrentScore {
            score: 0.3,
            percentile: 0.5,
            date: fallback,
        };
        let down = CurrentScore {
            score: 0.1,
            percentile: 0.5,
            date: fallback,
        };
        let deltas = vec![
            build_delta(&row(0.2), Some(&up), fallback),
            build_delta(&row(0.2), Some(&down), fallback),
            build_delta(&row(0.2), None, fallback),
            build_delta(&row(0.2), Some(&up), fallback),
        ];
        let summary = summarize(&deltas);
        assert_eq!(
            summary,
            DeltaSummary {
                total: 4,
                increased: 2,
                decreased: 1,
                unchanged: 1
            }
        );
    }
}
