//! Step-series reconstruction.
//!
//! Turns one identifier's anchor score plus its sparse, irregularly dated
//! observation history into a piecewise-constant series: the value is held
//! flat between observations and jumps at each observation date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One EPSS measurement for one identifier on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorePoint {
    pub date: NaiveDate,
    pub score: f64,
    pub percentile: f64,
}

impl ScorePoint {
    pub fn new(date: NaiveDate, score: f64, percentile: f64) -> Self {
        Self {
            date,
            score,
            percentile,
        }
    }
}

/// Scores and percentiles are probabilities; NaN and infinities fail too.
pub fn is_probability(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

/// A plotted vertex of a step series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl StepPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Ordered staircase vertices. Never empty, dates non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepSeries {
    points: Vec<StepPoint>,
}

impl StepSeries {
    pub fn points(&self) -> &[StepPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&StepPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&StepPoint> {
        self.points.last()
    }
}

/// Build the staircase for one identifier.
///
/// Observations are sorted by date (stable, so same-day entries keep their
/// arrival order) and anything dated before `anchor.date` is dropped. Each
/// remaining observation adds two vertices at its date: the previous value,
/// closing the flat segment, then the observed score, opening the next one.
///
/// With no remaining observations the anchor value is carried flat to
/// `today`. When observations exist the series ends at the last one and is
/// not extended to `today`.
pub fn build_step_series(
    anchor: &ScorePoint,
    observations: &[ScorePoint],
    today: NaiveDate,
) -> StepSeries {
    let mut sorted: Vec<&ScorePoint> = observations.iter().collect();
    sorted.sort_by_key(|p| p.date);

    let mut points = Vec::with_capacity(1 + sorted.len() * 2);
    points.push(StepPoint::new(anchor.date, anchor.score));
    let mut previous = anchor.score;
    let mut kept = 0usize;

    for obs in sorted.into_iter().filter(|p| p.date >= anchor.date) {
        points.push(StepPoint::new(obs.date, previous));
        points.push(StepPoint::new(obs.date, obs.score));
        previous = obs.score;
        kept += 1;
    }

    if kept == 0 {
        points.push(StepPoint::new(today, previous));
    }

    StepSeries { points }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn obs(date: &str, score: f64) -> ScorePoint {
        ScorePoint::new(d(date), score, 0.5)
    }

    fn pairs(series: &StepSeries) -> Vec<(NaiveDate, f64)> {
        series.points().iter().map(|p| (p.date, p.value)).collect()
    }

    #[test]
    fn test_out_of_order_observations_are_sorted() {
        let anchor = obs("2025-09-01", 0.01);
        let series = build_step_series(
            &anchor,
            &[obs("2025-09-15", 0.02), obs("2025-09-10", 0.015)],
            d("2025-10-17"),
        );
        assert_eq!(
            pairs(&series),
            vec![
                (d("2025-09-01"), 0.01),
                (d("2025-09-10"), 0.01),
                (d("2025-09-10"), 0.015),
                (d("2025-09-15"), 0.015),
                (d("2025-09-15"), 0.02),
            ]
        );
    }

    #[test]
    fn test_empty_observations_extend_flat_to_today() {
        let anchor = obs("2025-09-01", 0.05);
        let series = build_step_series(&anchor, &[], d("2025-10-01"));
        assert_eq!(
            pairs(&series),
            vec![(d("2025-09-01"), 0.05), (d("2025-10-01"), 0.05)]
        );
    }

    #[test]
    fn test_observations_before_anchor_are_dropped() {
        let anchor = obs("2025-09-05", 0.2);
        let series = build_step_series(
            &anchor,
            &[obs("2025-09-01", 0.9), obs("2025-09-04", 0.8)],
            d("2025-09-30"),
        );
        // everything filtered: flat extension, and the early values never leak in
        assert_eq!(
            pairs(&series),
            vec![(d("2025-09-05"), 0.2), (d("2025-09-30"), 0.2)]
        );
    }

    #[test]
    fn test_observation_on_anchor_date_is_kept() {
        let anchor = obs("2025-09-05", 0.2);
        let series = build_step_series(&anchor, &[obs("2025-09-05", 0.3)], d("2025-09-30"));
        assert_eq!(
            pairs(&series),
            vec![
                (d("2025-09-05"), 0.2),
                (d("2025-09-05"), 0.2),
                (d("2025-09-05"), 0.3),
            ]
        );
    }

    #[test]
    fn test_same_day_observations_chain_in_arrival_order() {
        let anchor = obs("2025-09-01", 0.1);
        let series = build_step_series(
            &anchor,
            &[obs("2025-09-03", 0.4), obs("2025-09-02", 0.2), obs("2025-09-03", 0.3)],
            d("2025-09-30"),
        );
        assert_eq!(
            pairs(&series),
            vec![
                (d("2025-09-01"), 0.1),
                (d("2025-09-02"), 0.1),
                (d("2025-09-02"), 0.2),
                (d("2025-09-03"), 0.2),
                (d("2025-09-03"), 0.4),
                (d("2025-09-03"), 0.4),
                (d("2025-09-03"), 0.3),
            ]
        );
    }

    #[test]
    fn test_is_probability_bounds() {
        assert!(is_probability(0.0));
        assert!(is_probability(1.0));
        assert!(is_probability(0.00043));
        assert!(!is_probability(-0.0001));
        assert!(!is_probability(1.5));
        assert!(!is_probability(f64::NAN));
        assert!(!is_probability(f64::INFINITY));
    }

    #[test]
    fn test_no_extension_when_observations_exist() {
        let anchor = obs("2025-09-01", 0.1);
        let series = build_step_series(&anchor, &[obs("2025-09-02", 0.2)], d("2026-01-01"));
        assert_eq!(series.last().unwrap().date, d("2025-09-02"));
        assert_eq!(series.len(), 3);
    }
}
