//! One render pass over every tracked identifier.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::Config;
use crate::data::{load_dataset, load_submission, InitialData, SourceManifest, TrackedRow};
use crate::delta::{build_delta, summarize, CurrentScore};
use crate::feed::{fetch_current_scores, fetch_histories, FetchCache, ScoreFeed};
use crate::logging::{log_pass_summary, log_series_built};
use crate::report::{Dashboard, IdentifierSeries};
use crate::series::{build_step_series, ScorePoint};

pub struct Tracker {
    cfg: Config,
    rows: Vec<TrackedRow>,
    initial: InitialData,
    identifiers: Vec<String>,
    history_cache: FetchCache<Vec<ScorePoint>>,
    current_cache: FetchCache<CurrentScore>,
    manifests: Vec<SourceManifest>,
    passes: u64,
}

impl Tracker {
    /// Load the submission table and initial dataset named in `cfg`.
    pub fn load(cfg: Config) -> Result<Self> {
        let (rows, submission) = load_submission(Path::new(&cfg.submission_path))
            .context("loading tracked identifiers")?;
        let (initial, dataset) = load_dataset(Path::new(&cfg.dataset_path), &rows)
            .context("loading initial dataset")?;
        let mut tracker = Self::new(cfg, rows, initial);
        tracker.manifests = vec![submission, dataset];
        Ok(tracker)
    }

    pub fn new(cfg: Config, rows: Vec<TrackedRow>, initial: InitialData) -> Self {
        let mut seen = HashSet::new();
        let identifiers = rows
            .iter()
            .filter(|r| seen.insert(r.identifier.as_str()))
            .map(|r| r.identifier.clone())
            .collect();
        Self {
            history_cache: FetchCache::new(cfg.cache_ttl_secs),
            current_cache: FetchCache::new(cfg.cache_ttl_secs),
            cfg,
            rows,
            initial,
            identifiers,
            manifests: Vec::new(),
            passes: 0,
        }
    }

    pub fn rows(&self) -> &[TrackedRow] {
        &self.rows
    }

    /// Distinct tracked identifiers in first-seen order.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    pub fn manifests(&self) -> &[SourceManifest] {
        &self.manifests
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Fetch (cache first) and rebuild every series and delta.
    pub async fn refresh<F>(&mut self, feed: &F, now: DateTime<Utc>) -> Dashboard
    where
        F: ScoreFeed + ?Sized,
    {
        self.passes += 1;
        self.history_cache.purge_expired(now);
        self.current_cache.purge_expired(now);

        let histories = fetch_histories(
            feed,
            &self.identifiers,
            &mut self.history_cache,
            now,
            self.cfg.fetch_concurrency,
        )
        .await;
        let current =
            fetch_current_scores(feed, &self.identifiers, &mut self.current_cache, now).await;

        let dashboard = build_dashboard(&self.cfg, &self.rows, &self.initial, &histories, &current, now);
        let s = dashboard.summary;
        log_pass_summary(
            self.passes,
            s.total,
            s.increased,
            s.decreased,
            s.unchanged,
            histories.values().filter(|h| !h.is_empty()).count(),
        );
        dashboard
    }
}

/// Assemble a dashboard from already-fetched data. `today` is the UTC date of
/// `now`.
pub fn build_dashboard(
    cfg: &Config,
    rows: &[TrackedRow],
    initial: &InitialData,
    histories: &HashMap<String, Vec<ScorePoint>>,
    current: &HashMap<String, CurrentScore>,
    now: DateTime<Utc>,
) -> Dashboard {
    let today = now.date_naive();
    let mut series = Vec::with_capacity(rows.len());
    let mut deltas = Vec::with_capacity(rows.len());

    for row in rows {
        let anchor = initial.anchor_for(row, cfg.fallback_anchor_date);
        let observations = histories
            .get(&row.identifier)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let points = build_step_series(&anchor, observations, today);
        // a flat series is exactly anchor + extension
        log_series_built(&row.identifier, observations.len(), points.len(), points.len() == 2);

        series.push(IdentifierSeries {
            identifier: row.identifier.clone(),
            anchor,
            points,
        });
        deltas.push(build_delta(
            row,
            current.get(&row.identifier),
            cfg.fallback_as_of_date,
        ));
    }

    Dashboard {
        group: cfg.group_name.clone(),
        generated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        today,
        series,
        summary: summarize(&deltas),
        deltas,
    }
}
