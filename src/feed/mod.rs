use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::json;
use std::collections::HashMap;

use crate::delta::CurrentScore;
use crate::logging::{log_cache_lookup, log_fetch_failure, ProfileScope};
use crate::series::ScorePoint;

pub mod cache;
pub mod epss_api;

pub use cache::FetchCache;

/// FIRST API default page size; larger batches would be silently truncated.
pub const MAX_CURRENT_BATCH: usize = 100;

/// Remote source of EPSS observations.
#[async_trait]
pub trait ScoreFeed: Send + Sync {
    /// Full observation history for one identifier, in any order.
    async fn fetch_history(&self, identifier: &str) -> Result<Vec<ScorePoint>>;
    /// Latest score for each identifier the service knows about.
    async fn fetch_current(&self, identifiers: &[String]) -> Result<HashMap<String, CurrentScore>>;
}

/// Histories for `identifiers`, cache first. Misses are fetched with up to
/// `concurrency` requests in flight. A failed fetch yields an empty history
/// for that identifier and is not cached.
pub async fn fetch_histories<F>(
    feed: &F,
    identifiers: &[String],
    cache: &mut FetchCache<Vec<ScorePoint>>,
    now: DateTime<Utc>,
    concurrency: usize,
) -> HashMap<String, Vec<ScorePoint>>
where
    F: ScoreFeed + ?Sized,
{
    let mut out = HashMap::with_capacity(identifiers.len());
    let mut misses: Vec<String> = Vec::new();
    for id in identifiers {
        match cache.get(id, now) {
            Some(history) => {
                out.insert(id.clone(), history.clone());
            }
            None => misses.push(id.clone()),
        }
    }
    log_cache_lookup("history", identifiers.len() - misses.len(), misses.len());
    if misses.is_empty() {
        return out;
    }

    let _scope = ProfileScope::with_context("fetch_histories", &[("requests", json!(misses.len()))]);
    let results: Vec<(String, Result<Vec<ScorePoint>>)> = stream::iter(misses)
        .map(|id| async move {
            let result = feed.fetch_history(&id).await;
            (id, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for (id, result) in results {
        match result {
            Ok(history) => {
                cache.insert(id.clone(), history.clone(), now);
                out.insert(id, history);
            }
            Err(err) => {
                log_fetch_failure("history", Some(&id), &format!("{:#}", err));
                out.insert(id, Vec::new());
            }
        }
    }
    out
}

/// Current scores for `identifiers`, cache first. Misses are requested in
/// batches of at most [`MAX_CURRENT_BATCH`]; a failed batch leaves its
/// identifiers without a current score.
pub async fn fetch_current_scores<F>(
    feed: &F,
    identifiers: &[String],
    cache: &mut FetchCache<CurrentScore>,
    now: DateTime<Utc>,
) -> HashMap<String, CurrentScore>
where
    F: ScoreFeed + ?Sized,
{
    let mut out = HashMap::with_capacity(identifiers.len());
    let mut misses: Vec<String> = Vec::new();
    for id in identifiers {
        match cache.get(id, now) {
            Some(current) => {
                out.insert(id.clone(), *current);
            }
            None => misses.push(id.clone()),
        }
    }
    log_cache_lookup("current", identifiers.len() - misses.len(), misses.len());

    let _scope = ProfileScope::with_context("fetch_current", &[("requests", json!(misses.len()))]);
    for batch in misses.chunks(MAX_CURRENT_BATCH) {
        match feed.fetch_current(batch).await {
            Ok(found) => {
                for (id, current) in found {
                    cache.insert(id.clone(), current, now);
                    out.insert(id, current);
                }
            }
            Err(err) => log_fetch_failure("current", None, &format!("{:#}", err)),
        }
    }
    out
}
