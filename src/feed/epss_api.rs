use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::config::{parse_date, Config};
use crate::delta::CurrentScore;
use crate::feed::ScoreFeed;
use crate::series::{is_probability, ScorePoint};

/// FIRST.org EPSS API client.
pub struct EpssClient {
    client: Client,
    base: Url,
}

// FIRST API response types. Numbers come back as strings.
#[derive(Deserialize, Debug)]
struct EpssResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize, Debug)]
struct HistoryItem {
    #[serde(rename = "time-series", default)]
    time_series: Vec<RawScore>,
}

#[derive(Deserialize, Debug)]
struct RawScore {
    epss: Option<Lenient>,
    percentile: Option<Lenient>,
    date: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CurrentItem {
    cve: String,
    #[serde(flatten)]
    score: RawScore,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Lenient {
    Num(f64),
    Text(String),
}

impl Lenient {
    /// Parsed value, only when it is a valid probability.
    fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Lenient::Num(v) => *v,
            Lenient::Text(s) => s.trim().parse().ok()?,
        };
        is_probability(v).then_some(v)
    }
}

impl RawScore {
    fn to_point(&self) -> Option<ScorePoint> {
        Some(ScorePoint::new(
            parse_date(self.date.as_deref()?)?,
            self.epss.as_ref()?.as_f64()?,
            self.percentile.as_ref()?.as_f64()?,
        ))
    }
}

/// Observations from a `scope=time-series` response. Only the first data
/// element is read; entries with unparsable fields are skipped.
pub fn parse_history_body(body: &str) -> Result<Vec<ScorePoint>> {
    let resp: EpssResponse<HistoryItem> =
        serde_json::from_str(body).context("decoding time-series response")?;
    Ok(resp
        .data
        .first()
        .map(|item| item.time_series.iter().filter_map(RawScore::to_point).collect())
        .unwrap_or_default())
}

/// Current scores from a batched response, keyed by identifier. A repeated
/// identifier keeps its last entry.
pub fn parse_current_body(body: &str) -> Result<HashMap<String, CurrentScore>> {
    let resp: EpssResponse<CurrentItem> =
        serde_json::from_str(body).context("decoding current-score response")?;
    let mut out = HashMap::with_capacity(resp.data.len());
    for item in resp.data {
        if let Some(p) = item.score.to_point() {
            out.insert(
                item.cve,
                CurrentScore {
                    score: p.score,
                    percentile: p.percentile,
                    date: p.date,
                },
            );
        }
    }
    Ok(out)
}

impl EpssClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .context("building http client")?;
        let base = Url::parse(&cfg.api_base)
            .with_context(|| format!("invalid EPSS_API_BASE '{}'", cfg.api_base))?;
        Ok(Self { client, base })
    }

    pub fn history_url(&self, identifier: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("cve", identifier)
            .append_pair("scope", "time-series");
        url
    }

    pub fn current_url(&self, identifiers: &[String]) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("cve", &identifiers.join(","));
        url
    }

    async fn get_body(&self, url: Url) -> Result<String> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", url, status));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl ScoreFeed for EpssClient {
    async fn fetch_history(&self, identifier: &str) -> Result<Vec<ScorePoint>> {
        let body = self.get_body(self.history_url(identifier)).await?;
        parse_history_body(&body)
    }

    async fn fetch_current(&self, identifiers: &[String]) -> Result<HashMap<String, CurrentScore>> {
        let body = self.get_body(self.current_url(identifiers)).await?;
        parse_current_body(&body)
    }
}
