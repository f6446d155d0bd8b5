//! Tracked-identifier table and initial-snapshot dataset.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::config::parse_date;
use crate::logging::{log_missing_anchor, log_source_loaded};
use crate::series::{is_probability, ScorePoint};

pub mod csv;

pub const SUBMISSION_COLUMNS: [&str; 3] = ["cve.id", "epss", "percentile"];
pub const DATASET_COLUMNS: [&str; 4] = ["cve.id", "cve.published", "epss", "percentile"];

/// One tracked identifier with the score it was submitted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRow {
    pub identifier: String,
    pub score: f64,
    pub percentile: f64,
}

/// Publication date and first known score from the initial dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialEntry {
    pub published: NaiveDate,
    pub score: f64,
    pub percentile: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceManifest {
    pub path: String,
    pub hash_sha256: String,
    pub row_count: u64,
    pub bad_rows: u64,
    pub warnings: Vec<String>,
}

/// Initial entries keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct InitialData {
    entries: HashMap<String, InitialEntry>,
}

impl InitialData {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, InitialEntry)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, identifier: &str) -> Option<&InitialEntry> {
        self.entries.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked identifiers with no entry, in row order.
    pub fn missing<'a>(&self, rows: &'a [TrackedRow]) -> Vec<&'a str> {
        rows.iter()
            .map(|r| r.identifier.as_str())
            .filter(|id| !self.entries.contains_key(*id))
            .collect()
    }

    /// Anchor for a tracked row: its publication date and dataset score, or
    /// `fallback_date` with the row's own score when the dataset lacks it.
    pub fn anchor_for(&self, row: &TrackedRow, fallback_date: NaiveDate) -> ScorePoint {
        match self.entries.get(&row.identifier) {
            Some(e) => ScorePoint::new(e.published, e.score, e.percentile),
            None => {
                log_missing_anchor(&row.identifier, &fallback_date.to_string());
                ScorePoint::new(fallback_date, row.score, row.percentile)
            }
        }
    }
}

struct Table {
    manifest: SourceManifest,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

fn read_table(path: &Path) -> Result<Table> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let hash = hex::encode(Sha256::digest(&bytes));
    let text = String::from_utf8_lossy(&bytes);
    let mut records = csv::parse_records(&text).into_iter();
    let header = records
        .next()
        .ok_or_else(|| anyhow!("{} has no header row", path.display()))?;
    Ok(Table {
        manifest: SourceManifest {
            path: path.display().to_string(),
            hash_sha256: hash,
            row_count: 0,
            bad_rows: 0,
            warnings: Vec::new(),
        },
        header,
        rows: records.collect(),
    })
}

fn field<'a>(record: &'a [String], idx: usize) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(|s| s.trim())
        .ok_or_else(|| format!("expected {}+ columns, got {}", idx + 1, record.len()))
}

fn number(record: &[String], idx: usize, name: &str) -> Result<f64, String> {
    let raw = field(record, idx)?;
    let value = raw
        .parse::<f64>()
        .map_err(|e| format!("bad {} '{}': {}", name, raw, e))?;
    if !is_probability(value) {
        return Err(format!("{} '{}' outside [0,1]", name, raw));
    }
    Ok(value)
}

fn identifier(record: &[String], idx: usize) -> Result<String, String> {
    let id = field(record, idx)?;
    if id.is_empty() {
        return Err("empty identifier".to_string());
    }
    Ok(id.to_string())
}

fn parse_tracked(record: &[String], cols: &[usize]) -> Result<TrackedRow, String> {
    Ok(TrackedRow {
        identifier: identifier(record, cols[0])?,
        score: number(record, cols[1], "epss")?,
        percentile: number(record, cols[2], "percentile")?,
    })
}

fn parse_initial(record: &[String], cols: &[usize]) -> Result<(String, InitialEntry), String> {
    let id = identifier(record, cols[0])?;
    let raw_date = field(record, cols[1])?;
    let published =
        parse_date(raw_date).ok_or_else(|| format!("bad published date '{}'", raw_date))?;
    Ok((
        id,
        InitialEntry {
            published,
            score: number(record, cols[2], "epss")?,
            percentile: number(record, cols[3], "percentile")?,
        },
    ))
}

/// Load the tracked-identifier table. Rows that fail to parse are skipped
/// and counted; a missing required column is an error.
pub fn load_submission(path: &Path) -> Result<(Vec<TrackedRow>, SourceManifest)> {
    let mut table = read_table(path)?;
    let cols = csv::column_indices(&table.header, &SUBMISSION_COLUMNS)
        .map_err(|e| anyhow!("{}: {}", path.display(), e))?;

    let mut out = Vec::with_capacity(table.rows.len());
    for (line, record) in table.rows.iter().enumerate() {
        match parse_tracked(record, &cols) {
            Ok(row) => out.push(row),
            Err(err) => {
                table.manifest.bad_rows += 1;
                table.manifest.warnings.push(format!("bad_row {}: {}", line + 1, err));
            }
        }
    }
    table.manifest.row_count = out.len() as u64;

    let m = &table.manifest;
    log_source_loaded("submission", &m.path, m.row_count, m.bad_rows, &m.hash_sha256);
    Ok((out, table.manifest))
}

/// Load the initial-snapshot dataset, keeping only `tracked` identifiers.
/// The first row for an identifier wins.
pub fn load_dataset(path: &Path, tracked: &[TrackedRow]) -> Result<(InitialData, SourceManifest)> {
    let mut table = read_table(path)?;
    let cols = csv::column_indices(&table.header, &DATASET_COLUMNS)
        .map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    let wanted: HashSet<&str> = tracked.iter().map(|r| r.identifier.as_str()).collect();

    let mut entries: HashMap<String, InitialEntry> = HashMap::new();
    for (line, record) in table.rows.iter().enumerate() {
        match parse_initial(record, &cols) {
            Ok((id, entry)) => {
                table.manifest.row_count += 1;
                if wanted.contains(id.as_str()) {
                    entries.entry(id).or_insert(entry);
                }
            }
            Err(err) => {
                table.manifest.bad_rows += 1;
                table.manifest.warnings.push(format!("bad_row {}: {}", line + 1, err));
            }
        }
    }

    let m = &table.manifest;
    log_source_loaded("dataset", &m.path, m.row_count, m.bad_rows, &m.hash_sha256);
    Ok((InitialData { entries }, table.manifest))
}

/// Both manifests plus which tracked identifiers will fall back to
/// `fallback_anchor_date`.
pub fn coverage_report(
    submission: &SourceManifest,
    dataset: &SourceManifest,
    rows: &[TrackedRow],
    initial: &InitialData,
    fallback_anchor_date: NaiveDate,
) -> Value {
    json!({
        "submission": submission,
        "dataset": dataset,
        "tracked": rows.len(),
        "anchored": initial.len(),
        "missing_anchor": initial.missing(rows),
        "fallback_anchor_date": fallback_anchor_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(id: &str, score: f64) -> TrackedRow {
        TrackedRow {
            identifier: id.to_string(),
            score,
            percentile: 0.3,
        }
    }

    #[test]
    fn test_anchor_uses_dataset_entry() {
        let data = InitialData::from_entries([(
            "CVE-A".to_string(),
            InitialEntry {
                published: d("2025-09-03"),
                score: 0.02,
                percentile: 0.7,
            },
        )]);
        let anchor = data.anchor_for(&row("CVE-A", 0.5), d("2025-09-01"));
        assert_eq!(anchor, ScorePoint::new(d("2025-09-03"), 0.02, 0.7));
    }

    #[test]
    fn test_anchor_falls_back_to_row_score() {
        let data = InitialData::default();
        let anchor = data.anchor_for(&row("CVE-B", 0.5), d("2025-09-01"));
        assert_eq!(anchor, ScorePoint::new(d("2025-09-01"), 0.5, 0.3));
    }

    #[test]
    fn test_missing_lists_untracked_in_order() {
        let data = InitialData::from_entries([(
            "CVE-B".to_string(),
            InitialEntry {
                published: d("2025-09-03"),
                score: 0.02,
                percentile: 0.7,
            },
        )]);
        let rows = vec![row("CVE-C", 0.1), row("CVE-B", 0.1), row("CVE-A", 0.1)];
        assert_eq!(data.missing(&rows), vec!["CVE-C", "CVE-A"]);
    }
}
