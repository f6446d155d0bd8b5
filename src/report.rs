use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::Write;

use crate::delta::{DeltaRecord, DeltaSummary};
use crate::logging::{log, obj, Domain, Level};
use crate::series::{ScorePoint, StepSeries};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierSeries {
    pub identifier: String,
    pub anchor: ScorePoint,
    pub points: StepSeries,
}

/// Everything one render pass produces. Plain data, no presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub group: String,
    pub generated_at: String,
    pub today: NaiveDate,
    pub series: Vec<IdentifierSeries>,
    pub deltas: Vec<DeltaRecord>,
    pub summary: DeltaSummary,
}

impl Dashboard {
    pub fn series_for(&self, identifier: &str) -> Option<&IdentifierSeries> {
        self.series.iter().find(|s| s.identifier == identifier)
    }

    pub fn delta_for(&self, identifier: &str) -> Option<&DeltaRecord> {
        self.deltas.iter().find(|d| d.identifier == identifier)
    }
}

/// Consumer of finished dashboards (chart, table, file...).
pub trait RenderSurface {
    fn render(&mut self, dashboard: &Dashboard) -> Result<()>;
}

/// Writes each dashboard as one JSON line.
pub struct JsonSurface<W: Write> {
    out: W,
    rendered: u64,
}

impl<W: Write> JsonSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out, rendered: 0 }
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSurface for JsonSurface<W> {
    fn render(&mut self, dashboard: &Dashboard) -> Result<()> {
        serde_json::to_writer(&mut self.out, dashboard).context("serializing dashboard")?;
        writeln!(self.out)?;
        self.out.flush()?;
        self.rendered += 1;
        log(
            Level::Debug,
            Domain::Render,
            "rendered",
            obj(&[
                ("series", json!(dashboard.series.len())),
                ("rows", json!(dashboard.deltas.len())),
            ]),
        );
        Ok(())
    }
}
