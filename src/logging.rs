//! Structured JSON-lines logging.
//!
//! Every record carries a run id, a monotonically increasing sequence number,
//! a level and a domain so a pass can be filtered and replayed from the log
//! alone. Records go to stderr (stdout is reserved for the rendered
//! dashboard) and to per-run files under `LOG_DIR/<run_id>/`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Data,    // CSV loading, anchor resolution
    Fetch,   // EPSS API requests
    Cache,   // Fetch cache hits, misses, purges
    Series,  // Step series reconstruction
    Render,  // Dashboard output
    System,  // Startup, shutdown, pass summaries
    Profile, // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Data => "data",
            Domain::Fetch => "fetch",
            Domain::Cache => "cache",
            Domain::Series => "series",
            Domain::Render => "render",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static PROFILE_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        if base.is_empty() || base == "none" {
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        }

        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
            return RunContext {
                run_id,
                events: None,
                trace: None,
            };
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["identifier", "pass", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    eprintln!("{}", line);
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_source_loaded(kind: &str, path: &str, rows: u64, bad_rows: u64, hash: &str) {
    log(
        Level::Info,
        Domain::Data,
        "source_loaded",
        obj(&[
            ("kind", v_str(kind)),
            ("path", v_str(path)),
            ("rows", json!(rows)),
            ("bad_rows", json!(bad_rows)),
            ("hash_sha256", v_str(hash)),
        ]),
    );
}

/// One warning record per rejected row of a loaded source.
pub fn log_source_warnings(kind: &str, path: &str, warnings: &[String]) {
    for warning in warnings {
        log(
            Level::Warn,
            Domain::Data,
            "bad_row",
            obj(&[
                ("kind", v_str(kind)),
                ("path", v_str(path)),
                ("detail", v_str(warning)),
            ]),
        );
    }
}

pub fn log_missing_anchor(identifier: &str, fallback_date: &str) {
    log(
        Level::Debug,
        Domain::Data,
        "missing_anchor",
        obj(&[
            ("identifier", v_str(identifier)),
            ("fallback_date", v_str(fallback_date)),
        ]),
    );
}

pub fn log_fetch_failure(operation: &str, identifier: Option<&str>, error: &str) {
    log(
        Level::Warn,
        Domain::Fetch,
        "fetch_failed",
        obj(&[
            ("operation", v_str(operation)),
            ("identifier", identifier.map(v_str).unwrap_or(Value::Null)),
            ("error", v_str(error)),
        ]),
    );
}

pub fn log_cache_lookup(operation: &str, hits: usize, misses: usize) {
    log(
        Level::Debug,
        Domain::Cache,
        "lookup",
        obj(&[
            ("operation", v_str(operation)),
            ("hits", json!(hits)),
            ("misses", json!(misses)),
        ]),
    );
}

pub fn log_series_built(identifier: &str, observations: usize, points: usize, flat: bool) {
    log(
        Level::Trace,
        Domain::Series,
        "series_built",
        obj(&[
            ("identifier", v_str(identifier)),
            ("observations", json!(observations)),
            ("points", json!(points)),
            ("flat", json!(flat)),
        ]),
    );
}

pub fn log_pass_summary(
    pass: u64,
    total: usize,
    increased: usize,
    decreased: usize,
    unchanged: usize,
    with_history: usize,
) {
    log(
        Level::Info,
        Domain::System,
        "pass_summary",
        obj(&[
            ("pass", json!(pass)),
            ("total", json!(total)),
            ("increased", json!(increased)),
            ("decreased", json!(decreased)),
            ("unchanged", json!(unchanged)),
            ("with_history", json!(with_history)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
    enabled: bool,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        let enabled = profile_sampled();
        Self {
            label,
            context: if enabled { Some(obj(fields)) } else { None },
            started: Instant::now(),
            enabled,
        }
    }
}

/// `PROFILE_SAMPLE` in [0,1]; unset samples every scope.
fn profile_sampled() -> bool {
    let rate = match std::env::var("PROFILE_SAMPLE").ok().and_then(|v| v.parse::<f64>().ok()) {
        Some(rate) => rate,
        None => return true,
    };
    if rate >= 1.0 {
        return true;
    }
    let seq = PROFILE_SEQ.fetch_add(1, Ordering::SeqCst);
    rate > 0.0 && ((seq % 10_000) as f64 / 10_000.0) < rate
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}
