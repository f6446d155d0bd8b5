use anyhow::Result;
use chrono::Utc;
use epss_tracker::config::Config;
use epss_tracker::feed::epss_api::EpssClient;
use epss_tracker::logging::{log, log_source_warnings, obj, v_str, Domain, Level};
use epss_tracker::report::{JsonSurface, RenderSurface};
use epss_tracker::tracker::Tracker;
use serde_json::json;
use tokio::time::{sleep, Duration};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("submission", v_str(&cfg.submission_path)),
            ("dataset", v_str(&cfg.dataset_path)),
            ("refresh_secs", json!(cfg.refresh_secs)),
        ]),
    );

    let feed = EpssClient::new(&cfg)?;
    let mut tracker = Tracker::load(cfg.clone())?;
    for (kind, manifest) in ["submission", "dataset"].iter().zip(tracker.manifests()) {
        log_source_warnings(kind, &manifest.path, &manifest.warnings);
    }
    let mut surface = JsonSurface::new(std::io::stdout());

    loop {
        let dashboard = tracker.refresh(&feed, Utc::now()).await;
        surface.render(&dashboard)?;

        if cfg.refresh_secs == 0 {
            break;
        }
        sleep(Duration::from_secs(cfg.refresh_secs)).await;
    }

    log(
        Level::Info,
        Domain::System,
        "shutdown",
        obj(&[("passes", json!(tracker.passes()))]),
    );
    Ok(())
}
