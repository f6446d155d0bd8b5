use epss_tracker::config::Config;
use epss_tracker::data::{coverage_report, load_dataset, load_submission};
use std::env;
use std::path::PathBuf;

fn main() {
    let cfg = Config::from_env();
    let submission_path = env::args().nth(1).unwrap_or(cfg.submission_path);
    let dataset_path = env::args().nth(2).unwrap_or(cfg.dataset_path);

    let (rows, submission) = match load_submission(PathBuf::from(&submission_path).as_path()) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("submission load failed: {:#}", err);
            std::process::exit(1);
        }
    };
    let (initial, dataset) = match load_dataset(PathBuf::from(&dataset_path).as_path(), &rows) {
        Ok(v) => v,
        Err(err) => {
            eprintln!("dataset load failed: {:#}", err);
            std::process::exit(1);
        }
    };

    let payload = coverage_report(&submission, &dataset, &rows, &initial, cfg.fallback_anchor_date);
    match serde_json::to_string_pretty(&payload) {
        Ok(text) => println!("{}", text),
        Err(err) => {
            eprintln!("failed to serialize report: {}", err);
            std::process::exit(1);
        }
    }
}
