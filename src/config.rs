use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub http_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub fetch_concurrency: usize,
    pub submission_path: String,
    pub dataset_path: String,
    /// Anchor date for identifiers missing from the initial dataset
    pub fallback_anchor_date: NaiveDate,
    /// `as_of_date` for identifiers the live feed returned nothing for
    pub fallback_as_of_date: NaiveDate,
    pub group_name: String,
    /// 0 runs a single pass
    pub refresh_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://api.first.org/data/v1/epss".to_string(),
            http_timeout_secs: 15,
            cache_ttl_secs: 3600,
            fetch_concurrency: 4,
            submission_path: "data/submission.csv".to_string(),
            dataset_path: "data/vuln_2025_09.csv".to_string(),
            fallback_anchor_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap_or_default(),
            fallback_as_of_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default(),
            group_name: "EPSS Tracker".to_string(),
            refresh_secs: 0,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values keep the default.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        Self {
            api_base: get("EPSS_API_BASE").unwrap_or(d.api_base),
            http_timeout_secs: get("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()).unwrap_or(d.http_timeout_secs),
            cache_ttl_secs: get("CACHE_TTL_SECS").and_then(|v| v.parse().ok()).unwrap_or(d.cache_ttl_secs),
            fetch_concurrency: get("FETCH_CONCURRENCY").and_then(|v| v.parse().ok()).unwrap_or(d.fetch_concurrency).max(1),
            submission_path: get("SUBMISSION_CSV").unwrap_or(d.submission_path),
            dataset_path: get("DATASET_CSV").unwrap_or(d.dataset_path),
            fallback_anchor_date: get("FALLBACK_ANCHOR_DATE").and_then(|v| parse_date(&v)).unwrap_or(d.fallback_anchor_date),
            fallback_as_of_date: get("FALLBACK_AS_OF_DATE").and_then(|v| parse_date(&v)).unwrap_or(d.fallback_as_of_date),
            group_name: get("GROUP_NAME").unwrap_or(d.group_name),
            refresh_secs: get("REFRESH_SECS").and_then(|v| v.parse().ok()).unwrap_or(d.refresh_secs),
        }
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or timestamp string.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.fallback_anchor_date.to_string(), "2025-09-01");
        assert_eq!(cfg.fallback_as_of_date.to_string(), "2025-10-01");
        assert_eq!(cfg.cache_ttl_secs, 3600);
        assert!(cfg.fetch_concurrency >= 1);
    }

    #[test]
    fn test_parse_date_accepts_timestamps() {
        let expected = NaiveDate::from_ymd_opt(2025, 9, 3).unwrap();
        assert_eq!(parse_date("2025-09-03"), Some(expected));
        assert_eq!(parse_date("2025-09-03T14:15:07.123"), Some(expected));
        assert_eq!(parse_date(" 2025-09-03 00:00:00 "), Some(expected));
        assert_eq!(parse_date("09/03/2025"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_lookup_overrides() {
        let cfg = from_pairs(&[
            ("EPSS_API_BASE", "http://localhost:9000/epss"),
            ("HTTP_TIMEOUT_SECS", "3"),
            ("CACHE_TTL_SECS", "60"),
            ("FETCH_CONCURRENCY", "8"),
            ("SUBMISSION_CSV", "/tmp/sub.csv"),
            ("DATASET_CSV", "/tmp/data.csv"),
            ("FALLBACK_ANCHOR_DATE", "2025-08-15T00:00:00"),
            ("FALLBACK_AS_OF_DATE", "2025-10-05"),
            ("GROUP_NAME", "Team 7"),
            ("REFRESH_SECS", "300"),
        ]);
        assert_eq!(cfg.api_base, "http://localhost:9000/epss");
        assert_eq!(cfg.http_timeout_secs, 3);
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert_eq!(cfg.fetch_concurrency, 8);
        assert_eq!(cfg.submission_path, "/tmp/sub.csv");
        assert_eq!(cfg.dataset_path, "/tmp/data.csv");
        assert_eq!(cfg.fallback_anchor_date.to_string(), "2025-08-15");
        assert_eq!(cfg.fallback_as_of_date.to_string(), "2025-10-05");
        assert_eq!(cfg.group_name, "Team 7");
        assert_eq!(cfg.refresh_secs, 300);
    }

    #[test]
    fn test_lookup_invalid_values_keep_defaults() {
        let cfg = from_pairs(&[
            ("HTTP_TIMEOUT_SECS", "soon"),
            ("CACHE_TTL_SECS", "-1"),
            ("FALLBACK_ANCHOR_DATE", "09/01/2025"),
            ("REFRESH_SECS", ""),
        ]);
        let d = Config::default();
        assert_eq!(cfg.http_timeout_secs, d.http_timeout_secs);
        assert_eq!(cfg.cache_ttl_secs, d.cache_ttl_secs);
        assert_eq!(cfg.fallback_anchor_date, d.fallback_anchor_date);
        assert_eq!(cfg.refresh_secs, 0);
        assert_eq!(cfg.api_base, d.api_base);
    }

    #[test]
    fn test_zero_fetch_concurrency_clamps_to_one() {
        assert_eq!(from_pairs(&[("FETCH_CONCURRENCY", "0")]).fetch_concurrency, 1);
        assert_eq!(from_pairs(&[("FETCH_CONCURRENCY", "x")]).fetch_concurrency, 4);
    }
}
