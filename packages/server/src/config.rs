use anyhow::{Context, Result};
use dotenvy::dotenv;
use scrape_engine::adapters::SelectorSourceConfig;
use scrape_engine::{OrchestratorConfig, RateLimitConfig, RetryPolicy};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// SQLite URL for jobs and exported records; in-memory storage when unset
    pub database_url: Option<String>,
    /// Directory the `json` exporter writes into
    pub export_dir: PathBuf,
    /// JSON file with selector-based source definitions
    pub sources_file: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = OrchestratorConfig::default();

        let rate_limit = RateLimitConfig {
            requests_per_minute: parse_var(&get, "RATE_LIMIT_PER_MINUTE")?
                .unwrap_or(defaults.rate_limit.requests_per_minute),
            burst: parse_var(&get, "RATE_LIMIT_BURST")?.unwrap_or(defaults.rate_limit.burst),
        };

        let retry = RetryPolicy::new(
            parse_var(&get, "RETRY_MAX_ATTEMPTS")?.unwrap_or(defaults.retry.max_attempts),
            millis(&get, "RETRY_BASE_DELAY_MS")?.unwrap_or(defaults.retry.base_delay),
            millis(&get, "RETRY_MAX_DELAY_MS")?.unwrap_or(defaults.retry.max_delay),
        );

        let orchestrator = OrchestratorConfig::new()
            .with_page_delay(millis(&get, "PAGE_DELAY_MS")?.unwrap_or(defaults.page_delay))
            .with_item_batch(
                parse_var(&get, "ITEM_BATCH_SIZE")?.unwrap_or(defaults.item_batch_size),
                millis(&get, "ITEM_BATCH_DELAY_MS")?.unwrap_or(defaults.item_batch_delay),
            )
            .with_job_timeout(parse_var::<u64>(&get, "JOB_TIMEOUT_SECS")?.map(Duration::from_secs))
            .with_retry(retry)
            .with_rate_limit(rate_limit);

        Ok(Self {
            port: parse_var(&get, "PORT")?.unwrap_or(8080),
            database_url: get("DATABASE_URL").filter(|url| !url.is_empty()),
            export_dir: get("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./exports")),
            sources_file: get("SOURCES_FILE").map(PathBuf::from),
            orchestrator,
        })
    }
}

/// Read selector source definitions from a JSON array file.
pub fn load_sources(path: &Path) -> Result<Vec<SelectorSourceConfig>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sources file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("Failed to parse sources file {}", path.display()))
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("{} must be a valid number", key))
        })
        .transpose()
}

fn millis(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse_var::<u64>(get, key)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.orchestrator.retry.max_attempts, 3);
        assert_eq!(config.orchestrator.page_delay, Duration::from_secs(2));
        assert_eq!(config.orchestrator.job_timeout, None);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "sqlite://jobs.db"),
            ("RATE_LIMIT_PER_MINUTE", "30"),
            ("ITEM_BATCH_SIZE", "5"),
            ("PAGE_DELAY_MS", "250"),
            ("RETRY_BASE_DELAY_MS", "500"),
            ("JOB_TIMEOUT_SECS", "600"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("sqlite://jobs.db"));
        assert_eq!(config.orchestrator.rate_limit.requests_per_minute, 30);
        assert_eq!(config.orchestrator.item_batch_size, 5);
        assert_eq!(config.orchestrator.page_delay, Duration::from_millis(250));
        assert_eq!(config.orchestrator.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.orchestrator.job_timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_load_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"[{"id": "homes", "itemSelector": "li.result", "totalPagesSelector": ".pager a"}]"#,
        )
        .unwrap();

        let sources = load_sources(&path).unwrap();

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, "homes");
        assert_eq!(sources[0].total_pages_selector.as_deref(), Some(".pager a"));
    }
}
