use crate::error::{Result, TrainingError};
use crate::services::preprocess::ActivityFilter;
use crate::services::strategies::window_start;
use crate::services::writer::WriterConfig;
use chrono::{DateTime, Utc};
use resilience::RetryConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "REC_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Popularity,
    #[default]
    CollaborativeFiltering,
    SemanticSimilarity,
}

/// Training job configuration, read from `REC_`-prefixed environment
/// variables (e.g. `REC_HALF_LIFE_DAYS=14`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_site")]
    pub site: String,
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Recency half-life in days; `inf` disables decay
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    #[serde(default = "default_max_recs")]
    pub max_recs: usize,
    /// KNN rows per chunk
    #[serde(default = "default_knn_batch_size")]
    pub knn_batch_size: usize,

    #[serde(default = "default_popularity_window_days")]
    pub popularity_window_days: i64,
    /// Passed through to the upstream article fetch
    #[serde(default = "default_max_article_age_years")]
    pub max_article_age_years: u32,
    #[serde(default = "default_popular_interaction_limit")]
    pub popular_interaction_limit: usize,

    #[serde(default = "default_max_activity_minutes")]
    pub max_activity_minutes: f64,
    #[serde(default = "default_min_dwell_minutes")]
    pub min_dwell_minutes: f64,

    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    #[serde(default = "default_write_max_retries")]
    pub write_max_retries: u32,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// RFC 3339; defaults to the time the job starts
    #[serde(default)]
    pub execution_timestamp: Option<DateTime<Utc>>,

    #[serde(default = "default_events_path")]
    pub events_path: PathBuf,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub embeddings_path: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub dwell_matrix_path: Option<PathBuf>,
    /// Keep recommendations in memory instead of writing files
    #[serde(default)]
    pub dry_run: bool,
}

fn default_site() -> String {
    "default".to_string()
}
fn default_half_life_days() -> f64 {
    10.0
}
fn default_max_recs() -> usize {
    20
}
fn default_knn_batch_size() -> usize {
    2000
}
fn default_popularity_window_days() -> i64 {
    7
}
fn default_max_article_age_years() -> u32 {
    2
}
fn default_popular_interaction_limit() -> usize {
    5000
}
fn default_max_activity_minutes() -> f64 {
    10.0
}
fn default_min_dwell_minutes() -> f64 {
    1.0
}
fn default_write_batch_size() -> usize {
    50
}
fn default_write_max_retries() -> u32 {
    3
}
fn default_write_timeout_secs() -> u64 {
    30
}
fn default_events_path() -> PathBuf {
    PathBuf::from("data/events.ndjson")
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/catalog.ndjson")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: default_site(),
            strategy: StrategyKind::default(),
            half_life_days: default_half_life_days(),
            max_recs: default_max_recs(),
            knn_batch_size: default_knn_batch_size(),
            popularity_window_days: default_popularity_window_days(),
            max_article_age_years: default_max_article_age_years(),
            popular_interaction_limit: default_popular_interaction_limit(),
            max_activity_minutes: default_max_activity_minutes(),
            min_dwell_minutes: default_min_dwell_minutes(),
            write_batch_size: default_write_batch_size(),
            write_max_retries: default_write_max_retries(),
            write_timeout_secs: default_write_timeout_secs(),
            execution_timestamp: None,
            events_path: default_events_path(),
            catalog_path: default_catalog_path(),
            embeddings_path: None,
            output_dir: default_output_dir(),
            dwell_matrix_path: None,
            dry_run: false,
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: Config = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Same as [`from_env`](Self::from_env) over explicit `(KEY, value)` pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.half_life_days.is_nan() || self.half_life_days <= 0.0 {
            return Err(TrainingError::Config(format!(
                "half_life_days must be positive (or inf), got {}",
                self.half_life_days
            )));
        }
        if self.max_recs == 0 {
            return Err(TrainingError::Config("max_recs must be at least 1".to_string()));
        }
        if self.knn_batch_size == 0 {
            return Err(TrainingError::Config(
                "knn_batch_size must be at least 1".to_string(),
            ));
        }
        if self.write_batch_size == 0 {
            return Err(TrainingError::Config(
                "write_batch_size must be at least 1".to_string(),
            ));
        }
        if self.popularity_window_days < 0 {
            return Err(TrainingError::Config(
                "popularity_window_days must not be negative".to_string(),
            ));
        }
        if window_start(self.reference_time(), self.popularity_window_days).is_err() {
            return Err(TrainingError::Config(format!(
                "popularity_window_days of {} reaches past the earliest representable date",
                self.popularity_window_days
            )));
        }
        if self.strategy != StrategyKind::Popularity && self.embeddings_path.is_none() {
            return Err(TrainingError::Config(format!(
                "{:?} needs REC_EMBEDDINGS_PATH",
                self.strategy
            )));
        }
        Ok(())
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.execution_timestamp.unwrap_or_else(Utc::now)
    }

    pub fn activity_filter(&self) -> ActivityFilter {
        ActivityFilter {
            max_activity_minutes: self.max_activity_minutes,
            min_dwell_minutes: self.min_dwell_minutes,
        }
    }

    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.write_batch_size,
            retry: RetryConfig::with_max_retries(self.write_max_retries),
            timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[("REC_EMBEDDINGS_PATH", "emb.json")])).unwrap();
        assert_eq!(config.strategy, StrategyKind::CollaborativeFiltering);
        assert_eq!(config.half_life_days, 10.0);
        assert_eq!(config.max_recs, 20);
        assert_eq!(config.knn_batch_size, 2000);
        assert_eq!(config.write_batch_size, 50);
        assert_eq!(config.popularity_window_days, 7);
        assert_eq!(config.max_article_age_years, 2);
        assert_eq!(config.embeddings_path, Some(PathBuf::from("emb.json")));
        assert!(config.execution_timestamp.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_vars(vars(&[
            ("REC_SITE", "texas-tribune"),
            ("REC_STRATEGY", "popularity"),
            ("REC_HALF_LIFE_DAYS", "inf"),
            ("REC_MAX_RECS", "5"),
            ("REC_EXECUTION_TIMESTAMP", "2021-09-01T06:00:00Z"),
            ("REC_WRITE_TIMEOUT_SECS", "3"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();

        assert_eq!(config.site, "texas-tribune");
        assert_eq!(config.strategy, StrategyKind::Popularity);
        assert!(config.half_life_days.is_infinite());
        assert_eq!(config.max_recs, 5);
        assert_eq!(
            config.reference_time(),
            Utc.with_ymd_and_hms(2021, 9, 1, 6, 0, 0).unwrap()
        );
        assert_eq!(config.writer_config().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_validation_failures() {
        for bad in [
            vec![("REC_STRATEGY", "popularity"), ("REC_HALF_LIFE_DAYS", "0")],
            vec![("REC_STRATEGY", "popularity"), ("REC_HALF_LIFE_DAYS", "NaN")],
            vec![("REC_STRATEGY", "popularity"), ("REC_MAX_RECS", "0")],
            vec![("REC_STRATEGY", "popularity"), ("REC_KNN_BATCH_SIZE", "0")],
            vec![("REC_STRATEGY", "popularity"), ("REC_WRITE_BATCH_SIZE", "0")],
            vec![("REC_STRATEGY", "semantic_similarity")],
            vec![("REC_STRATEGY", "popularity"), ("REC_POPULARITY_WINDOW_DAYS", "-1")],
            vec![
                ("REC_STRATEGY", "popularity"),
                ("REC_POPULARITY_WINDOW_DAYS", "1000000000000000"),
            ],
            vec![
                ("REC_STRATEGY", "popularity"),
                ("REC_POPULARITY_WINDOW_DAYS", "1000000000000"),
            ],
        ] {
            let result = Config::from_vars(vars(&bad));
            assert!(
                matches!(result, Err(TrainingError::Config(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_unparseable_value_is_config_error() {
        let result = Config::from_vars(vars(&[("REC_MAX_RECS", "many")]));
        assert!(matches!(result, Err(TrainingError::Config(_))));
    }

    #[test]
    fn test_writer_config_maps_retries() {
        let config = Config {
            write_max_retries: 5,
            write_batch_size: 7,
            ..Config::default()
        };
        let writer = config.writer_config();
        assert_eq!(writer.batch_size, 7);
        assert_eq!(writer.retry.max_retries, 5);
    }
}
