//! Run configuration
//!
//! Sources, lowest priority first:
//! 1. Hardcoded defaults
//! 2. Config file given explicitly, or named by the `VULOAD_CONFIG` env var
//!    (TOML, YAML or JSON by extension)
//! 3. Environment variables, e.g. `VULOAD__RETRY__MAX_ATTEMPTS=5`
//!
//! Durations use humantime syntax: `500ms`, `30s`, `5m`, `1m30s`.

use crate::backoff::Backoff;
use crate::error::ThresholdParseError;
use crate::stage::{Stage, StagePlan};
use crate::threshold::Threshold;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration of a load test run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    /// Scenario name, used in logs and the run report
    pub name: String,

    /// Fixed concurrency, used when `stages` is empty
    pub vus: u32,

    /// Fixed run length, used when `stages` is empty
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Ramp stages. Take precedence over `vus`/`duration`.
    #[serde(default)]
    pub stages: Vec<StageConfig>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "vuload".to_string(),
            vus: 1,
            duration: Duration::from_secs(30),
            stages: Vec::new(),
            retry: RetryConfig::default(),
            scheduler: SchedulerConfig::default(),
            http: HttpConfig::default(),
            thresholds: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Load from defaults, the file named by `VULOAD_CONFIG` (if any) and
    /// the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("VULOAD_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Like [`load`](Self::load) but with an explicit config file, which
    /// must exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Example: VULOAD__SCHEDULER__TICK_MS=50
        builder = builder.add_source(
            Environment::with_prefix("VULOAD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: RunConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(name = %config.name, plan = %config.stage_plan().description(), "configuration loaded");
        Ok(config)
    }

    /// Load from a single file on top of the defaults, ignoring the
    /// environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: RunConfig = Self::set_defaults(Config::builder())?
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("name", "vuload")?
            // Fixed plan
            .set_default("vus", 1)?
            .set_default("duration", "30s")?
            // Retry
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.base_delay_ms", 200)?
            // Scheduler
            .set_default("scheduler.tick_ms", 100)?
            .set_default("scheduler.progress_interval_secs", 10)?
            // HTTP
            .set_default("http.timeout_ms", 30_000)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Message("name must not be empty".to_string()));
        }

        self.stage_plan()
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }

        if self.scheduler.tick_ms == 0 {
            return Err(ConfigError::Message(
                "scheduler.tick_ms must be > 0".to_string(),
            ));
        }

        if self.scheduler.progress_interval_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.progress_interval_secs must be > 0".to_string(),
            ));
        }

        if self.http.timeout_ms == 0 {
            return Err(ConfigError::Message("http.timeout_ms must be > 0".to_string()));
        }

        self.thresholds()
            .map_err(|e| ConfigError::Message(format!("thresholds: {e}")))?;

        Ok(())
    }

    /// The stage plan this configuration describes.
    pub fn stage_plan(&self) -> StagePlan {
        if self.stages.is_empty() {
            return StagePlan::fixed(self.vus, self.duration);
        }
        StagePlan::new(
            self.stages
                .iter()
                .map(|s| Stage::new(s.duration, s.target))
                .collect(),
        )
    }

    pub fn backoff(&self) -> Backoff {
        self.retry.backoff()
    }

    /// Every declared threshold, parsed.
    pub fn thresholds(&self) -> Result<Vec<Threshold>, ThresholdParseError> {
        self.thresholds
            .iter()
            .flat_map(|t| t.conditions.iter().map(move |expr| Threshold::parse(&t.metric, expr)))
            .collect()
    }
}

/// One ramp stage as written in a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageConfig {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    pub target: u32,
}

/// Retry policy for transport failures
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum calls per request, including the first
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds; doubles each retry
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }
}

/// Virtual-user scheduler settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// How often the live VU count is reconciled with the plan
    pub tick_ms: u64,

    /// How often a progress line is logged
    pub progress_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            progress_interval_secs: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Conditions that must all hold for one metric
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    /// Metric key, optionally tagged: `http_req_duration{step=login}`
    pub metric: String,

    /// Expressions such as `p(95)<500` or `rate<0.01`
    pub conditions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_configuration() {
        let config = RunConfig::default();

        assert_eq!(config.name, "vuload");
        assert_eq!(config.vus, 1);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.scheduler.tick(), Duration::from_millis(100));
        assert_eq!(config.scheduler.progress_interval(), Duration::from_secs(10));
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compound_durations() {
        let file = write_config(
            ".toml",
            r#"
[[stages]]
duration = "1m30s"
target = 4

[[stages]]
duration = "500ms"
target = 0
"#,
        );

        let config = RunConfig::from_file(file.path()).unwrap();

        assert_eq!(config.stages[0].duration, Duration::from_secs(90));
        assert_eq!(config.stages[1].duration, Duration::from_millis(500));
        assert_eq!(config.stage_plan().total_duration(), Duration::from_millis(90_500));
    }

    #[test]
    fn test_bare_number_duration_is_rejected() {
        let file = write_config(".toml", "vus = 5\nduration = 30\n");
        assert!(RunConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_fixed_plan_when_no_stages() {
        let config = RunConfig {
            vus: 10,
            duration: Duration::from_secs(60),
            ..RunConfig::default()
        };

        assert_eq!(config.stage_plan(), StagePlan::fixed(10, Duration::from_secs(60)));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = RunConfig::default();

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 3;

        config.scheduler.tick_ms = 0;
        assert!(config.validate().is_err());
        config.scheduler.tick_ms = 100;

        config.duration = Duration::ZERO;
        assert!(config.validate().is_err());
        config.duration = Duration::from_secs(1);

        config.thresholds.push(ThresholdConfig {
            metric: "http_req_duration".to_string(),
            conditions: vec!["p(95)<<500".to_string()],
        });
        assert!(config.validate().is_err());
        config.thresholds[0].conditions = vec!["p(95)<500".to_string()];

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml_file() {
        let file = write_config(
            ".toml",
            r#"
name = "crud"

[retry]
max_attempts = 5
base_delay_ms = 50

[[stages]]
duration = "30s"
target = 10

[[stages]]
duration = "1m"
target = 10

[[stages]]
duration = "10s"
target = 0

[[thresholds]]
metric = "http_req_duration"
conditions = ["p(95)<500", "avg<300"]

[[thresholds]]
metric = "errors"
conditions = ["rate<0.01"]
"#,
        );

        let config = RunConfig::from_file(file.path()).unwrap();

        assert_eq!(config.name, "crud");
        assert_eq!(config.backoff(), Backoff::new(5, Duration::from_millis(50)));
        // Untouched sections keep their defaults.
        assert_eq!(config.scheduler.tick_ms, 100);

        let plan = config.stage_plan();
        assert_eq!(plan.stages().len(), 3);
        assert_eq!(plan.total_duration(), Duration::from_secs(100));
        assert_eq!(plan.max_target(), 10);

        let thresholds = config.thresholds().unwrap();
        assert_eq!(thresholds.len(), 3);
        assert_eq!(thresholds[2].metric.name(), "errors");
    }

    #[test]
    fn test_load_yaml_file_with_tagged_threshold() {
        let file = write_config(
            ".yaml",
            r#"
vus: 4
duration: 45s
thresholds:
  - metric: "http_req_duration{step=login}"
    conditions: ["p(99)<1000"]
"#,
        );

        let config = RunConfig::load_from(Some(file.path())).unwrap();

        assert_eq!(config.stage_plan(), StagePlan::fixed(4, Duration::from_secs(45)));
        let thresholds = config.thresholds().unwrap();
        assert_eq!(thresholds[0].metric.to_string(), "http_req_duration{step=login}");
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let file = write_config(".toml", "duration = \"forever\"\n");
        assert!(RunConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(RunConfig::load_from(Some(Path::new("/nonexistent/vuload.toml"))).is_err());
    }
}
