//! Load generation engine: staged virtual users, retries with backoff,
//! metrics with thresholds and semantic record validation.

pub mod backoff;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod scenario;
pub mod scheduler;
pub mod stage;
pub mod threshold;
pub mod validator;
pub mod value;

pub use backoff::{Backoff, RetryOutcome, Transient};
pub use config::{HttpConfig, RetryConfig, RunConfig, SchedulerConfig, StageConfig, ThresholdConfig};
pub use error::{LoadError, LoadResult, ParseError, ThresholdParseError};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method};
pub use metrics::{Counter, MetricKey, MetricKind, MetricValue, MetricsRegistry, MetricsSnapshot, Rate, Trend};
pub use orchestrator::LoadTest;
pub use report::RunReport;
pub use scenario::{IterationReport, Step, StepOutcome, StepScenario};
pub use scheduler::{FnScenario, Scenario, ScheduleSummary, Scheduler, VuContext, VuSample};
pub use stage::{Stage, StagePlan};
pub use threshold::{Threshold, ThresholdReport, ThresholdResult};
pub use validator::{NormalizedValue, Record};
pub use value::JsonPath;
