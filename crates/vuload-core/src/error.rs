use thiserror::Error;

/// Canonical error type for load-test operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The precondition state required before load generation could not be
    /// established. The run does not start.
    #[error("setup failed: {message}")]
    Setup {
        /// Human-readable reason, usually the failing setup step.
        message: String,
    },

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The stage plan violates its invariants.
    #[error("invalid stage plan: {message}")]
    InvalidPlan {
        /// Human-readable explanation.
        message: String,
    },

    /// A metric name is already registered with a different kind.
    #[error("metric `{name}` is a {existing}, not a {requested}")]
    MetricKindMismatch {
        /// Metric name.
        name: String,
        /// Kind the metric was first created with.
        existing: &'static str,
        /// Kind requested by the caller.
        requested: &'static str,
    },

    /// A threshold declaration could not be parsed.
    #[error("invalid threshold: {0}")]
    Threshold(#[from] ThresholdParseError),

    /// An HTTP request could not be built.
    #[error("request error: {0}")]
    Request(String),

    /// A response body could not be read as expected.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A single scenario iteration failed. Local to the iteration.
    #[error("iteration failed: {0}")]
    Iteration(String),
}

impl LoadError {
    /// Creates a `Setup` variant.
    #[must_use]
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Creates an `InvalidPlan` variant.
    #[must_use]
    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Self::InvalidPlan {
            message: message.into(),
        }
    }
}

/// Failure to extract a typed value from a loosely-typed response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Body is empty or not valid JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),

    /// No value exists at the requested path.
    #[error("path `{path}` not found")]
    PathNotFound {
        /// Dotted path that was requested.
        path: String,
    },

    /// A value exists at the path but has another type.
    #[error("path `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        /// Dotted path that was requested.
        path: String,
        /// Type the caller asked for.
        expected: &'static str,
        /// Type actually present.
        found: &'static str,
    },
}

/// Malformed threshold expression or metric key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdParseError {
    #[error("empty threshold expression")]
    Empty,

    #[error("`{0}`: missing comparison operator")]
    MissingOperator(String),

    #[error("`{0}`: unknown aggregation")]
    UnknownAggregation(String),

    #[error("`{0}`: percentile must be within 0..=100")]
    InvalidPercentile(String),

    #[error("`{0}`: bound is not a number")]
    InvalidBound(String),

    #[error("`{0}`: malformed metric key")]
    InvalidMetricKey(String),
}

/// Convenient result alias for load-test operations.
pub type LoadResult<T> = Result<T, LoadError>;
