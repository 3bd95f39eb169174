//! Pass/fail thresholds evaluated once against the final metrics
//!
//! Expressions use the familiar `aggregation operator bound` form:
//!
//! | Expression     | Applies to      | Aggregated value           |
//! |----------------|-----------------|----------------------------|
//! | `p(95)<500`    | trend           | 95th percentile            |
//! | `avg<300`      | trend           | mean                       |
//! | `med<250`      | trend           | median                     |
//! | `min>0`        | trend           | smallest sample            |
//! | `max<2000`     | trend           | largest sample             |
//! | `rate<0.05`    | rate            | fraction of `true` samples |
//! | `count>100`    | counter / trend | sum / number of samples    |
//!
//! Operators: `<`, `<=`, `>`, `>=`.

use crate::error::ThresholdParseError;
use crate::metrics::{MetricKey, MetricValue, MetricsSnapshot};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// What is computed from the metric before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Percentile(f64),
    Avg,
    Med,
    Min,
    Max,
    Rate,
    Count,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percentile(p) => write!(f, "p({p})"),
            Self::Avg => f.write_str("avg"),
            Self::Med => f.write_str("med"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    fn holds(&self, actual: f64, bound: f64) -> bool {
        match self {
            Self::Lt => actual < bound,
            Self::Le => actual <= bound,
            Self::Gt => actual > bound,
            Self::Ge => actual >= bound,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Parsed `aggregation operator bound` predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdExpr {
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub bound: f64,
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.aggregation, self.comparison.as_str(), self.bound)
    }
}

impl FromStr for ThresholdExpr {
    type Err = ThresholdParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let expr: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if expr.is_empty() {
            return Err(ThresholdParseError::Empty);
        }

        // Two-character operators first so `<=` is not read as `<`.
        let (position, comparison, width) = [
            ("<=", Comparison::Le),
            (">=", Comparison::Ge),
            ("<", Comparison::Lt),
            (">", Comparison::Gt),
        ]
        .iter()
        .find_map(|(op, cmp)| expr.find(op).map(|pos| (pos, *cmp, op.len())))
        .ok_or_else(|| ThresholdParseError::MissingOperator(raw.to_string()))?;

        let lhs = &expr[..position];
        let rhs = &expr[position + width..];

        let aggregation = parse_aggregation(lhs, raw)?;
        let bound = rhs
            .parse::<f64>()
            .ok()
            .filter(|b| b.is_finite())
            .ok_or_else(|| ThresholdParseError::InvalidBound(raw.to_string()))?;

        Ok(Self {
            aggregation,
            comparison,
            bound,
        })
    }
}

fn parse_aggregation(lhs: &str, raw: &str) -> Result<Aggregation, ThresholdParseError> {
    match lhs {
        "avg" => Ok(Aggregation::Avg),
        "med" => Ok(Aggregation::Med),
        "min" => Ok(Aggregation::Min),
        "max" => Ok(Aggregation::Max),
        "rate" => Ok(Aggregation::Rate),
        "count" => Ok(Aggregation::Count),
        _ => {
            let inner = lhs
                .strip_prefix("p(")
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| ThresholdParseError::UnknownAggregation(raw.to_string()))?;
            let p = inner
                .parse::<f64>()
                .ok()
                .filter(|p| (0.0..=100.0).contains(p))
                .ok_or_else(|| ThresholdParseError::InvalidPercentile(raw.to_string()))?;
            Ok(Aggregation::Percentile(p))
        }
    }
}

/// A predicate bound to a metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Threshold {
    pub metric: MetricKey,
    pub expr: ThresholdExpr,
}

impl Threshold {
    pub fn new(metric: MetricKey, expr: ThresholdExpr) -> Self {
        Self { metric, expr }
    }

    /// Parse from a metric key and an expression, e.g.
    /// `("http_req_duration{step=login}", "p(95)<500")`.
    pub fn parse(metric: &str, expr: &str) -> Result<Self, ThresholdParseError> {
        Ok(Self {
            metric: metric.parse()?,
            expr: expr.parse()?,
        })
    }

    /// Evaluate against a final snapshot.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let outcome = snapshot
            .get(&self.metric)
            .ok_or_else(|| "metric was never recorded".to_string())
            .and_then(|value| aggregate(value, self.expr.aggregation));

        let (actual, passed, reason) = match outcome {
            Ok(actual) => (
                Some(actual),
                self.expr.comparison.holds(actual, self.expr.bound),
                None,
            ),
            Err(reason) => (None, false, Some(reason)),
        };

        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expr.to_string(),
            bound: self.expr.bound,
            actual,
            passed,
            reason,
        }
    }
}

/// Aggregated value of `value` or a reason it cannot be computed.
fn aggregate(value: &MetricValue, aggregation: Aggregation) -> Result<f64, String> {
    let not_applicable = || format!("{aggregation} does not apply to a {}", value.kind());

    match (value, aggregation) {
        (MetricValue::Counter { value }, Aggregation::Count) => Ok(*value),
        (MetricValue::Rate(rate), Aggregation::Rate) => {
            if rate.total() == 0 {
                return Err("no samples".to_string());
            }
            Ok(rate.rate)
        }
        (MetricValue::Trend(trend), aggregation) => {
            if aggregation == Aggregation::Count {
                return Ok(trend.count as f64);
            }
            if trend.count == 0 {
                return Err("no samples".to_string());
            }
            match aggregation {
                Aggregation::Percentile(p) => trend.percentile(p).ok_or_else(not_applicable),
                Aggregation::Avg => Ok(trend.avg),
                Aggregation::Med => Ok(trend.med),
                Aggregation::Min => Ok(trend.min),
                Aggregation::Max => Ok(trend.max),
                Aggregation::Rate | Aggregation::Count => Err(not_applicable()),
            }
        }
        _ => Err(not_applicable()),
    }
}

/// Outcome of one threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: MetricKey,
    pub expression: String,
    /// Expected bound from the expression.
    pub bound: f64,
    /// Observed aggregate; `None` when it could not be computed.
    pub actual: Option<f64>,
    pub passed: bool,
    /// Why `actual` is missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl fmt::Display for ThresholdResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "ok" } else { "FAILED" };
        match (self.actual, &self.reason) {
            (Some(actual), _) => write!(
                f,
                "{} {}: {} (actual {:.4})",
                self.metric, self.expression, status, actual
            ),
            (None, Some(reason)) => {
                write!(f, "{} {}: {} ({})", self.metric, self.expression, status, reason)
            }
            (None, None) => write!(f, "{} {}: {}", self.metric, self.expression, status),
        }
    }
}

/// All threshold outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThresholdReport {
    pub passed: bool,
    pub results: Vec<ThresholdResult>,
}

impl ThresholdReport {
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Evaluate every threshold. Never short-circuits.
pub fn evaluate(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> ThresholdReport {
    let results: Vec<ThresholdResult> = thresholds.iter().map(|t| t.evaluate(snapshot)).collect();
    ThresholdReport {
        passed: results.iter().all(|r| r.passed),
        results,
    }
}
