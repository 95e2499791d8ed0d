use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::path::Path;

use crate::window::ReportWindow;

/// Tag bucket used for executions that carry no tag.
pub const NO_TAG: &str = "no_tag";

const REPORT_SCHEMA: &str = include_str!("../report_schema.json");

/// A metric value as the execution source reported it.
///
/// Integers stay integers while they fit in an `i64`; any float operand
/// turns the sum into a float.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    /// Reads a JSON number; anything else is not a metric.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let serde_json::Value::Number(number) = value else {
            return None;
        };
        number
            .as_i64()
            .map(MetricValue::Int)
            .or_else(|| number.as_f64().map(MetricValue::Float))
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Int(i) => i as f64,
            MetricValue::Float(f) => f,
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::Int(0)
    }
}

impl Add for MetricValue {
    type Output = MetricValue;

    fn add(self, rhs: MetricValue) -> MetricValue {
        match (self, rhs) {
            (MetricValue::Int(a), MetricValue::Int(b)) => a
                .checked_add(b)
                .map(MetricValue::Int)
                .unwrap_or(MetricValue::Float(a as f64 + b as f64)),
            (a, b) => MetricValue::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl AddAssign for MetricValue {
    fn add_assign(&mut self, rhs: MetricValue) {
        *self = *self + rhs;
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Int(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

/// Summed metrics keyed by metric name, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsMap(IndexMap<String, MetricValue>);

impl StatsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to `metric`, starting from zero when the metric is new.
    pub fn add(&mut self, metric: &str, value: MetricValue) {
        match self.0.get_mut(metric) {
            Some(sum) => *sum += value,
            None => {
                self.0.insert(metric.to_string(), value);
            }
        }
    }

    /// Adds every metric of `other` into `self`.
    pub fn merge(&mut self, other: &StatsMap) {
        for (metric, value) in other.iter() {
            self.add(metric, *value);
        }
    }

    pub fn get(&self, metric: &str) -> Option<MetricValue> {
        self.0.get(metric).copied()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, MetricValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<MetricValue>> FromIterator<(K, V)> for StatsMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut stats = StatsMap::new();
        for (metric, value) in iter {
            stats.add(&metric.into(), value.into());
        }
        stats
    }
}

/// Summed metrics plus the number of executions that contributed to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterBucket {
    pub stats: StatsMap,
    pub executions_count: u64,
}

impl CounterBucket {
    /// Adds one execution's metrics.
    pub fn record(&mut self, stats: &StatsMap) {
        self.stats.merge(stats);
        self.executions_count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerReport {
    /// Human-readable name from the registry, absent when it has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    pub stats: StatsMap,
    pub executions_total: u64,
    /// Lowercased execution status -> count
    pub executions_by_status: IndexMap<String, u64>,
    pub by_tag: IndexMap<String, CounterBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub window: ReportWindow,
    pub totals: CounterBucket,
    pub crawlers_count: usize,
    /// Crawler id -> report, only crawlers with in-window executions
    pub crawlers: IndexMap<String, CrawlerReport>,
}

impl AggregateReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report")
    }

    /// Validate report JSON against the bundled JSON schema
    pub fn validate_with_schema(
        report_json: &serde_json::Value,
        schema: &JSONSchema,
    ) -> Result<()> {
        match schema.validate(report_json) {
            Ok(_) => Ok(()),
            Err(errors) => {
                let error_messages: Vec<String> = errors
                    .map(|e| format!("  - {}: {}", e.instance_path, e))
                    .collect();
                bail!("Report validation failed:\n{}", error_messages.join("\n"))
            }
        }
    }

    /// Compile the bundled JSON schema
    pub fn load_schema() -> Result<JSONSchema> {
        let schema_json: serde_json::Value =
            serde_json::from_str(REPORT_SCHEMA).context("Failed to parse report schema")?;

        JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_json)
            .map_err(|e| anyhow!("Failed to compile JSON schema: {}", e))
    }

    /// Load a report from file and validate it against the schema
    pub fn load_and_validate(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report file: {}", path.display()))?;

        let report_json: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse report JSON from: {}", path.display()))?;

        let schema = Self::load_schema()?;
        Self::validate_with_schema(&report_json, &schema)?;

        let report: AggregateReport = serde_json::from_value(report_json)
            .with_context(|| format!("Failed to deserialize report from: {}", path.display()))?;

        Ok(report)
    }
}
