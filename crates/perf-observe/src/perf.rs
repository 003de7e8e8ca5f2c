use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::errors::SamplerError;
use crate::histogram::Histogram;

pub const RESULTS_FILE: &str = "results-chart.json";
pub const DEFAULT_VARIANT: &str = "summary";

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]{1,256}$").expect("valid regex"));
static UNIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]{1,32}$").expect("valid regex"));

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    BiggerIsBetter,
    SmallerIsBetter,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::BiggerIsBetter => "up",
            Direction::SmallerIsBetter => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default = "default_variant")]
    pub variant: String,
    pub unit: String,
    pub direction: Direction,
    /// Holds a list of values instead of a single scalar.
    #[serde(default)]
    pub multiple: bool,
}

impl Metric {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            variant: default_variant(),
            unit: unit.into(),
            direction,
            multiple: false,
        }
    }

    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn validate(&self) -> Result<(), SamplerError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(SamplerError::InvalidMetric(format!("bad name {:?}", self.name)));
        }
        if !NAME_RE.is_match(&self.variant) {
            return Err(SamplerError::InvalidMetric(format!(
                "bad variant {:?} for {}",
                self.variant, self.name
            )));
        }
        if !UNIT_RE.is_match(&self.unit) {
            return Err(SamplerError::InvalidMetric(format!(
                "bad unit {:?} for {}",
                self.unit, self.name
            )));
        }
        Ok(())
    }

    fn key(&self) -> (String, String) {
        (self.name.clone(), self.variant.clone())
    }
}

/// Which histogram to record and how to report its mean.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub histogram: String,
    pub unit: String,
    pub direction: Direction,
}

impl MetricConfig {
    pub fn smoothness(histogram: impl Into<String>) -> Self {
        Self::custom(histogram, "percent", Direction::BiggerIsBetter)
    }

    pub fn jank(histogram: impl Into<String>) -> Self {
        Self::custom(histogram, "percent", Direction::SmallerIsBetter)
    }

    pub fn latency(histogram: impl Into<String>) -> Self {
        Self::custom(histogram, "ms", Direction::SmallerIsBetter)
    }

    pub fn custom(histogram: impl Into<String>, unit: impl Into<String>, direction: Direction) -> Self {
        Self {
            histogram: histogram.into(),
            unit: unit.into(),
            direction,
        }
    }

    pub fn metric(&self) -> Metric {
        Metric::new(self.histogram.clone(), self.unit.clone(), self.direction)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    metric: Metric,
    values: Vec<f64>,
}

/// Named performance values collected during a run.
#[derive(Debug, Default)]
pub struct PerfValues {
    entries: Mutex<BTreeMap<(String, String), Entry>>,
}

impl PerfValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the values of `metric`. Single-value metrics take exactly one.
    pub fn set(&self, metric: &Metric, values: &[f64]) -> Result<(), SamplerError> {
        metric.validate()?;
        if !metric.multiple && values.len() != 1 {
            return Err(SamplerError::InvalidMetric(format!(
                "{} takes one value, got {}",
                metric.name,
                values.len()
            )));
        }
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&metric.key()) {
            check_same(&existing.metric, metric)?;
        }
        entries.insert(
            metric.key(),
            Entry {
                metric: metric.clone(),
                values: values.to_vec(),
            },
        );
        Ok(())
    }

    pub fn append(&self, metric: &Metric, values: &[f64]) -> Result<(), SamplerError> {
        metric.validate()?;
        if !metric.multiple {
            return Err(SamplerError::InvalidMetric(format!(
                "cannot append to single-value metric {}",
                metric.name
            )));
        }
        let mut entries = self.entries.lock();
        let entry = entries.entry(metric.key()).or_insert_with(|| Entry {
            metric: metric.clone(),
            values: Vec::new(),
        });
        check_same(&entry.metric, metric)?;
        entry.values.extend_from_slice(values);
        Ok(())
    }

    pub fn get(&self, name: &str, variant: &str) -> Option<Vec<f64>> {
        self.entries
            .lock()
            .get(&(name.to_string(), variant.to_string()))
            .map(|e| e.values.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Folds `other` into `self`: lists are extended, scalars overwritten.
    pub fn merge(&self, other: &PerfValues) -> Result<(), SamplerError> {
        let theirs: Vec<Entry> = other.entries.lock().values().cloned().collect();
        for entry in theirs {
            if entry.metric.multiple {
                self.append(&entry.metric, &entry.values)?;
            } else {
                self.set(&entry.metric, &entry.values)?;
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut charts = Map::new();
        for ((name, variant), entry) in self.entries.lock().iter() {
            let mut body = json!({
                "units": entry.metric.unit,
                "improvement_direction": entry.metric.direction.as_str(),
            });
            if entry.metric.multiple {
                body["type"] = json!("list_of_scalar_values");
                body["values"] = json!(entry.values);
            } else {
                body["type"] = json!("scalar");
                body["value"] = json!(entry.values.first().copied().unwrap_or_default());
            }
            let chart = charts
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(chart) = chart {
                chart.insert(variant.clone(), body);
            }
        }
        Value::Object(charts)
    }

    /// Writes `results-chart.json` into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, SamplerError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(RESULTS_FILE);
        let body = serde_json::to_vec_pretty(&self.to_json())
            .map_err(|e| SamplerError::Io(e.to_string()))?;
        std::fs::write(&path, body)?;
        info!(path = %path.display(), metrics = self.len(), "perf values saved");
        Ok(path)
    }
}

fn check_same(existing: &Metric, incoming: &Metric) -> Result<(), SamplerError> {
    if existing.unit != incoming.unit
        || existing.direction != incoming.direction
        || existing.multiple != incoming.multiple
    {
        return Err(SamplerError::InvalidMetric(format!(
            "{}.{} redefined with different unit or direction",
            incoming.name, incoming.variant
        )));
    }
    Ok(())
}

/// Stores the mean of `histogram` under the metric `config` describes.
pub fn store_mean(
    values: &PerfValues,
    histogram: &Histogram,
    config: &MetricConfig,
) -> Result<f64, SamplerError> {
    let mean = histogram.mean()?;
    values.set(&config.metric(), &[mean])?;
    info!(histogram = %histogram.name, mean, unit = %config.unit, "metric stored");
    Ok(mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramBucket;
    use pretty_assertions::assert_eq;

    fn smoothness_histogram() -> Histogram {
        Histogram {
            name: "X.Smoothness".into(),
            sum: 180,
            buckets: [50, 60, 70]
                .iter()
                .map(|v| HistogramBucket {
                    min: *v,
                    max: v + 1,
                    count: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn metric_names_are_checked() {
        assert!(Metric::new("Ash.Smoothness.PercentDroppedFrames", "percent", Direction::SmallerIsBetter)
            .validate()
            .is_ok());
        assert!(Metric::new("bad name", "ms", Direction::SmallerIsBetter).validate().is_err());
        assert!(Metric::new("x", "", Direction::SmallerIsBetter).validate().is_err());
        assert!(Metric::new("x", "ms", Direction::SmallerIsBetter)
            .variant("a/b")
            .validate()
            .is_err());
    }

    #[test]
    fn single_values_take_one_sample() {
        let pv = PerfValues::new();
        let m = Metric::new("Latency", "ms", Direction::SmallerIsBetter);
        assert!(pv.set(&m, &[1.0, 2.0]).is_err());
        assert!(pv.append(&m, &[1.0]).is_err());
        pv.set(&m, &[3.0]).unwrap();
        pv.set(&m, &[4.0]).unwrap();
        assert_eq!(pv.get("Latency", DEFAULT_VARIANT), Some(vec![4.0]));

        let redefined = Metric::new("Latency", "us", Direction::SmallerIsBetter);
        assert!(pv.set(&redefined, &[5.0]).is_err());
    }

    #[test]
    fn merge_extends_lists() {
        let m = Metric::new("Frames", "count", Direction::BiggerIsBetter).multiple();
        let a = PerfValues::new();
        let b = PerfValues::new();
        a.append(&m, &[1.0, 2.0]).unwrap();
        b.append(&m, &[3.0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.get("Frames", DEFAULT_VARIANT), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn store_mean_and_save_chart() {
        let pv = PerfValues::new();
        let mean = store_mean(&pv, &smoothness_histogram(), &MetricConfig::smoothness("X.Smoothness")).unwrap();
        assert_eq!(mean, 60.0);

        let dir = tempfile::tempdir().unwrap();
        let path = pv.save(&dir.path().join("out")).unwrap();
        assert!(path.ends_with(RESULTS_FILE));

        let saved: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            saved,
            json!({
                "X.Smoothness": {
                    "summary": {
                        "units": "percent",
                        "improvement_direction": "up",
                        "type": "scalar",
                        "value": 60.0
                    }
                }
            })
        );
    }

    #[test]
    fn empty_histogram_stores_nothing() {
        let pv = PerfValues::new();
        let err = store_mean(&pv, &Histogram::empty("X.Jank"), &MetricConfig::jank("X.Jank")).unwrap_err();
        assert!(matches!(err, SamplerError::Empty(_)));
        assert!(pv.is_empty());
    }
}
