use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SamplerError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Inclusive lower bound
    pub min: i64,
    /// Exclusive upper bound
    pub max: i64,
    pub count: i64,
}

/// A named distribution of integer samples.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    pub name: String,
    /// Sum of every sample, independent of bucketing.
    pub sum: i64,
    #[serde(default)]
    pub buckets: Vec<HistogramBucket>,
}

impl Histogram {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn total_count(&self) -> i64 {
        self.buckets.iter().map(|b| b.count).sum()
    }

    pub fn mean(&self) -> Result<f64, SamplerError> {
        let count = self.total_count();
        if count <= 0 {
            return Err(SamplerError::Empty(self.name.clone()));
        }
        Ok(self.sum as f64 / count as f64)
    }

    /// Samples recorded since `before` was taken.
    pub fn diff(&self, before: &Histogram) -> Result<Histogram, SamplerError> {
        let mismatch = |reason: String| SamplerError::Mismatch {
            name: self.name.clone(),
            reason,
        };
        if before.name != self.name {
            return Err(mismatch(format!("baseline is {}", before.name)));
        }

        let mut buckets = self.buckets.clone();
        for old in &before.buckets {
            let bucket = buckets
                .iter_mut()
                .find(|b| b.min == old.min && b.max == old.max)
                .ok_or_else(|| mismatch(format!("bucket [{}, {}) vanished", old.min, old.max)))?;
            if bucket.count < old.count {
                return Err(mismatch(format!(
                    "bucket [{}, {}) shrank from {} to {}",
                    old.min, old.max, old.count, bucket.count
                )));
            }
            bucket.count -= old.count;
        }
        buckets.retain(|b| b.count > 0);

        Ok(Histogram {
            name: self.name.clone(),
            sum: self.sum - before.sum,
            buckets,
        })
    }
}

#[async_trait]
pub trait HistogramSource: Send + Sync {
    /// Clears the samples of `name`.
    async fn reset(&self, name: &str) -> Result<(), SamplerError>;

    /// Current samples of `name`; `None` if nothing was ever recorded.
    async fn snapshot(&self, name: &str) -> Result<Option<Histogram>, SamplerError>;

    /// Sources that cannot reset are sampled by diffing against a baseline.
    fn supports_reset(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bucket(min: i64, max: i64, count: i64) -> HistogramBucket {
        HistogramBucket { min, max, count }
    }

    #[test]
    fn mean_uses_sum_over_count() {
        let h = Histogram {
            name: "X.Smoothness".into(),
            sum: 180,
            buckets: vec![bucket(50, 51, 1), bucket(60, 61, 1), bucket(70, 71, 1)],
        };
        assert_eq!(h.total_count(), 3);
        assert_eq!(h.mean().unwrap(), 60.0);
        assert!(matches!(
            Histogram::empty("X").mean(),
            Err(SamplerError::Empty(_))
        ));
    }

    #[test]
    fn diff_subtracts_baseline() {
        let before = Histogram {
            name: "Ash.Latency".into(),
            sum: 30,
            buckets: vec![bucket(0, 20, 2)],
        };
        let after = Histogram {
            name: "Ash.Latency".into(),
            sum: 130,
            buckets: vec![bucket(0, 20, 2), bucket(90, 110, 1)],
        };
        let delta = after.diff(&before).unwrap();
        assert_eq!(delta.buckets, vec![bucket(90, 110, 1)]);
        assert_eq!(delta.mean().unwrap(), 100.0);

        assert!(before.diff(&after).is_err());
    }
}
