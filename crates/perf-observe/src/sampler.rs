use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uase_core_types::EngineError;

use action_flow::Action;
use action_primitives::{poll, ExecCtx, PollError, PollOptions};

use crate::errors::SamplerError;
use crate::histogram::{Histogram, HistogramSource};

/// Reset, run, collect: one recording window over a set of histograms.
#[derive(Clone)]
pub struct Recorder {
    source: Arc<dyn HistogramSource>,
    interval: Duration,
}

impl Recorder {
    pub fn new(source: Arc<dyn HistogramSource>) -> Self {
        Self {
            source,
            interval: action_primitives::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Histograms absent after the action come back empty.
    pub async fn run(
        &self,
        ctx: &ExecCtx,
        action: &Action,
        names: &[String],
    ) -> Result<Vec<Histogram>, EngineError> {
        let baseline = self.begin(ctx, names).await?;
        action.run(ctx).await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let h = self
                .collect(ctx, name, &baseline)
                .await?
                .unwrap_or_else(|| Histogram::empty(name.clone()));
            out.push(h);
        }
        Ok(out)
    }

    /// Like [`run`](Self::run), then waits up to `wait` until every histogram has a sample.
    pub async fn run_and_wait_all(
        &self,
        ctx: &ExecCtx,
        action: &Action,
        wait: Duration,
        names: &[String],
    ) -> Result<Vec<Histogram>, EngineError> {
        let baseline = self.begin(ctx, names).await?;
        action.run(ctx).await?;

        let opts = PollOptions::with_timeout(wait).interval(self.interval);
        let baseline = &baseline;
        let histograms = poll(ctx, opts, move |attempt| async move {
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                match self.collect(&attempt, name, baseline).await? {
                    Some(h) if h.total_count() > 0 => out.push(h),
                    _ => {
                        return Err(PollError::Transient(
                            SamplerError::Missing(name.clone()).into(),
                        ))
                    }
                }
            }
            Ok(out)
        })
        .await?;

        for h in &histograms {
            info!(histogram = %h.name, count = h.total_count(), sum = h.sum, "histogram recorded");
        }
        Ok(histograms)
    }

    async fn begin(
        &self,
        ctx: &ExecCtx,
        names: &[String],
    ) -> Result<BTreeMap<String, Histogram>, EngineError> {
        let mut baseline = BTreeMap::new();
        for name in names {
            if self.source.supports_reset() {
                ctx.run(async { self.source.reset(name).await.map_err(EngineError::from) })
                    .await?;
            } else if let Some(h) = ctx
                .run(async { self.source.snapshot(name).await.map_err(EngineError::from) })
                .await?
            {
                baseline.insert(name.clone(), h);
            }
        }
        debug!(histograms = names.len(), diffed = baseline.len(), "recording window opened");
        Ok(baseline)
    }

    async fn collect(
        &self,
        ctx: &ExecCtx,
        name: &str,
        baseline: &BTreeMap<String, Histogram>,
    ) -> Result<Option<Histogram>, EngineError> {
        let current = ctx
            .run(async { self.source.snapshot(name).await.map_err(EngineError::from) })
            .await?;
        match (current, baseline.get(name)) {
            (Some(h), Some(before)) => Ok(Some(h.diff(before)?)),
            (current, _) => Ok(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramBucket;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use uase_core_types::ErrorKind;

    #[derive(Default)]
    struct MemorySource {
        samples: Mutex<HashMap<String, Vec<i64>>>,
        resets: Mutex<Vec<String>>,
        resettable: bool,
    }

    impl MemorySource {
        fn record(&self, name: &str, value: i64) {
            self.samples
                .lock()
                .entry(name.to_string())
                .or_default()
                .push(value);
        }
    }

    #[async_trait]
    impl HistogramSource for MemorySource {
        async fn reset(&self, name: &str) -> Result<(), SamplerError> {
            self.resets.lock().push(name.to_string());
            self.samples.lock().remove(name);
            Ok(())
        }

        async fn snapshot(&self, name: &str) -> Result<Option<Histogram>, SamplerError> {
            Ok(self.samples.lock().get(name).map(|values| Histogram {
                name: name.to_string(),
                sum: values.iter().sum(),
                buckets: values
                    .iter()
                    .map(|v| HistogramBucket {
                        min: *v,
                        max: v + 1,
                        count: 1,
                    })
                    .collect(),
            }))
        }

        fn supports_reset(&self) -> bool {
            self.resettable
        }
    }

    fn emit(source: &Arc<MemorySource>, name: &'static str, values: Vec<i64>) -> Action {
        let source = source.clone();
        Action::new(move |_| {
            let source = source.clone();
            let values = values.clone();
            async move {
                for v in values {
                    source.record(name, v);
                }
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn run_resets_then_collects() {
        let source = Arc::new(MemorySource {
            resettable: true,
            ..Default::default()
        });
        source.record("X.Smoothness", 10);
        let recorder = Recorder::new(source.clone());
        let names = vec!["X.Smoothness".to_string(), "X.Jank".to_string()];
        let hs = recorder
            .run(&ExecCtx::background(), &emit(&source, "X.Smoothness", vec![50, 60, 70]), &names)
            .await
            .unwrap();
        assert_eq!(*source.resets.lock(), names);
        assert_eq!(hs[0].mean().unwrap(), 60.0);
        assert_eq!(hs[1], Histogram::empty("X.Jank"));
    }

    #[tokio::test(start_paused = true)]
    async fn absent_histogram_times_out() {
        let source = Arc::new(MemorySource {
            resettable: true,
            ..Default::default()
        });
        let recorder = Recorder::new(source.clone());
        let err = recorder
            .run_and_wait_all(
                &ExecCtx::background(),
                &Action::noop(),
                Duration::from_secs(1),
                &["X.Smoothness".to_string()],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.cause().unwrap().message().contains("X.Smoothness"));
    }

    #[tokio::test(start_paused = true)]
    async fn sources_without_reset_are_diffed() {
        let source = Arc::new(MemorySource::default());
        source.record("Ash.Latency", 5);
        let recorder = Recorder::new(source.clone());
        let hs = recorder
            .run_and_wait_all(
                &ExecCtx::background(),
                &emit(&source, "Ash.Latency", vec![100, 120]),
                Duration::from_secs(1),
                &["Ash.Latency".to_string()],
            )
            .await
            .unwrap();
        assert!(source.resets.lock().is_empty());
        assert_eq!(hs[0].total_count(), 2);
        assert_eq!(hs[0].mean().unwrap(), 110.0);
    }

    #[tokio::test]
    async fn failing_action_discards_the_window() {
        let source = Arc::new(MemorySource {
            resettable: true,
            ..Default::default()
        });
        let recorder = Recorder::new(source);
        let broken = Action::new(|_| async { Err(EngineError::driver("touchscreen closed")) });
        let err = recorder
            .run(&ExecCtx::background(), &broken, &["X".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);
    }
}
