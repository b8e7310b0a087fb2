use std::sync::Mutex;

/// Counters for pipeline activity: successful recomputes, stage failures,
/// and recompute attempts discarded because a newer one superseded them.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

struct Metrics {
    recomputes: usize,
    failures: usize,
    superseded: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics {
                recomputes: 0,
                failures: 0,
                superseded: 0,
            }),
        }
    }

    pub fn record_recompute(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.recomputes += 1;
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failures += 1;
        }
    }

    pub fn record_superseded(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.superseded += 1;
        }
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        if let Ok(metrics) = self.inner.lock() {
            (metrics.recomputes, metrics.failures, metrics.superseded)
        } else {
            (0, 0, 0)
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
