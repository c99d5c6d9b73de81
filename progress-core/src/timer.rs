//! Scoped Wall-Clock Timer
//!
//! A [`Timer`] is acquired from a metric handle and records the elapsed
//! time in milliseconds when it goes out of scope, however the scope is left:
//! normal fall-through, `?` early return or unwinding.

use crate::recorder::Recorder;
use std::time::Instant;

/// Scope guard that appends its elapsed milliseconds to a metric on drop
#[must_use = "the timer records when dropped; binding it to `_` stops it immediately"]
pub struct Timer<'r> {
    recorder: &'r Recorder,
    metric: String,
    start: Option<Instant>,
}

impl<'r> Timer<'r> {
    pub(crate) fn start(recorder: &'r Recorder, metric: String) -> Self {
        Self {
            recorder,
            metric,
            start: Some(Instant::now()),
        }
    }

    /// End the scope now and return the recorded milliseconds
    pub fn stop(mut self) -> f64 {
        self.finish().unwrap_or(0.0)
    }

    fn finish(&mut self) -> Option<f64> {
        let start = self.start.take()?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.recorder.push_value(&self.metric, elapsed_ms);
        Some(elapsed_ms)
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn values(recorder: Recorder, id: &str) -> Vec<f64> {
        recorder
            .into_record()
            .measurements
            .into_iter()
            .find(|m| m.id == id)
            .map(|m| m.values)
            .unwrap_or_default()
    }

    #[test]
    fn test_timer_records_on_drop() {
        let recorder = Recorder::new();
        {
            let _timer = recorder.time("time-ms", "Time (ms)");
            std::thread::sleep(Duration::from_millis(10));
        }
        let recorded = values(recorder, "time-ms");
        assert_eq!(recorded.len(), 1);
        // Should be at least 5ms (accounting for coarse clocks)
        assert!(recorded[0] >= 5.0);
        // Should be less than 1s (accounting for scheduling)
        assert!(recorded[0] < 1000.0);
    }

    #[test]
    fn test_stop_records_once() {
        let recorder = Recorder::new();
        let timer = recorder.time("time-ms", "Time (ms)");
        let elapsed = timer.stop();
        let recorded = values(recorder, "time-ms");
        assert_eq!(recorded, vec![elapsed]);
    }

    #[test]
    fn test_timer_records_on_early_return() {
        fn fallible(recorder: &Recorder) -> Result<(), &'static str> {
            let _timer = recorder.time("time-ms", "Time (ms)");
            Err("bail out")?;
            Ok(())
        }

        let recorder = Recorder::new();
        assert!(fallible(&recorder).is_err());
        assert_eq!(values(recorder, "time-ms").len(), 1);
    }

    #[test]
    fn test_timer_records_while_unwinding() {
        let recorder = Recorder::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _timer = recorder.time("time-ms", "Time (ms)");
            panic!("target blew up");
        }));
        assert!(result.is_err());
        assert_eq!(values(recorder, "time-ms").len(), 1);
    }

    #[test]
    fn test_nested_recording_inside_timer_scope() {
        let recorder = Recorder::new();
        {
            let _timer = recorder.time("time-ms", "Time (ms)");
            recorder.record("estimation", "Estimation", 3.14);
        }
        let record = recorder.into_record();
        let ids: Vec<_> = record.metrics.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["time-ms", "estimation"]);
    }
}
