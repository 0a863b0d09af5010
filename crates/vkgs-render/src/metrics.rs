//! Frame metrics.
//!
//! The renderer pushes per-stage GPU durations and a few counters into a
//! [`MetricsSink`] owned by the caller after every frame. Display is the
//! sink's business.

use std::collections::VecDeque;

use hashbrown::HashMap;

/// Receiver for named frame metrics.
pub trait MetricsSink {
    /// Record a numeric sample, typically a duration in milliseconds.
    fn push_metric(&mut self, name: &str, value: f64);

    /// Record a textual value such as a counter.
    fn push_text_metric(&mut self, name: &str, value: &str);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn push_metric(&mut self, _name: &str, _value: f64) {}

    fn push_text_metric(&mut self, _name: &str, _value: &str) {}
}

/// Summary of the samples currently in a metric's window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub last: f64,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
    pub p95: f64,
    pub samples: usize,
}

/// Rolling statistics per metric over the last `window` samples.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    window: usize,
    samples: HashMap<String, VecDeque<f64>>,
    text: HashMap<String, String>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl MetricsCollector {
    pub const DEFAULT_WINDOW: usize = 120;

    /// Create a collector keeping at most `window` samples per metric.
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: HashMap::new(),
            text: HashMap::new(),
        }
    }

    /// Statistics for `name`, or `None` if nothing was recorded.
    pub fn stats(&self, name: &str) -> Option<MetricStats> {
        let samples = self.samples.get(name)?;
        let last = *samples.back()?;

        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let sum: f64 = sorted.iter().sum();
        let p95_index = ((sorted.len() as f64 * 0.95).ceil() as usize).clamp(1, sorted.len()) - 1;

        Some(MetricStats {
            last,
            min: sorted[0],
            avg: sum / sorted.len() as f64,
            max: sorted[sorted.len() - 1],
            p95: sorted[p95_index],
            samples: sorted.len(),
        })
    }

    /// Latest text value for `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    /// Names of all numeric metrics, sorted.
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.samples.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// One line per metric, for logging.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .metric_names()
            .into_iter()
            .filter_map(|name| {
                let s = self.stats(name)?;
                Some(format!(
                    "{name}: last {:.3} ms, avg {:.3}, min {:.3}, max {:.3}, p95 {:.3}",
                    s.last, s.avg, s.min, s.max, s.p95
                ))
            })
            .collect();
        let mut text: Vec<_> = self.text.iter().collect();
        text.sort_unstable();
        lines.extend(text.into_iter().map(|(name, value)| format!("{name}: {value}")));
        lines.join("\n")
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.text.clear();
    }
}

impl MetricsSink for MetricsCollector {
    fn push_metric(&mut self, name: &str, value: f64) {
        let window = self.window;
        let samples = self
            .samples
            .entry_ref(name)
            .or_insert_with(|| VecDeque::with_capacity(window));
        if samples.len() == window {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    fn push_text_metric(&mut self, name: &str, value: &str) {
        match self.text.get_mut(name) {
            Some(existing) => {
                existing.clear();
                existing.push_str(value);
            }
            None => {
                self.text.insert(name.to_string(), value.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn stats_over_window() {
        let mut metrics = MetricsCollector::new(4);
        for value in [5.0, 1.0, 2.0, 3.0, 4.0] {
            metrics.push_metric("render", value);
        }
        // 5.0 fell out of the window
        let stats = metrics.stats("render").unwrap();
        assert_eq!(stats.samples, 4);
        assert_relative_eq!(stats.last, 4.0);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.avg, 2.5);
        assert_relative_eq!(stats.p95, 4.0);
    }

    #[test]
    fn p95_picks_upper_tail() {
        let mut metrics = MetricsCollector::new(100);
        for i in 1..=100 {
            metrics.push_metric("sort", f64::from(i));
        }
        assert_relative_eq!(metrics.stats("sort").unwrap().p95, 95.0);
    }

    #[test]
    fn text_metrics_are_replaced() {
        let mut metrics = MetricsCollector::default();
        metrics.push_text_metric("instances", "10");
        metrics.push_text_metric("instances", "12");
        assert_eq!(metrics.text("instances"), Some("12"));
        assert!(metrics.summary().contains("instances: 12"));
    }

    #[test]
    fn unknown_metric_has_no_stats() {
        let metrics = MetricsCollector::default();
        assert!(metrics.stats("missing").is_none());
        assert!(metrics.metric_names().is_empty());
    }

    #[test]
    fn null_sink_accepts_everything() {
        let mut sink = NullMetrics;
        sink.push_metric("a", 1.0);
        sink.push_text_metric("b", "c");
    }
}
