//! Metrics sink and Prometheus exposition
//!
//! All series live in one [`PrometheusRecorder`] owned by [`MeterMetrics`].
//! The recorder is never installed globally; every update runs inside
//! [`metrics::with_local_recorder`], which keeps instances independent (one
//! per process in production, one per test).

use crate::sml::{MeterMetric, Reading};
use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;

/// Cycle durations, including failed ones
pub const GATHERING_DURATION: &str = "powermeter_gatheringduration_seconds";

/// Time spent opening the serial port
pub const CONNECTION_SETUP: &str = "powermeter_connection_setup_seconds";

/// Cycles abandoned because the device could not be used
pub const GATHERING_FAILURES: &str = "powermeter_gathering_failures_total";

/// Readings written to the gauges
pub const READINGS_PUBLISHED: &str = "powermeter_readings_total";

/// Gauge registry for one meter
pub struct MeterMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    meter_name: String,
}

impl MeterMetrics {
    /// Create a fresh registry with all metric descriptions registered
    pub fn new(meter_name: &str) -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metrics = Self {
            recorder,
            handle,
            meter_name: meter_name.to_string(),
        };
        metrics.describe();
        metrics
    }

    fn describe(&self) {
        metrics::with_local_recorder(&self.recorder, || {
            for metric in [MeterMetric::Power, MeterMetric::Work] {
                describe_gauge!(metric.name(), metric.help());
            }
            describe_histogram!(
                GATHERING_DURATION,
                Unit::Seconds,
                "The duration of data gatherings"
            );
            describe_histogram!(
                CONNECTION_SETUP,
                Unit::Seconds,
                "The duration of connection setups"
            );
            describe_counter!(
                GATHERING_FAILURES,
                Unit::Count,
                "The number of gatherings abandoned because the device was unavailable"
            );
            describe_counter!(
                READINGS_PUBLISHED,
                Unit::Count,
                "The number of readings decoded and published"
            );
        });
    }

    pub fn meter_name(&self) -> &str {
        &self.meter_name
    }

    /// Overwrite the gauge of every reading. Series without a reading keep
    /// their last value.
    pub fn publish(&self, readings: &[Reading]) {
        if readings.is_empty() {
            return;
        }
        metrics::with_local_recorder(&self.recorder, || {
            for reading in readings {
                let labels = reading.labels(&self.meter_name);
                metrics::gauge!(reading.metric.name(), &labels).set(reading.value);
            }
            metrics::counter!(READINGS_PUBLISHED, "meter_name" => self.meter_name.clone())
                .increment(readings.len() as u64);
        });
    }

    /// Record the outcome of one acquisition cycle
    pub fn record_cycle(&self, duration: Duration, succeeded: bool) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::histogram!(GATHERING_DURATION, "meter_name" => self.meter_name.clone())
                .record(duration.as_secs_f64());
            if !succeeded {
                metrics::counter!(GATHERING_FAILURES, "meter_name" => self.meter_name.clone())
                    .increment(1);
            }
        });
    }

    pub fn record_connection_setup(&self, duration: Duration) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::histogram!(CONNECTION_SETUP, "meter_name" => self.meter_name.clone())
                .record(duration.as_secs_f64());
        });
    }

    /// Current state in the Prometheus text exposition format
    pub fn render(&self) -> String {
        self.handle.run_upkeep();
        self.handle.render()
    }
}

impl std::fmt::Debug for MeterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterMetrics")
            .field("meter_name", &self.meter_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(metric: MeterMetric, meter_id: Option<&'static str>, value: f64) -> Reading {
        Reading {
            metric,
            meter_id,
            raw: 0,
            value,
        }
    }

    fn line_for<'a>(rendered: &'a str, prefix: &str) -> Option<&'a str> {
        rendered.lines().find(|l| l.starts_with(prefix))
    }

    fn value_of(line: &str) -> f64 {
        line.rsplit(' ').next().unwrap().parse().unwrap()
    }

    #[test]
    fn test_unset_gauges_are_absent() {
        let metrics = MeterMetrics::new("cellar");
        let rendered = metrics.render();
        assert!(line_for(&rendered, "powermeter_power{").is_none());
        assert!(line_for(&rendered, "powermeter_work{").is_none());
    }

    #[test]
    fn test_publish_sets_labeled_gauges() {
        let metrics = MeterMetrics::new("cellar");
        metrics.publish(&[
            reading(MeterMetric::Power, None, 100.0),
            reading(MeterMetric::Work, Some("1.8.1"), 10.5),
        ]);
        let rendered = metrics.render();

        let power = line_for(&rendered, "powermeter_power{").unwrap();
        assert!(power.contains("meter_name=\"cellar\""));
        assert_eq!(value_of(power), 100.0);

        let work = line_for(&rendered, "powermeter_work{").unwrap();
        assert!(work.contains("meter_id=\"1.8.1\""));
        assert_eq!(value_of(work), 10.5);
    }

    #[test]
    fn test_publish_overwrites_instead_of_accumulating() {
        let metrics = MeterMetrics::new("cellar");
        for _ in 0..3 {
            metrics.publish(&[reading(MeterMetric::Power, None, 42.5)]);
        }
        let rendered = metrics.render();
        assert_eq!(value_of(line_for(&rendered, "powermeter_power{").unwrap()), 42.5);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = MeterMetrics::new("a");
        let b = MeterMetrics::new("b");
        a.publish(&[reading(MeterMetric::Power, None, 1.0)]);
        assert!(line_for(&b.render(), "powermeter_power{").is_none());
    }

    #[test]
    fn test_failed_cycle_is_counted() {
        let metrics = MeterMetrics::new("cellar");
        metrics.record_cycle(Duration::from_millis(20), false);
        metrics.record_cycle(Duration::from_millis(20), true);
        let rendered = metrics.render();
        let failures = line_for(&rendered, GATHERING_FAILURES).unwrap();
        assert_eq!(value_of(failures), 1.0);
        assert!(rendered.contains(GATHERING_DURATION));
        assert!(line_for(&rendered, CONNECTION_SETUP).is_none());
    }

    #[test]
    fn test_connection_setup_is_recorded() {
        let metrics = MeterMetrics::new("cellar");
        metrics.record_connection_setup(Duration::from_millis(3));
        metrics.record_connection_setup(Duration::from_millis(5));
        let rendered = metrics.render();
        let count = line_for(&rendered, &format!("{}_count", CONNECTION_SETUP)).unwrap();
        assert!(count.contains("meter_name=\"cellar\""));
        assert_eq!(value_of(count), 2.0);
    }
}
