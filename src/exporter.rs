//! Acquisition cycle: frame, readings, gauges
//!
//! Every cycle is independent. The device mutex serialises cycles so the
//! serial port is never opened twice at the same time, whichever trigger
//! (background ticker or HTTP request) started them.

use crate::error::{PowermeterError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::metrics::MeterMetrics;
use crate::serial::FrameSource;
use crate::sml;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Drives acquisition cycles against one meter
pub struct Exporter {
    source: Arc<dyn FrameSource>,
    metrics: Arc<MeterMetrics>,
    device_lock: Mutex<()>,
    logger: StructuredLogger,
}

impl Exporter {
    pub fn new(source: Arc<dyn FrameSource>, metrics: Arc<MeterMetrics>) -> Self {
        let context = LogContext::new("exporter")
            .with_meter_name(metrics.meter_name())
            .with_field("source", source.describe());
        Self {
            source,
            metrics,
            device_lock: Mutex::new(()),
            logger: get_logger_with_context(context),
        }
    }

    pub fn metrics(&self) -> &MeterMetrics {
        &self.metrics
    }

    /// Run one acquisition cycle and publish what could be decoded.
    ///
    /// Returns the number of readings published. On error no gauge is
    /// touched; the caller only needs to log or ignore it.
    pub async fn run_cycle(&self) -> Result<usize> {
        // Queue behind a running cycle rather than overlap it
        let _device = self.device_lock.lock().await;

        self.logger.info("Gathering metrics");
        let started = Instant::now();

        let source = Arc::clone(&self.source);
        let capture = tokio::task::spawn_blocking(move || source.capture())
            .await
            .map_err(|e| PowermeterError::generic(format!("Acquisition task failed: {}", e)))
            .and_then(|result| result);

        let frame = match capture {
            Ok(capture) => {
                if let Some(setup) = capture.connection_setup {
                    self.metrics.record_connection_setup(setup);
                }
                capture.frame
            }
            Err(e) => {
                self.metrics.record_cycle(started.elapsed(), false);
                self.logger
                    .error(&format!("Failed to read frame, skipping cycle: {}", e));
                return Err(e);
            }
        };

        let readings = sml::extract_readings(&frame);
        self.metrics.publish(&readings);
        self.metrics.record_cycle(started.elapsed(), true);

        self.logger.info(&format!(
            "Done gathering metrics: {} of {} readings from {} bytes",
            readings.len(),
            sml::MARKERS.len(),
            frame.len()
        ));
        Ok(readings.len())
    }

    /// Run cycles forever at a fixed interval, starting immediately.
    ///
    /// Ticks that fall due while a cycle is still running are skipped.
    pub async fn run_background(self: Arc<Self>, period: Duration) {
        self.logger.info(&format!(
            "Starting background acquisition every {:?}",
            period
        ));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            // Failures are logged by run_cycle; the next tick retries
            let _ = self.run_cycle().await;
        }
    }

    /// Spawn [`Exporter::run_background`] on the runtime
    pub fn spawn_background(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run_background(period))
    }
}
