//! SML reading extraction
//!
//! The meter pushes SML telegrams over its optical interface. Rather than
//! parsing SML generically, we look for the OBIS list entries this meter
//! family emits and read the value that sits at a fixed distance behind each
//! one. Offsets, widths and scale factors were determined empirically and are
//! constants of the protocol, not configuration.

use tracing::debug;

/// OBIS 1.8.0 (total imported energy), including the unit/scaler/type prefix
pub const WORK_TOTAL_MARKER: &[u8] = &[
    0x77, 0x07, 0x01, 0x00, 0x01, 0x08, 0x00, 0xff, 0x01, 0x01, 0x62, 0x1e, 0x52, 0xff, 0x56,
];

/// OBIS 1.8.1 (imported energy, tariff 1)
pub const WORK_TARIFF1_MARKER: &[u8] = &[
    0x77, 0x07, 0x01, 0x00, 0x01, 0x08, 0x01, 0xff, 0x01, 0x01, 0x62, 0x1e, 0x52, 0xff, 0x56,
];

/// OBIS 1.8.2 (imported energy, tariff 2)
pub const WORK_TARIFF2_MARKER: &[u8] = &[
    0x77, 0x07, 0x01, 0x00, 0x01, 0x08, 0x02, 0xff, 0x01, 0x01, 0x62, 0x1e, 0x52, 0xff, 0x56,
];

/// OBIS 16.7.0 (instantaneous active power, all phases)
pub const POWER_MARKER: &[u8] = &[0x77, 0x07, 0x01, 0x00, 0x10, 0x07, 0x00, 0xff];

/// OBIS 36.7.0 (instantaneous power, phase L1). Located for diagnostics only.
pub const PHASE1_POWER_MARKER: &[u8] = &[0x77, 0x07, 0x01, 0x00, 0x24, 0x07, 0x00, 0xff];

/// Metric families produced from a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterMetric {
    /// Instantaneous power
    Power,
    /// Cumulative energy counter, one series per register
    Work,
}

impl MeterMetric {
    /// Exposed metric name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Power => "powermeter_power",
            Self::Work => "powermeter_work",
        }
    }

    /// Help text for the exposition format
    pub const fn help(self) -> &'static str {
        match self {
            Self::Power => "Power reading of meter",
            Self::Work => "Work reading of meter",
        }
    }
}

/// One extractable quantity of the protocol
#[derive(Debug, Clone, Copy)]
pub struct MarkerSpec {
    /// Byte pattern preceding the value
    pub marker: &'static [u8],
    /// Distance from the end of the marker to the first value byte
    pub value_offset: usize,
    /// Width of the big-endian value in bytes
    pub value_len: usize,
    /// Divisor turning the raw integer into the reported unit
    pub scale: u32,
    pub metric: MeterMetric,
    /// OBIS register label (`meter_id`), if the metric carries one
    pub meter_id: Option<&'static str>,
}

/// All quantities published by the exporter
pub const MARKERS: &[MarkerSpec] = &[
    MarkerSpec {
        marker: WORK_TOTAL_MARKER,
        value_offset: 0,
        value_len: 5,
        scale: 10_000,
        metric: MeterMetric::Work,
        meter_id: Some("1.8.0"),
    },
    MarkerSpec {
        marker: WORK_TARIFF1_MARKER,
        value_offset: 0,
        value_len: 5,
        scale: 10_000,
        metric: MeterMetric::Work,
        meter_id: Some("1.8.1"),
    },
    MarkerSpec {
        marker: WORK_TARIFF2_MARKER,
        value_offset: 0,
        value_len: 5,
        scale: 10_000,
        metric: MeterMetric::Work,
        meter_id: Some("1.8.2"),
    },
    // Power entries carry status/time/unit/scaler fields between the OBIS
    // code and the value: 7 bytes, followed by a 4 byte integer.
    MarkerSpec {
        marker: POWER_MARKER,
        value_offset: 7,
        value_len: 4,
        scale: 10,
        metric: MeterMetric::Power,
        meter_id: None,
    },
];

/// A decoded value, valid for one acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub metric: MeterMetric,
    pub meter_id: Option<&'static str>,
    /// Integer as found in the frame
    pub raw: u64,
    /// Scaled value in the reported unit
    pub value: f64,
}

impl Reading {
    /// Label set for this reading's time series
    pub fn labels(&self, meter_name: &str) -> Vec<(&'static str, String)> {
        let mut labels = vec![("meter_name", meter_name.to_string())];
        if let Some(id) = self.meter_id {
            labels.push(("meter_id", id.to_string()));
        }
        labels
    }
}

/// Position of the first occurrence of `marker` in `frame`
pub fn find_marker(frame: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || marker.len() > frame.len() {
        return None;
    }
    frame.windows(marker.len()).position(|w| w == marker)
}

/// Decode an unsigned big-endian integer of at most 8 bytes
pub fn decode_be_uint(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
    )
}

/// Decode a single marker entry. `None` means soft-miss: either the marker is
/// absent or the frame ends before the value does.
#[allow(clippy::cast_precision_loss)]
pub fn extract(frame: &[u8], spec: &MarkerSpec) -> Option<Reading> {
    let start = find_marker(frame, spec.marker)? + spec.marker.len() + spec.value_offset;
    let end = start.checked_add(spec.value_len)?;
    let raw = decode_be_uint(frame.get(start..end)?)?;
    Some(Reading {
        metric: spec.metric,
        meter_id: spec.meter_id,
        raw,
        value: raw as f64 / f64::from(spec.scale),
    })
}

/// Decode every entry of [`MARKERS`] that is present in the frame
pub fn extract_readings(frame: &[u8]) -> Vec<Reading> {
    extract_with(frame, MARKERS)
}

/// Decode every entry of `specs` that is present in the frame
pub fn extract_with(frame: &[u8], specs: &[MarkerSpec]) -> Vec<Reading> {
    log_marker_positions(frame);

    let mut readings = Vec::with_capacity(specs.len());
    for spec in specs {
        match extract(frame, spec) {
            Some(reading) => {
                debug!(
                    metric = spec.metric.name(),
                    meter_id = spec.meter_id.unwrap_or("-"),
                    raw = reading.raw,
                    value = reading.value,
                    "Decoded reading"
                );
                readings.push(reading);
            }
            None => debug!(
                metric = spec.metric.name(),
                meter_id = spec.meter_id.unwrap_or("-"),
                frame_len = frame.len(),
                "Marker not found or value truncated, skipping"
            ),
        }
    }
    readings
}

fn log_marker_positions(frame: &[u8]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let pos = |m: &[u8]| find_marker(frame, m).map_or_else(|| "-".to_string(), |p| p.to_string());
    debug!(
        work0 = %pos(WORK_TOTAL_MARKER),
        work1 = %pos(WORK_TARIFF1_MARKER),
        work2 = %pos(WORK_TARIFF2_MARKER),
        power = %pos(POWER_MARKER),
        phase1 = %pos(PHASE1_POWER_MARKER),
        "Marker positions"
    );
}
