//! Serial frame acquisition
//!
//! Opens the meter's optical head for one cycle, reads until the end of an
//! SML telegram (or until the byte budget or timeout runs out) and closes the
//! port again. Holding no connection between cycles means a replugged or
//! briefly missing device recovers on the next cycle without extra logic.

use crate::config::MeterConfig;
use crate::error::{PowermeterError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use serialport::{DataBits, FlowControl, Parity, StopBits};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// Raw bytes of one serial capture
pub type Frame = Vec<u8>;

/// Line speed of the optical interface
pub const BAUD_RATE: u32 = 9600;

/// Byte sequence after which the capture stops
pub const FRAME_DELIMITER: &[u8] = &[0x01, 0x01, 0x01, 0x01, 0x0a];

/// Upper bound of bytes read per capture
pub const MAX_FRAME_BYTES: usize = 1000;

const READ_CHUNK: usize = 64;

/// One frame plus how long it took to get the device ready
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub frame: Frame,
    /// Time spent opening the port, when the source had to open one
    pub connection_setup: Option<Duration>,
}

impl From<Frame> for Capture {
    fn from(frame: Frame) -> Self {
        Self {
            frame,
            connection_setup: None,
        }
    }
}

/// Something that can deliver one frame per call.
///
/// Implementations block; callers run them off the async executor.
pub trait FrameSource: Send + Sync {
    /// Capture one frame. A short frame is fine; only an unusable device is an error.
    fn read_frame(&self) -> Result<Frame>;

    /// Like [`FrameSource::read_frame`], with connection timing where available
    fn capture(&self) -> Result<Capture> {
        self.read_frame().map(Capture::from)
    }

    /// Human readable identification for logs
    fn describe(&self) -> String;
}

/// Reads frames from a serial device, one open/close per frame
pub struct SerialFrameReader {
    device: String,
    read_timeout: Duration,
    frame_timeout: Duration,
    logger: StructuredLogger,
}

impl SerialFrameReader {
    pub fn new(config: &MeterConfig) -> Self {
        let context = LogContext::new("serial").with_field("device", config.device.clone());
        Self {
            device: config.device.clone(),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            frame_timeout: Duration::from_millis(config.frame_timeout_ms),
            logger: get_logger_with_context(context),
        }
    }
}

impl FrameSource for SerialFrameReader {
    fn read_frame(&self) -> Result<Frame> {
        self.capture().map(|capture| capture.frame)
    }

    fn capture(&self) -> Result<Capture> {
        self.logger.debug(&format!(
            "Opening {} at {} baud (8N1, no flow control), read timeout {:?}, frame timeout {:?}",
            self.device, BAUD_RATE, self.read_timeout, self.frame_timeout
        ));

        let opening = Instant::now();
        let mut port = serialport::new(&self.device, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| PowermeterError::device_unavailable(&self.device, e.to_string()))?;
        let connection_setup = opening.elapsed();

        let frame = read_until_delimiter(
            &mut port,
            FRAME_DELIMITER,
            MAX_FRAME_BYTES,
            Instant::now() + self.frame_timeout,
        )
        .map_err(|e| PowermeterError::device_unavailable(&self.device, e.to_string()))?;

        self.logger
            .debug(&format!("Read {} bytes: {}", frame.len(), hex(&frame)));
        if frame.is_empty() {
            self.logger.warn("Meter sent no data before the read timeout");
        } else if !is_complete(&frame) {
            self.logger.warn(&format!(
                "Frame cut off after {} bytes without end-of-telegram marker",
                frame.len()
            ));
        }
        Ok(Capture {
            frame,
            connection_setup: Some(connection_setup),
        })
        // port dropped here, which closes the device
    }

    fn describe(&self) -> String {
        self.device.clone()
    }
}

/// Whether a capture ended on the delimiter or filled the byte budget
pub fn is_complete(frame: &[u8]) -> bool {
    frame.ends_with(FRAME_DELIMITER) || frame.len() >= MAX_FRAME_BYTES
}

/// Read from `reader` until `delimiter` has been received, `max_bytes` have
/// been collected or `deadline` has passed.
///
/// The returned buffer ends right after the delimiter if it was seen. Timeouts
/// and end-of-stream end the read early and return whatever was collected;
/// any other I/O error is returned and the partial data dropped.
pub fn read_until_delimiter<R: Read + ?Sized>(
    reader: &mut R,
    delimiter: &[u8],
    max_bytes: usize,
    deadline: Instant,
) -> std::io::Result<Frame> {
    let mut frame = Vec::with_capacity(max_bytes.min(1024));
    let mut chunk = [0u8; READ_CHUNK];

    while frame.len() < max_bytes {
        if Instant::now() >= deadline {
            break;
        }
        let want = READ_CHUNK.min(max_bytes - frame.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                break;
            }
            Err(e) => return Err(e),
        };

        // Only the new bytes plus a possible straddling prefix need searching
        let search_from = frame.len().saturating_sub(delimiter.len().saturating_sub(1));
        frame.extend_from_slice(&chunk[..n]);

        if !delimiter.is_empty()
            && let Some(pos) = crate::sml::find_marker(&frame[search_from..], delimiter)
        {
            frame.truncate(search_from + pos + delimiter.len());
            break;
        }
    }

    Ok(frame)
}

/// Lowercase hex dump used for debug logs
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}
