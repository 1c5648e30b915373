#![allow(dead_code)]

use powermeter_exporter::error::{PowermeterError, Result};
use powermeter_exporter::serial::{Frame, FrameSource};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Frame source that replays a script; `None` entries simulate an unusable
/// device. When the script runs out the last frame is repeated.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<Frame>>>,
    last: Mutex<Option<Frame>>,
    reads: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedSource {
    fn read_frame(&self) -> Result<Frame> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let entry = match next {
            Some(entry) => {
                *self.last.lock().unwrap() = entry.clone();
                entry
            }
            None => self.last.lock().unwrap().clone(),
        };
        entry.ok_or_else(|| PowermeterError::device_unavailable("/dev/scripted", "No such file or directory"))
    }

    fn describe(&self) -> String {
        "/dev/scripted".to_string()
    }
}

/// Value of the series `name` whose labels include all of `labels`
pub fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

pub const POWER_PREFIX: &[u8] = &[0x01, 0x01, 0x62, 0x1b, 0x52, 0xff, 0x55];

pub fn power_frame(value: [u8; 4]) -> Frame {
    [powermeter_exporter::sml::POWER_MARKER, POWER_PREFIX, &value[..]].concat()
}

pub fn work_frame(marker: &[u8], value: [u8; 5]) -> Frame {
    [marker, &value[..]].concat()
}
