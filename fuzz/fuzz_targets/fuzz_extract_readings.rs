#![no_main]

use libfuzzer_sys::fuzz_target;
use powermeter_exporter::serial::{FRAME_DELIMITER, MAX_FRAME_BYTES, read_until_delimiter};
use powermeter_exporter::sml::extract_readings;
use std::io::Cursor;
use std::time::{Duration, Instant};

fuzz_target!(|data: &[u8]| {
    let deadline = Instant::now() + Duration::from_secs(1);
    if let Ok(frame) =
        read_until_delimiter(&mut Cursor::new(data), FRAME_DELIMITER, MAX_FRAME_BYTES, deadline)
    {
        assert!(frame.len() <= MAX_FRAME_BYTES);
        for reading in extract_readings(&frame) {
            assert!(reading.value.is_finite());
        }
    }
    let _ = extract_readings(data);
});
