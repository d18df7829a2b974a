//! Captured-frame value type and capture timestamp formatting.
//!
//! A frame is one encoded image plus the wall-clock second it was taken.
//! The timestamp is correlation metadata for logs and alerts; nothing orders
//! or expires by it. Frames are immutable once enqueued, and the queue may
//! deliver the same frame more than once.

use anyhow::Result;

use crate::now_s;

/// One sampled frame on its way through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedFrame {
    /// UTC capture time, `YYYY-MM-DDTHH:MM:SSZ`.
    pub captured_at: String,
    /// Encoded image bytes (JPEG or PNG), verbatim from the source.
    pub payload: Vec<u8>,
}

impl CapturedFrame {
    /// Stamp `payload` with the current wall-clock second.
    pub fn stamp_now(payload: Vec<u8>) -> Result<Self> {
        Ok(Self {
            captured_at: format_utc(now_s()?),
            payload,
        })
    }
}

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Plain proleptic-Gregorian arithmetic; no leap seconds, which is fine for
/// a correlation timestamp.
pub fn format_utc(epoch_s: u64) -> String {
    let days = (epoch_s / 86_400) as i64;
    let secs_of_day = epoch_s % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        secs_of_day / 3600,
        (secs_of_day / 60) % 60,
        secs_of_day % 60
    )
}

// Days-since-epoch to calendar date, after Howard Hinnant's civil_from_days.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_start_formats_as_1970() {
        assert_eq!(format_utc(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn known_instants_format_correctly() {
        // 2024-01-01T00:00:00Z
        assert_eq!(format_utc(1_704_067_200), "2024-01-01T00:00:00Z");
        // 2023-03-01T12:30:45Z, the day after a leap-year boundary check
        assert_eq!(format_utc(1_677_673_845), "2023-03-01T12:30:45Z");
        // 2000-02-29T23:59:59Z, century leap day
        assert_eq!(format_utc(951_868_799), "2000-02-29T23:59:59Z");
    }

    #[test]
    fn stamped_frame_carries_payload_verbatim() {
        let frame = CapturedFrame::stamp_now(vec![1, 2, 3]).unwrap();
        assert_eq!(frame.payload, vec![1, 2, 3]);
        assert_eq!(frame.captured_at.len(), 20);
        assert!(frame.captured_at.ends_with('Z'));
    }
}
