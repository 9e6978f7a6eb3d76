//! Presentation time helpers.
//!
//! All times in this crate are microseconds unless noted otherwise.

use crate::utils::errors::FilterLoadError;

/// Presentation time in microseconds.
pub type Mtime = i64;

/// One SPU date tick (1024 cycles of the 90 kHz clock) in
/// microseconds, rounded the way players do.
pub const SPU_DATE_SCALE: Mtime = 11_000;

/// Display time assumed when a packet never issues a stop command.
pub const DEFAULT_DISPLAY_TIME: Mtime = 500 * SPU_DATE_SCALE;

/// Formats a time as an SRT timestamp, `hh:mm:ss,mmm`.
///
/// Microseconds are rounded to the nearest millisecond.
pub fn srt_time(time: Mtime) -> String {
    let ms = (time + 500) / 1000;
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let milliseconds = ms % 1000;

    format!("{hours:02}:{minutes:02}:{seconds:02},{milliseconds:03}")
}

/// Parses an SRT timestamp back into microseconds.
pub fn parse_srt_time(text: &str) -> Result<Mtime, FilterLoadError> {
    let bad = || FilterLoadError::BadTime(text.to_string());

    let mut parts = text.trim().splitn(3, ':');
    let hours: Mtime = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(bad)?;
    let minutes: Mtime = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(bad)?;

    let (seconds_text, ms_text) = parts
        .next()
        .and_then(|s| s.split_once(','))
        .ok_or_else(bad)?;
    let seconds: Mtime = seconds_text.parse().map_err(|_| bad())?;
    let milliseconds: Mtime = ms_text.parse().map_err(|_| bad())?;

    if hours < 0
        || !(0..60).contains(&minutes)
        || !(0..60).contains(&seconds)
        || !(0..1000).contains(&milliseconds)
    {
        return Err(bad());
    }

    Ok((((hours * 60 + minutes) * 60 + seconds) * 1000 + milliseconds) * 1000)
}

#[test]
fn srt_time_formats_and_parses() -> Result<(), FilterLoadError> {
    assert_eq!(srt_time(0), "00:00:00,000");
    assert_eq!(srt_time(3_661_042_000), "01:01:01,042");
    // Rounds to nearest millisecond.
    assert_eq!(srt_time(1_500), "00:00:00,002");

    assert_eq!(parse_srt_time("01:01:01,042")?, 3_661_042_000);
    assert_eq!(parse_srt_time("00:00:00,000")?, 0);

    assert!(parse_srt_time("00:61:00,000").is_err());
    assert!(parse_srt_time("-1:02:03,004").is_err());
    assert!(parse_srt_time("garbage").is_err());
    assert!(parse_srt_time("00:00:00.000").is_err());

    Ok(())
}

#[test]
fn default_display_time() {
    assert_eq!(DEFAULT_DISPLAY_TIME, 5_500_000);
    assert_eq!(srt_time(DEFAULT_DISPLAY_TIME), "00:00:05,500");
}
