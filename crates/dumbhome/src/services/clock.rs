//! Clock and date formatting.
//!
//! Pure formatting from the two clock preferences; the caller passes the
//! moment in so tests control it. Redraw cadence is the caller's concern
//! (once a minute, or once a second when seconds are shown).

use chrono::{DateTime, Datelike, TimeZone};

/// Strftime pattern for the given clock preferences.
fn time_pattern(use_24_hour: bool, show_seconds: bool) -> &'static str {
    match (use_24_hour, show_seconds) {
        (true, false) => "%H:%M",
        (true, true) => "%H:%M:%S",
        (false, false) => "%I:%M %p",
        (false, true) => "%I:%M:%S %p",
    }
}

/// The home-screen time line.
pub fn format_time<Tz: TimeZone>(
    now: &DateTime<Tz>,
    use_24_hour: bool,
    show_seconds: bool,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format(time_pattern(use_24_hour, show_seconds)).to_string()
}

/// The home-screen date line, e.g. `Wed, 26 Aug 2026`.
pub fn format_date<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    // %-d would also work but is strftime-dialect dependent; day() is not.
    format!(
        "{}, {} {}",
        now.format("%a"),
        now.day(),
        now.format("%b %Y")
    )
}

/// Seconds until the display next changes. Drives the redraw timer.
pub fn seconds_until_next_tick<Tz: TimeZone>(now: &DateTime<Tz>, show_seconds: bool) -> u64 {
    if show_seconds {
        1
    } else {
        use chrono::Timelike;
        60 - u64::from(now.second()).min(59)
    }
}
