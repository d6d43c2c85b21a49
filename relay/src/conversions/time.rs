use std::time::Duration;

use chrono::{DateTime, NaiveDateTime};

use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// Converts an entry execute time, in milliseconds since the Unix epoch, into a wall-clock time.
///
/// No time zone shift is applied: the result reads the same numbers the source server logged.
pub fn execute_time_to_datetime(millis: i64) -> RelayResult<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|datetime| datetime.naive_utc())
        .ok_or_else(|| {
            relay_error!(
                ErrorKind::ConversionError,
                "Execute time is out of range",
                format!("{millis}ms since the Unix epoch")
            )
        })
}

/// Renders an elapsed time compactly for logs.
///
/// Durations of two whole seconds or more render as `1D2H3M4S`, `2H3M4S`, `3M4S` or `4S`,
/// dropping leading zero units. Shorter ones render in milliseconds, e.g. `250ms`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total <= 1 {
        return format!("{}ms", elapsed.as_millis());
    }

    let days = total / SECONDS_PER_DAY;
    let hours = total % SECONDS_PER_DAY / SECONDS_PER_HOUR;
    let minutes = total % SECONDS_PER_HOUR / SECONDS_PER_MINUTE;
    let seconds = total % SECONDS_PER_MINUTE;

    if days > 0 {
        format!("{days}D{hours}H{minutes}M{seconds}S")
    } else if hours > 0 {
        format!("{hours}H{minutes}M{seconds}S")
    } else if minutes > 0 {
        format!("{minutes}M{seconds}S")
    } else {
        format!("{seconds}S")
    }
}
