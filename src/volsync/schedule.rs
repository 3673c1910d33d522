//! Scheduling interval to cron spec translation
//!
//! Intervals are `<n><unit>` with unit `m`, `h` or `d` (any case).

use crate::Error;

/// Shortest valid interval: one digit and a unit
pub const MIN_INTERVAL_LEN: usize = 2;

/// Largest day interval; a day-of-month step beyond this would skip months
pub const MAX_DAY_INTERVAL: u64 = 28;

/// Translate a scheduling interval into a cron spec
///
/// Hours are not rolled over into days, so "48h" yields an hour step that
/// cron caps at the day boundary. Counts too large for `u64` saturate, so
/// any all-digit day count still clamps to [`MAX_DAY_INTERVAL`].
pub fn to_schedule(interval: &str) -> Result<String, Error> {
    if interval.len() < MIN_INTERVAL_LEN || !interval.is_ascii() {
        return Err(Error::schedule(interval, "expected <number><m|h|d>"));
    }

    let (num, unit) = interval.split_at(interval.len() - 1);
    let digits = num.strip_prefix('+').unwrap_or(num);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::schedule(interval, format!("'{num}' is not a number")));
    }
    let n = digits.parse::<u64>().unwrap_or(u64::MAX);
    if n == 0 {
        return Err(Error::schedule(interval, "interval must be positive"));
    }

    match unit.to_ascii_lowercase().as_str() {
        "m" => Ok(format!("*/{n} * * * *")),
        "h" => Ok(format!("0 */{n} * * *")),
        "d" => Ok(format!("0 0 */{} * *", n.min(MAX_DAY_INTERVAL))),
        other => Err(Error::schedule(
            interval,
            format!("unrecognized unit '{other}'"),
        )),
    }
}
