use std::env;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TRACE: u8 = 0;
pub const DEBUG: u8 = 1;
pub const INFO: u8 = 2;
pub const WARN: u8 = 3;
pub const ERROR: u8 = 4;

static THRESHOLD: AtomicU8 = AtomicU8::new(INFO);

/// Reads the `WEBSERV_LOG` environment variable and sets the log threshold.
/// Unknown or absent values leave the default (info) in place.
pub fn init_from_env() {
    if let Ok(value) = env::var("WEBSERV_LOG") {
        let level = match value.to_ascii_lowercase().as_str() {
            "trace" => TRACE,
            "debug" => DEBUG,
            "info" => INFO,
            "warn" => WARN,
            "error" => ERROR,
            "off" => ERROR + 1,
            _ => return,
        };
        THRESHOLD.store(level, Ordering::Relaxed);
    }
}

pub fn enabled(level: u8) -> bool {
    level >= THRESHOLD.load(Ordering::Relaxed)
}

pub fn format_time(now: SystemTime) -> String {
    let duration = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs % 86_400 / 3_600,
        secs % 3_600 / 60,
        secs % 60
    )
}

// Days-since-epoch to calendar date (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month as u32, day as u32)
}

#[macro_export]
macro_rules! log_at {
    ($level:expr, $name:expr, $color:expr, $($arg:tt)*) => {
        if $crate::enabled($level) {
            let ts = $crate::format_time(std::time::SystemTime::now());
            println!(
                "[{}] \x1b[{}m{}\x1b[0m webserv: {}",
                ts,
                $color,
                $name,
                format!($($arg)*)
            );
        }
    };
}

#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::log_at!($crate::TRACE, "TRACE", "34", $($arg)*) }; } // Blue
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::log_at!($crate::DEBUG, "DEBUG", "36", $($arg)*) }; } // Cyan
#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::log_at!($crate::INFO, "INFO ", "32", $($arg)*) }; } // Green
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::log_at!($crate::WARN, "WARN ", "33", $($arg)*) }; } // Yellow
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::log_at!($crate::ERROR, "ERROR", "31", $($arg)*) }; } // Red

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn epoch_formats_as_1970() {
        assert_eq!(format_time(UNIX_EPOCH), "1970-01-01 00:00:00");
    }

    #[test]
    fn leap_day_is_handled() {
        // 2024-02-29 12:00:00 UTC
        let t = UNIX_EPOCH + Duration::from_secs(1_709_208_000);
        assert_eq!(format_time(t), "2024-02-29 12:00:00");
    }
}
