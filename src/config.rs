//! Tunables for the scan lifecycle and the event bus.

use std::time::Duration;

/// Maximum scan starts permitted within [`START_WINDOW`].
pub const MAX_STARTS: usize = 4;
/// Sliding window for start throttling.
pub const START_WINDOW: Duration = Duration::from_millis(30_000);
/// How long a scan runs before it is stopped and started again.
pub const RESTART_INTERVAL: Duration = Duration::from_millis(240_000);
/// Pause between stopping a scan and starting the next one.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Back-off after the radio driver refuses to start.
pub const DRIVER_RETRY: Duration = Duration::from_secs(5);
/// Timeout requested when acquiring the wake hold. Renewed on every restart.
pub const WAKE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// Upper bound on how long shutdown waits for the radio to stop.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Event bus capacity.
pub const BUS_CAPACITY: usize = 1024;
/// Largest accepted event bus capacity.
pub const MAX_BUS_CAPACITY: usize = 1 << 16;

/// Scan lifecycle and bus configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub max_starts: usize,
    pub window: Duration,
    pub restart_interval: Duration,
    pub settle_delay: Duration,
    pub driver_retry: Duration,
    pub wake_timeout: Duration,
    pub stop_timeout: Duration,
    pub bus_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_starts: MAX_STARTS,
            window: START_WINDOW,
            restart_interval: RESTART_INTERVAL,
            settle_delay: SETTLE_DELAY,
            driver_retry: DRIVER_RETRY,
            wake_timeout: WAKE_TIMEOUT,
            stop_timeout: STOP_TIMEOUT,
            bus_capacity: BUS_CAPACITY,
        }
    }
}

type Unit = fn(u64) -> Option<Duration>;

fn seconds(n: u64) -> Option<Duration> {
    Some(Duration::from_secs(n))
}

/// Parse a duration from a human-readable string.
///
/// Accepts `ms`, `s`, `m` and `h` suffixes; a bare number is seconds.
///
/// # Examples
/// ```
/// use beacon_telemetry::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("4m").unwrap(), Duration::from_secs(240));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" has to be tried before "m" and "s".
    let units: [(&str, Unit); 4] = [
        ("ms", |n| Some(Duration::from_millis(n))),
        ("h", |n| n.checked_mul(3600).map(Duration::from_secs)),
        ("m", |n| n.checked_mul(60).map(Duration::from_secs)),
        ("s", seconds),
    ];

    let (number, to_duration): (&str, Unit) = units
        .iter()
        .find_map(|&(suffix, f)| src.strip_suffix(suffix).map(|n| (n, f)))
        .unwrap_or((src, seconds as Unit));

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    to_duration(value).ok_or_else(|| format!("duration out of range: {src}"))
}

/// Parse a bus capacity between 1 and [`MAX_BUS_CAPACITY`].
pub fn parse_capacity(src: &str) -> Result<usize, String> {
    match src.trim().parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(n) if n > MAX_BUS_CAPACITY => {
            Err(format!("capacity must be at most {MAX_BUS_CAPACITY}"))
        }
        Ok(n) => Ok(n),
        Err(_) => Err(format!("invalid capacity: {src}")),
    }
}
