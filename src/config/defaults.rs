//! Default configuration values
//!
//! This module is the single source of truth for defaults and for the ranges
//! numeric fields are clamped to. The validator substitutes these values
//! when a field is missing or invalid.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use super::types::{DefaultAction, DefaultDuration, FirewallBackend, ProcMonitorMethod, ServerAddress};

/// Environment variable prefix for daemon options
pub const ENV_PREFIX: &str = "POLICYD_";

/// Default configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/etc/policyd/default-config.json";

/// Default UI socket address as string
pub const SERVER_ADDRESS_STR: &str = "unix:///tmp/osui.sock";

/// Default system firewall rules file
pub const FW_CONFIG_PATH_STR: &str = "/etc/policyd/system-fw.json";

/// Default rules directory
pub const RULES_PATH_STR: &str = "/etc/policyd/rules";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

pub const INTERCEPT_UNKNOWN: bool = false;
pub const QUEUE_NUM: u16 = 0;
pub const QUEUE_BYPASS: bool = true;
pub const ENABLE_CHECKSUMS: bool = false;
pub const MAX_EVENTS: usize = 150;
pub const MAX_STATS: usize = 25;
pub const WORKERS: usize = 6;
pub const GC_PERCENT: u32 = 100;
pub const FLUSH_CONNS_ON_START: bool = true;

/// Firewall monitor interval
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(15);

// Documented ranges. Out-of-range integers are clamped to the nearest bound.

pub const QUEUE_NUM_RANGE: RangeInclusive<i64> = 0..=65_535;
pub const MAX_EVENTS_RANGE: RangeInclusive<i64> = 1..=100_000;
pub const MAX_STATS_RANGE: RangeInclusive<i64> = 1..=10_000;
pub const WORKERS_RANGE: RangeInclusive<i64> = 1..=128;
pub const GC_PERCENT_RANGE: RangeInclusive<i64> = 0..=1_000;

pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_MONITOR_INTERVAL: Duration = Duration::from_secs(3600);

/// Longest lifetime a timed default duration may request
pub const MAX_TIMED_DURATION: Duration = Duration::from_secs(24 * 3600);

// Watcher tuning

/// Poll interval used when the caller does not pick one
pub const WATCH_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest poll interval the watcher accepts
pub const MIN_WATCH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Window in which successive writes collapse into one reload
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Capacity of the watch event channel
pub const WATCH_CHANNEL_CAPACITY: usize = 16;

/// Default UI socket address
pub fn server_address() -> ServerAddress {
    ServerAddress::from_static_unix(SERVER_ADDRESS_STR)
}

/// Universally supported process monitor
pub fn proc_monitor_method() -> ProcMonitorMethod {
    ProcMonitorMethod::Proc
}

/// Conservative default action
pub fn default_action() -> DefaultAction {
    DefaultAction::Deny
}

/// Shortest-lived default duration
pub fn default_duration() -> DefaultDuration {
    DefaultDuration::Once
}

/// Most broadly compatible firewall backend
pub fn firewall() -> FirewallBackend {
    FirewallBackend::Iptables
}

/// Default system firewall rules file
pub fn fw_config_path() -> PathBuf {
    PathBuf::from(FW_CONFIG_PATH_STR)
}

/// Default rules directory
pub fn rules_path() -> PathBuf {
    PathBuf::from(RULES_PATH_STR)
}
