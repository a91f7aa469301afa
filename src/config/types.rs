//! Configuration types
//!
//! This module contains the validated, strongly typed configuration that is
//! published to the rest of the daemon. Every enum here is closed: once a
//! document has been through the validator, consumers only ever see these
//! variants, never the raw strings from the file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::defaults;
use crate::config::document::RawDocument;
use crate::config::duration::{self, format_duration, parse_duration};

/// Reason a string could not be turned into a typed value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidValue(pub String);

impl InvalidValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Mechanism used to find out which process owns a connection
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProcMonitorMethod {
    /// Scan `/proc` (always available)
    Proc,
    /// eBPF kprobes
    Ebpf,
    /// Linux audit subsystem
    Audit,
    /// Kernel function tracer
    Ftrace,
}

impl ProcMonitorMethod {
    pub const ALL: [ProcMonitorMethod; 4] = [Self::Proc, Self::Ebpf, Self::Audit, Self::Ftrace];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Ebpf => "ebpf",
            Self::Audit => "audit",
            Self::Ftrace => "ftrace",
        }
    }
}

impl Default for ProcMonitorMethod {
    fn default() -> Self {
        defaults::proc_monitor_method()
    }
}

impl fmt::Display for ProcMonitorMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcMonitorMethod {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "proc" => Ok(Self::Proc),
            "ebpf" => Ok(Self::Ebpf),
            "audit" => Ok(Self::Audit),
            "ftrace" => Ok(Self::Ftrace),
            _ => Err(InvalidValue::new(format!(
                "Invalid process monitor method: {}. Valid values are: proc, ebpf, audit, ftrace",
                s
            ))),
        }
    }
}

/// Action applied to connections no rule matched
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    Allow,
    Deny,
}

impl Default for DefaultAction {
    fn default() -> Self {
        defaults::default_action()
    }
}

impl fmt::Display for DefaultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultAction::Allow => write!(f, "allow"),
            DefaultAction::Deny => write!(f, "deny"),
        }
    }
}

impl FromStr for DefaultAction {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(InvalidValue::new(format!(
                "Invalid default action: {}. Valid values are: allow, deny",
                s
            ))),
        }
    }
}

/// Lifetime of a rule created from the default action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefaultDuration {
    /// Applies to the current connection only
    Once,
    /// Lasts while the UI session is connected
    Session,
    /// Kept until the daemon restarts
    UntilRestart,
    /// Expires after a fixed interval
    Timed(Duration),
}

impl Default for DefaultDuration {
    fn default() -> Self {
        defaults::default_duration()
    }
}

impl fmt::Display for DefaultDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultDuration::Once => write!(f, "once"),
            DefaultDuration::Session => write!(f, "session"),
            DefaultDuration::UntilRestart => write!(f, "until restart"),
            DefaultDuration::Timed(d) => write!(f, "{}", format_duration(*d)),
        }
    }
}

impl FromStr for DefaultDuration {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "once" => return Ok(Self::Once),
            "session" => return Ok(Self::Session),
            "until restart" | "until-restart" => return Ok(Self::UntilRestart),
            _ => {}
        }

        let timed = parse_duration(&normalized).map_err(|_| {
            InvalidValue::new(format!(
                "Invalid default duration: {}. Valid values are: once, session, until restart, or a duration such as 30s, 5m, 1h",
                s
            ))
        })?;

        if timed.is_zero() || timed > defaults::MAX_TIMED_DURATION {
            return Err(InvalidValue::new(format!(
                "Timed duration {} must be greater than zero and at most {}",
                s,
                format_duration(defaults::MAX_TIMED_DURATION)
            )));
        }

        Ok(Self::Timed(timed))
    }
}

impl Serialize for DefaultDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Firewall backend that programs kernel interception
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FirewallBackend {
    Iptables,
    Nftables,
}

impl FirewallBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallBackend::Iptables => "iptables",
            FirewallBackend::Nftables => "nftables",
        }
    }
}

impl Default for FirewallBackend {
    fn default() -> Self {
        defaults::firewall()
    }
}

impl fmt::Display for FirewallBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FirewallBackend {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iptables" => Ok(Self::Iptables),
            "nftables" => Ok(Self::Nftables),
            _ => Err(InvalidValue::new(format!(
                "Invalid firewall backend: {}. Valid values are: iptables, nftables",
                s
            ))),
        }
    }
}

/// Transport of the UI channel address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// `unix:///absolute/path`
    Unix,
    /// `host:port`
    Tcp,
}

/// Address the daemon uses to reach the UI
///
/// Cloning is a reference count bump, so accessors can hand it out freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    raw: Arc<str>,
    kind: AddressKind,
}

impl ServerAddress {
    pub(crate) fn from_static_unix(raw: &'static str) -> Self {
        Self { raw: Arc::from(raw), kind: AddressKind::Unix }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    /// Socket path for `unix://` addresses
    pub fn unix_path(&self) -> Option<&Path> {
        match self.kind {
            AddressKind::Unix => self.raw.strip_prefix("unix://").map(Path::new),
            AddressKind::Tcp => None,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for ServerAddress {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(InvalidValue::new("empty server address"));
        }
        if s.chars().any(|c| c.is_whitespace() || c == '\0') {
            return Err(InvalidValue::new(format!("server address '{}' contains whitespace", s)));
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if !path.starts_with('/') || path.len() < 2 {
                return Err(InvalidValue::new(format!(
                    "unix socket address '{}' must name an absolute path",
                    s
                )));
            }
            return Ok(Self { raw: Arc::from(s), kind: AddressKind::Unix });
        }

        if s.contains("://") {
            return Err(InvalidValue::new(format!(
                "unsupported address scheme in '{}' (expected unix:// or host:port)",
                s
            )));
        }

        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidValue::new(format!("server address '{}' is missing a port", s)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(InvalidValue::new(format!("server address '{}' is missing a host", s)));
        }
        match port.parse::<u16>() {
            Ok(p) if p > 0 => Ok(Self { raw: Arc::from(s), kind: AddressKind::Tcp }),
            _ => Err(InvalidValue::new(format!("invalid port '{}' in server address '{}'", port, s))),
        }
    }
}

impl Serialize for ServerAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

/// UI channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    #[serde(rename = "Address")]
    pub address: ServerAddress,
}

/// Firewall backend options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FwOptions {
    /// System firewall rules file handed to the backend
    #[serde(rename = "ConfigPath")]
    pub config_path: PathBuf,

    /// How often the backend verifies its rules are still installed
    #[serde(rename = "MonitorInterval", serialize_with = "duration::serialize")]
    pub monitor_interval: Duration,

    /// Netfilter queue the daemon reads intercepted packets from
    #[serde(rename = "QueueNum")]
    pub queue_num: u16,

    /// Let packets through when no process is listening on the queue
    #[serde(rename = "QueueBypass")]
    pub queue_bypass: bool,
}

/// Rule storage options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RulesOptions {
    #[serde(rename = "Path")]
    pub path: PathBuf,

    #[serde(rename = "EnableChecksums")]
    pub enable_checksums: bool,
}

/// Statistics retention limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsConfig {
    #[serde(rename = "MaxEvents")]
    pub max_events: usize,

    #[serde(rename = "MaxStats")]
    pub max_stats: usize,

    #[serde(rename = "Workers")]
    pub workers: usize,
}

/// Internal tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InternalOptions {
    #[serde(rename = "GCPercent")]
    pub gc_percent: u32,

    #[serde(rename = "FlushConnsOnStart")]
    pub flush_conns_on_start: bool,
}

/// Validated daemon configuration
///
/// Instances are immutable once published: a reload builds a new value and
/// swaps the shared reference, it never edits fields of a live instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    #[serde(rename = "Server")]
    pub server: ServerConfig,

    #[serde(rename = "ProcMonitorMethod")]
    pub proc_monitor_method: ProcMonitorMethod,

    #[serde(rename = "DefaultAction")]
    pub default_action: DefaultAction,

    #[serde(rename = "DefaultDuration")]
    pub default_duration: DefaultDuration,

    #[serde(rename = "InterceptUnknown")]
    pub intercept_unknown: bool,

    #[serde(rename = "Firewall")]
    pub firewall: FirewallBackend,

    #[serde(rename = "FwOptions")]
    pub fw_options: FwOptions,

    #[serde(rename = "Rules")]
    pub rules: RulesOptions,

    #[serde(rename = "Stats")]
    pub stats: StatsConfig,

    #[serde(rename = "Internal")]
    pub internal: InternalOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: defaults::server_address() }
    }
}

impl Default for FwOptions {
    fn default() -> Self {
        Self {
            config_path: defaults::fw_config_path(),
            monitor_interval: defaults::MONITOR_INTERVAL,
            queue_num: defaults::QUEUE_NUM,
            queue_bypass: defaults::QUEUE_BYPASS,
        }
    }
}

impl Default for RulesOptions {
    fn default() -> Self {
        Self {
            path: defaults::rules_path(),
            enable_checksums: defaults::ENABLE_CHECKSUMS,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            max_events: defaults::MAX_EVENTS,
            max_stats: defaults::MAX_STATS,
            workers: defaults::WORKERS,
        }
    }
}

impl Default for InternalOptions {
    fn default() -> Self {
        Self {
            gc_percent: defaults::GC_PERCENT,
            flush_conns_on_start: defaults::FLUSH_CONNS_ON_START,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            proc_monitor_method: ProcMonitorMethod::default(),
            default_action: DefaultAction::default(),
            default_duration: DefaultDuration::default(),
            intercept_unknown: defaults::INTERCEPT_UNKNOWN,
            firewall: FirewallBackend::default(),
            fw_options: FwOptions::default(),
            rules: RulesOptions::default(),
            stats: StatsConfig::default(),
            internal: InternalOptions::default(),
        }
    }
}

impl Config {
    /// All-defaults configuration reaching the UI at `address`
    pub fn with_server_address(address: ServerAddress) -> Self {
        Self {
            server: ServerConfig { address },
            ..Self::default()
        }
    }

    /// Render every field as a raw document, using the on-disk key names
    pub fn to_document(&self) -> RawDocument {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => RawDocument::from_map(map),
            // Config serialises to an object by construction
            _ => RawDocument::default(),
        }
    }

    /// Log the configuration
    pub fn log(&self) {
        use log::debug;

        debug!("=== Configuration ===");
        debug!("  Server address: {}", self.server.address);
        debug!("  Process monitor method: {}", self.proc_monitor_method);
        debug!("  Default action: {}", self.default_action);
        debug!("  Default duration: {}", self.default_duration);
        debug!("  Intercept unknown: {}", self.intercept_unknown);
        debug!("  Firewall: {}", self.firewall);
        debug!("  Firewall config: {}", self.fw_options.config_path.display());
        debug!("  Firewall monitor interval: {}", format_duration(self.fw_options.monitor_interval));
        debug!("  Queue: {} (bypass: {})", self.fw_options.queue_num, self.fw_options.queue_bypass);
        debug!("  Rules: {} (checksums: {})", self.rules.path.display(), self.rules.enable_checksums);
        debug!(
            "  Stats: max_events={} max_stats={} workers={}",
            self.stats.max_events, self.stats.max_stats, self.stats.workers
        );
        debug!(
            "  Internal: gc_percent={} flush_conns_on_start={}",
            self.internal.gc_percent, self.internal.flush_conns_on_start
        );
        debug!("=====================");
    }
}
