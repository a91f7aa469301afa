//! Configuration validator
//!
//! Turns a raw document into a typed [`Config`]. Validation never fails:
//! every field is judged on its own and an invalid value is replaced by its
//! documented default (or clamped into range), with a [`Fallback`] record
//! describing the substitution. The validator performs no I/O and no
//! logging; the caller decides what to do with the records.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::config::defaults;
use crate::config::document::{fields, RawDocument};
use crate::config::duration::{format_duration, parse_duration};
use crate::config::types::{
    Config, FwOptions, InternalOptions, ProcMonitorMethod, RulesOptions, ServerAddress, ServerConfig,
    StatsConfig,
};

/// Answers whether a process monitor method can run on this host
#[cfg_attr(test, mockall::automock)]
pub trait MonitorAvailability {
    fn is_available(&self, method: ProcMonitorMethod) -> bool;
}

/// Availability check that accepts every method
#[derive(Debug, Clone, Copy, Default)]
pub struct AllMethodsAvailable;

impl MonitorAvailability for AllMethodsAvailable {
    fn is_available(&self, _method: ProcMonitorMethod) -> bool {
        true
    }
}

/// Why a submitted value was replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Not one of the enum's variants
    UnknownVariant,
    /// A recognised process monitor method that cannot run on this host
    Unavailable,
    /// JSON type does not match the field
    WrongType { expected: &'static str },
    /// Integer outside its documented range (clamped)
    OutOfRange { min: i64, max: i64 },
    /// Duration outside its documented range (clamped)
    DurationOutOfRange { min: Duration, max: Duration },
    /// Value of the right type that does not parse
    Malformed(String),
    /// Empty string where a value is required
    Empty,
    /// A section that is not a JSON object
    NotAnObject,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::UnknownVariant => write!(f, "unknown value"),
            FallbackReason::Unavailable => write!(f, "not available on this host"),
            FallbackReason::WrongType { expected } => write!(f, "expected {}", expected),
            FallbackReason::OutOfRange { min, max } => write!(f, "out of range [{}, {}]", min, max),
            FallbackReason::DurationOutOfRange { min, max } => write!(
                f,
                "out of range [{}, {}]",
                format_duration(*min),
                format_duration(*max)
            ),
            FallbackReason::Malformed(message) => write!(f, "{}", message),
            FallbackReason::Empty => write!(f, "empty value"),
            FallbackReason::NotAnObject => write!(f, "expected an object"),
        }
    }
}

/// One field that did not load as submitted
#[derive(Debug, Clone, PartialEq)]
pub struct Fallback {
    /// Dotted path of the field (see [`fields`])
    pub field: &'static str,
    pub submitted: Value,
    pub substituted: Value,
    pub reason: FallbackReason,
}

impl fmt::Display for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: submitted {}, using {} ({})",
            self.field, self.submitted, self.substituted, self.reason
        )
    }
}

/// Result of validating a raw document
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub config: Config,
    /// Substitutions in document order; empty when everything loaded as submitted
    pub fallbacks: Vec<Fallback>,
}

impl ValidationOutcome {
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty()
    }

    /// `raw` with every fallen-back field replaced by its substitute
    pub fn corrected(&self, raw: &RawDocument) -> RawDocument {
        raw.with_fallbacks(&self.fallbacks)
    }
}

/// Validate with the standard default address
pub fn validate(raw: &RawDocument, availability: &dyn MonitorAvailability) -> ValidationOutcome {
    Validator::new(availability).validate(raw)
}

/// Field-by-field validator
pub struct Validator<'a> {
    availability: &'a dyn MonitorAvailability,
    default_address: ServerAddress,
}

impl<'a> Validator<'a> {
    pub fn new(availability: &'a dyn MonitorAvailability) -> Self {
        Self {
            availability,
            default_address: defaults::server_address(),
        }
    }

    /// Address substituted when `Server.Address` is missing or invalid
    pub fn with_default_address(mut self, address: ServerAddress) -> Self {
        self.default_address = address;
        self
    }

    pub fn validate(&self, raw: &RawDocument) -> ValidationOutcome {
        let fallback_config = Config::with_server_address(self.default_address.clone());
        let fallback_doc = fallback_config.to_document();
        let mut c = Checker {
            raw,
            defaults: &fallback_doc,
            fallbacks: Vec::new(),
        };

        c.section(fields::SERVER);
        let server = ServerConfig {
            address: c.server_address(fields::SERVER_ADDRESS, &self.default_address),
        };

        let proc_monitor_method = self.proc_monitor_method(&mut c);
        let default_action = c.enumeration(fields::DEFAULT_ACTION, defaults::default_action());
        let default_duration = c.enumeration(fields::DEFAULT_DURATION, defaults::default_duration());
        let intercept_unknown = c.boolean(fields::INTERCEPT_UNKNOWN, defaults::INTERCEPT_UNKNOWN);
        let firewall = c.enumeration(fields::FIREWALL, defaults::firewall());

        c.section(fields::FW_OPTIONS);
        let fw_options = FwOptions {
            config_path: c.path(fields::FW_CONFIG_PATH, defaults::fw_config_path()),
            monitor_interval: c.duration(
                fields::FW_MONITOR_INTERVAL,
                defaults::MONITOR_INTERVAL,
                defaults::MIN_MONITOR_INTERVAL..=defaults::MAX_MONITOR_INTERVAL,
            ),
            queue_num: c.integer(fields::FW_QUEUE_NUM, defaults::QUEUE_NUM, defaults::QUEUE_NUM_RANGE),
            queue_bypass: c.boolean(fields::FW_QUEUE_BYPASS, defaults::QUEUE_BYPASS),
        };

        c.section(fields::RULES);
        let rules = RulesOptions {
            path: c.path(fields::RULES_PATH, defaults::rules_path()),
            enable_checksums: c.boolean(fields::RULES_ENABLE_CHECKSUMS, defaults::ENABLE_CHECKSUMS),
        };

        c.section(fields::STATS);
        let stats = StatsConfig {
            max_events: c.integer(fields::STATS_MAX_EVENTS, defaults::MAX_EVENTS, defaults::MAX_EVENTS_RANGE),
            max_stats: c.integer(fields::STATS_MAX_STATS, defaults::MAX_STATS, defaults::MAX_STATS_RANGE),
            workers: c.integer(fields::STATS_WORKERS, defaults::WORKERS, defaults::WORKERS_RANGE),
        };

        c.section(fields::INTERNAL);
        let internal = InternalOptions {
            gc_percent: c.integer(fields::INTERNAL_GC_PERCENT, defaults::GC_PERCENT, defaults::GC_PERCENT_RANGE),
            flush_conns_on_start: c.boolean(fields::INTERNAL_FLUSH_CONNS_ON_START, defaults::FLUSH_CONNS_ON_START),
        };

        ValidationOutcome {
            config: Config {
                server,
                proc_monitor_method,
                default_action,
                default_duration,
                intercept_unknown,
                firewall,
                fw_options,
                rules,
                stats,
                internal,
            },
            fallbacks: c.fallbacks,
        }
    }

    fn proc_monitor_method(&self, c: &mut Checker<'_>) -> ProcMonitorMethod {
        let fallback = defaults::proc_monitor_method();
        let method = c.enumeration(fields::PROC_MONITOR_METHOD, fallback);
        if method == fallback || self.availability.is_available(method) {
            return method;
        }

        let submitted = c.submitted(fields::PROC_MONITOR_METHOD);
        c.record(
            fields::PROC_MONITOR_METHOD,
            submitted,
            Value::String(fallback.to_string()),
            FallbackReason::Unavailable,
        );
        fallback
    }
}

/// Per-run state: the document being judged and the records so far
struct Checker<'d> {
    raw: &'d RawDocument,
    defaults: &'d RawDocument,
    fallbacks: Vec<Fallback>,
}

impl<'d> Checker<'d> {
    /// Present and not null
    fn value(&self, path: &str) -> Option<&'d Value> {
        self.raw.get(path).filter(|v| !v.is_null())
    }

    fn submitted(&self, path: &str) -> Value {
        self.raw.get(path).cloned().unwrap_or(Value::Null)
    }

    fn record(&mut self, field: &'static str, submitted: Value, substituted: Value, reason: FallbackReason) {
        self.fallbacks.push(Fallback { field, submitted, substituted, reason });
    }

    fn section(&mut self, path: &'static str) {
        if let Some(value) = self.value(path) {
            if !value.is_object() {
                let substituted = self.defaults.get(path).cloned().unwrap_or(Value::Null);
                self.record(path, value.clone(), substituted, FallbackReason::NotAnObject);
            }
        }
    }

    fn enumeration<T>(&mut self, path: &'static str, default: T) -> T
    where
        T: FromStr + fmt::Display,
    {
        let Some(value) = self.value(path) else {
            return default;
        };
        let reason = match value.as_str().map(str::parse::<T>) {
            Some(Ok(parsed)) => return parsed,
            Some(Err(_)) => FallbackReason::UnknownVariant,
            None => FallbackReason::WrongType { expected: "string" },
        };
        self.record(path, value.clone(), Value::String(default.to_string()), reason);
        default
    }

    fn boolean(&mut self, path: &'static str, default: bool) -> bool {
        let Some(value) = self.value(path) else {
            return default;
        };
        if let Some(b) = value.as_bool() {
            return b;
        }
        self.record(path, value.clone(), Value::Bool(default), FallbackReason::WrongType { expected: "bool" });
        default
    }

    fn integer<T>(&mut self, path: &'static str, default: T, range: RangeInclusive<i64>) -> T
    where
        T: TryFrom<i64> + Into<Value> + Copy,
    {
        let Some(value) = self.value(path) else {
            return default;
        };

        let (min, max) = (*range.start(), *range.end());
        let submitted = match (value.as_i64(), value.as_u64()) {
            (Some(n), _) => n,
            // Larger than i64::MAX
            (None, Some(_)) => i64::MAX,
            (None, None) => {
                self.record(path, value.clone(), default.into(), FallbackReason::WrongType { expected: "integer" });
                return default;
            }
        };

        let clamped = submitted.clamp(min, max);
        let Ok(result) = T::try_from(clamped) else {
            self.record(path, value.clone(), default.into(), FallbackReason::OutOfRange { min, max });
            return default;
        };
        if clamped != submitted {
            self.record(path, value.clone(), result.into(), FallbackReason::OutOfRange { min, max });
        }
        result
    }

    fn duration(&mut self, path: &'static str, default: Duration, range: RangeInclusive<Duration>) -> Duration {
        let Some(value) = self.value(path) else {
            return default;
        };
        let Some(text) = value.as_str() else {
            self.record(
                path,
                value.clone(),
                Value::String(format_duration(default)),
                FallbackReason::WrongType { expected: "duration string" },
            );
            return default;
        };

        match parse_duration(text) {
            Ok(d) => {
                let (min, max) = (*range.start(), *range.end());
                let clamped = d.clamp(min, max);
                if clamped != d {
                    self.record(
                        path,
                        value.clone(),
                        Value::String(format_duration(clamped)),
                        FallbackReason::DurationOutOfRange { min, max },
                    );
                }
                clamped
            }
            Err(e) => {
                self.record(
                    path,
                    value.clone(),
                    Value::String(format_duration(default)),
                    FallbackReason::Malformed(e.to_string()),
                );
                default
            }
        }
    }

    fn path(&mut self, path: &'static str, default: PathBuf) -> PathBuf {
        let Some(value) = self.value(path) else {
            return default;
        };
        let substituted = Value::String(default.to_string_lossy().into_owned());
        let reason = match value.as_str() {
            Some(s) if s.trim().is_empty() => FallbackReason::Empty,
            Some(s) if s.contains('\0') => FallbackReason::Malformed("path contains a NUL byte".to_string()),
            Some(s) => return PathBuf::from(s),
            None => FallbackReason::WrongType { expected: "string" },
        };
        self.record(path, value.clone(), substituted, reason);
        default
    }

    fn server_address(&mut self, path: &'static str, default: &ServerAddress) -> ServerAddress {
        let Some(value) = self.value(path) else {
            return default.clone();
        };
        let reason = match value.as_str() {
            Some(s) if s.trim().is_empty() => FallbackReason::Empty,
            Some(s) => match s.parse::<ServerAddress>() {
                Ok(address) => return address,
                Err(e) => FallbackReason::Malformed(e.to_string()),
            },
            None => FallbackReason::WrongType { expected: "string" },
        };
        self.record(path, value.clone(), Value::String(default.to_string()), reason);
        default.clone()
    }
}
