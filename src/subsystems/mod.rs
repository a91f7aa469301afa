//! Downstream subsystems
//!
//! Contracts of the collaborators the reconciliation engine informs when a
//! published configuration changes. The engine never depends on concrete
//! implementations: the daemon wires real subsystems in, tests wire mocks,
//! and [`standalone`] provides log-only stand-ins.

pub mod host;
pub mod standalone;

use thiserror::Error;

use crate::config::{FirewallBackend, FwOptions, MonitorAvailability, ProcMonitorMethod, RulesOptions, StatsConfig};

/// A subsystem failed to converge on a new setting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{subsystem}: {message}")]
pub struct DownstreamError {
    pub subsystem: &'static str,
    pub message: String,
}

impl DownstreamError {
    pub fn new(subsystem: &'static str, message: impl Into<String>) -> Self {
        Self { subsystem, message: message.into() }
    }
}

/// Result of a downstream notification
pub type DownstreamResult = std::result::Result<(), DownstreamError>;

/// Reloads rules when the rule storage options change
#[cfg_attr(test, mockall::automock)]
pub trait RuleLoader: Send + Sync {
    fn reload_rules(&self, options: &RulesOptions) -> DownstreamResult;
}

/// Receives new retention limits and worker count
#[cfg_attr(test, mockall::automock)]
pub trait StatsCollector: Send + Sync {
    fn apply_limits(&self, limits: &StatsConfig) -> DownstreamResult;
}

/// Logger backends; the engine only holds a reference
pub trait LoggerManager: Send + Sync {
    fn name(&self) -> &str;
}

/// Connection-to-process attribution
#[cfg_attr(test, mockall::automock)]
pub trait ProcessMonitor: Send + Sync {
    /// Whether `method` can run on this host
    fn is_available(&self, method: ProcMonitorMethod) -> bool;

    /// Switch to `method`
    fn set_method(&self, method: ProcMonitorMethod) -> DownstreamResult;

    fn current_method(&self) -> ProcMonitorMethod;
}

/// Kernel interception backend management.
///
/// Implementations must be idempotent: repeated identical calls leave the
/// installed backend untouched.
#[cfg_attr(test, mockall::automock)]
pub trait FirewallSwitcher: Send + Sync {
    fn switch_backend(&self, backend: FirewallBackend, options: &FwOptions) -> DownstreamResult;
}

/// Exposes a process monitor's availability answers to the validator
pub struct MonitorProbe<'a>(pub &'a dyn ProcessMonitor);

impl MonitorAvailability for MonitorProbe<'_> {
    fn is_available(&self, method: ProcMonitorMethod) -> bool {
        self.0.is_available(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{validate, RawDocument};

    #[test]
    fn test_probe_consults_process_monitor() {
        let mut monitor = MockProcessMonitor::new();
        monitor
            .expect_is_available()
            .withf(|m| *m == ProcMonitorMethod::Ftrace)
            .return_const(false);

        let raw = RawDocument::parse(br#"{"ProcMonitorMethod":"ftrace"}"#).unwrap();
        let outcome = validate(&raw, &MonitorProbe(&monitor));
        assert_eq!(outcome.config.proc_monitor_method, ProcMonitorMethod::Proc);
    }

    #[test]
    fn test_downstream_error_display() {
        let err = DownstreamError::new("procmon", "ebpf module failed to load");
        assert_eq!(err.to_string(), "procmon: ebpf module failed to load");
    }
}
