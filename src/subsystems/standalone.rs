//! Log-only subsystems
//!
//! Stand-ins used when the daemon runs without real rule, statistics or
//! firewall backends attached. They accept every notification and log it.

use std::sync::{Mutex, PoisonError};

use log::{debug, info};

use crate::config::{FirewallBackend, FwOptions, ProcMonitorMethod, RulesOptions, StatsConfig};
use crate::subsystems::{
    DownstreamResult, FirewallSwitcher, LoggerManager, ProcessMonitor, RuleLoader, StatsCollector,
};

#[derive(Debug, Default)]
pub struct LogRuleLoader;

impl RuleLoader for LogRuleLoader {
    fn reload_rules(&self, options: &RulesOptions) -> DownstreamResult {
        info!(
            "Loading rules from {} (checksums: {})",
            options.path.display(),
            options.enable_checksums
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogStatsCollector;

impl StatsCollector for LogStatsCollector {
    fn apply_limits(&self, limits: &StatsConfig) -> DownstreamResult {
        info!(
            "Statistics limits: max_events={} max_stats={} workers={}",
            limits.max_events, limits.max_stats, limits.workers
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogLoggerManager;

impl LoggerManager for LogLoggerManager {
    fn name(&self) -> &str {
        "log"
    }
}

/// Accepts every method and remembers the last one
#[derive(Debug, Default)]
pub struct LogProcessMonitor {
    current: Mutex<Option<ProcMonitorMethod>>,
}

impl ProcessMonitor for LogProcessMonitor {
    fn is_available(&self, _method: ProcMonitorMethod) -> bool {
        true
    }

    fn set_method(&self, method: ProcMonitorMethod) -> DownstreamResult {
        info!("Process monitor method set to {}", method);
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(method);
        Ok(())
    }

    fn current_method(&self) -> ProcMonitorMethod {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or_default()
    }
}

/// Remembers the installed backend so identical switches are no-ops
#[derive(Debug, Default)]
pub struct LogFirewall {
    installed: Mutex<Option<(FirewallBackend, FwOptions)>>,
}

impl LogFirewall {
    pub fn installed(&self) -> Option<FirewallBackend> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(backend, _)| *backend)
    }
}

impl FirewallSwitcher for LogFirewall {
    fn switch_backend(&self, backend: FirewallBackend, options: &FwOptions) -> DownstreamResult {
        let mut installed = self.installed.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((current, current_options)) = installed.as_ref() {
            if *current == backend && current_options == options {
                debug!("Firewall backend {} already installed", backend);
                return Ok(());
            }
            info!("Removing {} firewall backend", current);
        }

        info!(
            "Installing {} firewall backend (queue {}, bypass {}, rules {})",
            backend,
            options.queue_num,
            options.queue_bypass,
            options.config_path.display()
        );
        *installed = Some((backend, options.clone()));
        Ok(())
    }
}
