//! Policy accessors
//!
//! Read side of the live configuration. Every call loads the current
//! reference once and reads from that snapshot, so a value is always taken
//! from one complete published configuration. Loads never block on a
//! reload in progress.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{
    Config, DefaultAction, DefaultDuration, FirewallBackend, FwOptions, ProcMonitorMethod, ServerAddress,
};

/// Cheap, cloneable reader of the live configuration
#[derive(Clone)]
pub struct Policy {
    live: Arc<ArcSwap<Config>>,
}

impl Policy {
    pub(crate) fn new(live: Arc<ArcSwap<Config>>) -> Self {
        Self { live }
    }

    pub fn proc_monitor_method(&self) -> ProcMonitorMethod {
        self.live.load().proc_monitor_method
    }

    pub fn firewall_type(&self) -> FirewallBackend {
        self.live.load().firewall
    }

    pub fn intercept_unknown(&self) -> bool {
        self.live.load().intercept_unknown
    }

    pub fn default_action(&self) -> DefaultAction {
        self.live.load().default_action
    }

    pub fn default_duration(&self) -> DefaultDuration {
        self.live.load().default_duration
    }

    pub fn server_address(&self) -> ServerAddress {
        self.live.load().server.address.clone()
    }

    pub fn fw_options(&self) -> FwOptions {
        self.live.load().fw_options.clone()
    }

    /// The whole live configuration; read several fields from one snapshot
    /// when they must be consistent with each other
    pub fn snapshot(&self) -> Arc<Config> {
        self.live.load_full()
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy").field("live", &**self.live.load()).finish()
    }
}
