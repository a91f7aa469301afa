//! Client builder
//!
//! Collaborators default to the log-only stand-ins, so a client can be built
//! with nothing but a socket address and a file path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use crate::client::{Client, Collaborators};
use crate::common::{PolicyError, Result};
use crate::config::{ConfigStore, JsonFileStore, ServerAddress, WatcherOptions};
use crate::subsystems::standalone::{
    LogFirewall, LogLoggerManager, LogProcessMonitor, LogRuleLoader, LogStatsCollector,
};
use crate::subsystems::{FirewallSwitcher, LoggerManager, ProcessMonitor, RuleLoader, StatsCollector};

/// Engine behaviour switches
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Write corrected documents back to the store when a field fell back
    pub persist_fallbacks: bool,
    pub watcher: WatcherOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            persist_fallbacks: true,
            watcher: WatcherOptions::default(),
        }
    }
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    socket_address: String,
    config_path: PathBuf,
    store: Option<Arc<dyn ConfigStore>>,
    rules: Arc<dyn RuleLoader>,
    stats: Arc<dyn StatsCollector>,
    loggers: Arc<dyn LoggerManager>,
    procmon: Arc<dyn ProcessMonitor>,
    firewall: Arc<dyn FirewallSwitcher>,
    options: ClientOptions,
}

impl ClientBuilder {
    pub(crate) fn new<P: AsRef<Path>>(socket_address: &str, config_path: P) -> Self {
        Self {
            socket_address: socket_address.to_string(),
            config_path: config_path.as_ref().to_path_buf(),
            store: None,
            rules: Arc::new(LogRuleLoader),
            stats: Arc::new(LogStatsCollector),
            loggers: Arc::new(LogLoggerManager),
            procmon: Arc::new(LogProcessMonitor::default()),
            firewall: Arc::new(LogFirewall::default()),
            options: ClientOptions::default(),
        }
    }

    pub fn rules(mut self, rules: Arc<dyn RuleLoader>) -> Self {
        self.rules = rules;
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    pub fn loggers(mut self, loggers: Arc<dyn LoggerManager>) -> Self {
        self.loggers = loggers;
        self
    }

    pub fn process_monitor(mut self, procmon: Arc<dyn ProcessMonitor>) -> Self {
        self.procmon = procmon;
        self
    }

    pub fn firewall(mut self, firewall: Arc<dyn FirewallSwitcher>) -> Self {
        self.firewall = firewall;
        self
    }

    /// Replace the JSON file store (the config path is then unused)
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn persist_fallbacks(mut self, persist: bool) -> Self {
        self.options.persist_fallbacks = persist;
        self
    }

    /// Build the client and run the initial reconciliation
    pub fn build(self) -> Result<Client> {
        let default_address: ServerAddress = self
            .socket_address
            .parse()
            .map_err(|e| PolicyError::Config(format!("invalid socket address: {}", e)))?;

        let store: Arc<dyn ConfigStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(&self.config_path)),
        };
        debug!(
            "Building client for {} (logger manager: {})",
            store.path().display(),
            self.loggers.name()
        );

        let collaborators = Collaborators {
            rules: self.rules,
            stats: self.stats,
            loggers: self.loggers,
            procmon: self.procmon,
            firewall: self.firewall,
        };
        Ok(Client::start(default_address, store, collaborators, self.options))
    }
}
