//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use policyd::client::{Client, ClientOptions};
use policyd::config::{FirewallBackend, FwOptions, ProcMonitorMethod, RulesOptions, StatsConfig, WatcherOptions};
use policyd::subsystems::{
    DownstreamResult, FirewallSwitcher, ProcessMonitor, RuleLoader, StatsCollector,
};
use serde_json::Value;
use tempfile::TempDir;

/// Temporary directory holding one configuration file
pub struct Fixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("default-config.json");
        Self { dir, path }
    }

    pub fn with(json: Value) -> Self {
        let fixture = Self::new();
        fixture.write(json);
        fixture
    }

    pub fn write(&self, json: Value) {
        write_json(&self.path, json);
    }

    pub fn read(&self) -> Value {
        let bytes = fs::read(&self.path).expect("Failed to read config file");
        serde_json::from_slice(&bytes).expect("Config file is not JSON")
    }
}

pub fn write_json(path: &Path, json: Value) {
    let bytes = serde_json::to_vec_pretty(&json).expect("Failed to encode JSON");
    fs::write(path, bytes).expect("Failed to write config file");
}

#[derive(Default)]
pub struct RecordingRules {
    pub calls: Mutex<Vec<RulesOptions>>,
}

impl RuleLoader for RecordingRules {
    fn reload_rules(&self, options: &RulesOptions) -> DownstreamResult {
        self.calls.lock().unwrap().push(options.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStats {
    pub calls: Mutex<Vec<StatsConfig>>,
}

impl StatsCollector for RecordingStats {
    fn apply_limits(&self, limits: &StatsConfig) -> DownstreamResult {
        self.calls.lock().unwrap().push(limits.clone());
        Ok(())
    }
}

/// Process monitor with a fixed set of supported methods.
/// Counts availability probes, which happen once per validation of a
/// non-default method.
pub struct RecordingProcmon {
    available: HashSet<ProcMonitorMethod>,
    pub probes: AtomicUsize,
    pub calls: Mutex<Vec<ProcMonitorMethod>>,
}

impl RecordingProcmon {
    pub fn supporting(methods: &[ProcMonitorMethod]) -> Self {
        Self {
            available: methods.iter().copied().collect(),
            probes: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl Default for RecordingProcmon {
    fn default() -> Self {
        Self::supporting(&ProcMonitorMethod::ALL)
    }
}

impl ProcessMonitor for RecordingProcmon {
    fn is_available(&self, method: ProcMonitorMethod) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.contains(&method)
    }

    fn set_method(&self, method: ProcMonitorMethod) -> DownstreamResult {
        self.calls.lock().unwrap().push(method);
        Ok(())
    }

    fn current_method(&self) -> ProcMonitorMethod {
        self.calls.lock().unwrap().last().copied().unwrap_or_default()
    }
}

#[derive(Default)]
pub struct RecordingFirewall {
    pub calls: Mutex<Vec<(FirewallBackend, FwOptions)>>,
}

impl FirewallSwitcher for RecordingFirewall {
    fn switch_backend(&self, backend: FirewallBackend, options: &FwOptions) -> DownstreamResult {
        self.calls.lock().unwrap().push((backend, options.clone()));
        Ok(())
    }
}

/// A client wired to recording collaborators
pub struct Harness {
    pub client: Client,
    pub rules: Arc<RecordingRules>,
    pub stats: Arc<RecordingStats>,
    pub procmon: Arc<RecordingProcmon>,
    pub firewall: Arc<RecordingFirewall>,
}

impl Harness {
    pub fn start(path: &Path) -> Self {
        Self::start_with(path, RecordingProcmon::default(), ClientOptions::default())
    }

    pub fn start_with(path: &Path, procmon: RecordingProcmon, options: ClientOptions) -> Self {
        let rules = Arc::new(RecordingRules::default());
        let stats = Arc::new(RecordingStats::default());
        let procmon = Arc::new(procmon);
        let firewall = Arc::new(RecordingFirewall::default());

        let client = Client::builder("unix:///tmp/osui.sock", path)
            .rules(rules.clone())
            .stats(stats.clone())
            .process_monitor(procmon.clone())
            .firewall(firewall.clone())
            .options(options)
            .build()
            .expect("Failed to build client");

        Self { client, rules, stats, procmon, firewall }
    }

    pub fn firewall_switches(&self) -> usize {
        self.firewall.calls.lock().unwrap().len()
    }
}

/// Fast watcher settings for tests
pub fn fast_watch_options(use_notify: bool) -> ClientOptions {
    ClientOptions {
        persist_fallbacks: true,
        watcher: WatcherOptions {
            poll_interval: Some(Duration::from_millis(50)),
            debounce: Duration::from_millis(200),
            use_notify,
            ..WatcherOptions::default()
        },
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
