//! Reconciliation engine
//!
//! The [`Client`] owns the single live configuration. Each reconciliation
//! loads the document, validates it, optionally writes a corrected copy
//! back, publishes the result with one atomic swap and then tells the
//! collaborators about the fields that actually changed.
//!
//! Reconciliations are serialised by one lock; readers never take it.

mod accessors;
mod builder;
mod report;

pub use self::accessors::Policy;
pub use self::builder::{ClientBuilder, ClientOptions};
pub use self::report::{ConfigChange, ConfigOrigin, EngineState, ReloadReport, ReloadTrigger};

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{
    diff, ChangedField, Config, ConfigStore, ConfigWatcher, DefaultAction, DefaultDuration, FirewallBackend,
    FileIdentity, IdentityBaseline, ProcMonitorMethod, RawDocument, ServerAddress, StoreError, Validator,
    WatcherHandle,
};
use crate::subsystems::{
    DownstreamError, DownstreamResult, FirewallSwitcher, LoggerManager, MonitorProbe, ProcessMonitor, RuleLoader,
    StatsCollector,
};

/// Configuration change listener type
pub type ConfigChangeListener = Box<dyn Fn(&ConfigChange) + Send + Sync>;

/// Subsystems informed of configuration changes
pub(crate) struct Collaborators {
    pub rules: Arc<dyn RuleLoader>,
    pub stats: Arc<dyn StatsCollector>,
    pub loggers: Arc<dyn LoggerManager>,
    pub procmon: Arc<dyn ProcessMonitor>,
    pub firewall: Arc<dyn FirewallSwitcher>,
}

struct Inner {
    store: Arc<dyn ConfigStore>,
    live: Arc<ArcSwap<Config>>,
    /// Last published configuration; holding the lock serialises reloads
    published: Mutex<Option<Arc<Config>>>,
    baseline: IdentityBaseline,
    state: AtomicU8,
    default_address: ServerAddress,
    collaborators: Collaborators,
    options: ClientOptions,
    listeners: RwLock<Vec<ConfigChangeListener>>,
    last_report: Mutex<Option<ReloadReport>>,
    /// Published firewall monitor interval, followed by watchers without a fixed poll interval
    monitor_interval: watch::Sender<Duration>,
}

/// Handle to the reconciliation engine
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Start building a client that falls back to `socket_address` when the
    /// file does not provide a valid one
    pub fn builder<P: AsRef<Path>>(socket_address: &str, config_path: P) -> ClientBuilder {
        ClientBuilder::new(socket_address, config_path)
    }

    pub(crate) fn start(
        default_address: ServerAddress,
        store: Arc<dyn ConfigStore>,
        collaborators: Collaborators,
        options: ClientOptions,
    ) -> Self {
        let initial = Config::with_server_address(default_address.clone());
        let (monitor_interval, _) = watch::channel(initial.fw_options.monitor_interval);
        let client = Self {
            inner: Arc::new(Inner {
                store,
                live: Arc::new(ArcSwap::from_pointee(initial)),
                published: Mutex::new(None),
                baseline: IdentityBaseline::new(),
                state: AtomicU8::new(EngineState::Uninitialized as u8),
                default_address,
                collaborators,
                options,
                listeners: RwLock::new(Vec::new()),
                last_report: Mutex::new(None),
                monitor_interval,
            }),
        };

        client.inner.reconcile(ReloadTrigger::Startup);
        client
    }

    /// Run the load, validate and publish cycle now
    pub fn reload(&self) -> ReloadReport {
        self.inner.reconcile(ReloadTrigger::Explicit)
    }

    pub(crate) fn reload_for(&self, trigger: ReloadTrigger) -> ReloadReport {
        self.inner.reconcile(trigger)
    }

    /// Register a callback run after every publish that changed a field.
    ///
    /// Listeners run on the reloading thread while reloads are serialised,
    /// so they must not call [`Client::reload`].
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&ConfigChange) + Send + Sync + 'static,
    {
        let mut listeners = self.inner.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.push(Box::new(listener));
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn last_report(&self) -> Option<ReloadReport> {
        self.inner
            .last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identity the watcher currently treats as already seen
    pub fn baseline(&self) -> Option<FileIdentity> {
        self.inner.baseline.current()
    }

    /// Logger manager handed in at construction
    pub fn loggers(&self) -> &dyn LoggerManager {
        self.inner.collaborators.loggers.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        self.inner.store.path()
    }

    /// Reader handle for other daemon components
    pub fn policy(&self) -> Policy {
        Policy::new(self.inner.live.clone())
    }

    pub fn proc_monitor_method(&self) -> ProcMonitorMethod {
        self.inner.live.load().proc_monitor_method
    }

    pub fn firewall_type(&self) -> FirewallBackend {
        self.inner.live.load().firewall
    }

    pub fn intercept_unknown(&self) -> bool {
        self.inner.live.load().intercept_unknown
    }

    pub fn default_action(&self) -> DefaultAction {
        self.inner.live.load().default_action
    }

    pub fn default_duration(&self) -> DefaultDuration {
        self.inner.live.load().default_duration
    }

    pub fn server_address(&self) -> ServerAddress {
        self.inner.live.load().server.address.clone()
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.live.load_full()
    }

    /// Watch the configuration file and reconcile on every change.
    ///
    /// Must be called from within a tokio runtime. Without an explicit poll
    /// interval the watcher polls at the firewall monitor interval and is
    /// retuned whenever a publish changes it.
    pub fn start_watching(&self) -> WatchGuard {
        let mut options = self.inner.options.watcher.clone();
        let follow_monitor_interval = options.poll_interval.is_none();
        if follow_monitor_interval {
            options.poll_interval = Some(*self.inner.monitor_interval.borrow());
        }

        let mut watcher = ConfigWatcher::new(self.inner.store.path(), self.inner.baseline.clone(), options);
        if follow_monitor_interval {
            watcher = watcher.with_poll_updates(self.inner.monitor_interval.subscribe());
        }
        let (watcher, mut events) = watcher.spawn();

        let client = self.clone();
        let consumer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!("Reloading after change detected at {}", event.timestamp);
                let c = client.clone();
                let trigger = ReloadTrigger::FileChanged(event.identity);
                if let Err(e) = tokio::task::spawn_blocking(move || c.reload_for(trigger)).await {
                    error!("Reload task failed: {}", e);
                }
            }
        });

        WatchGuard { watcher, consumer }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("path", &self.inner.store.path())
            .field("state", &self.state())
            .finish()
    }
}

/// Running watcher plus the task that feeds its events to the engine
pub struct WatchGuard {
    watcher: WatcherHandle,
    consumer: JoinHandle<()>,
}

impl WatchGuard {
    /// Stop watching. A reload already in progress completes first.
    pub async fn stop(self) {
        self.watcher.stop().await;
        if let Err(e) = self.consumer.await {
            warn!("Reload consumer ended abnormally: {}", e);
        }
    }
}

impl Inner {
    fn set_state(&self, state: EngineState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn reconcile(&self, trigger: ReloadTrigger) -> ReloadReport {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        metrics::counter!("policyd_reloads_total", "trigger" => trigger.as_str()).increment(1);

        self.set_state(EngineState::Loading);
        let (raw, origin) = match self.store.load() {
            Ok(loaded) => {
                self.baseline.record(loaded.identity);
                (Some(loaded.raw), ConfigOrigin::File(loaded.identity))
            }
            Err(e) => {
                warn!("{}; using default configuration", e);
                let reason = e.to_string();
                (None, ConfigOrigin::Defaults { reason })
            }
        };
        let mut report = ReloadReport::new(trigger, origin);

        self.set_state(EngineState::Validating);
        let document = raw.unwrap_or_default();
        let probe = MonitorProbe(self.collaborators.procmon.as_ref());
        let outcome = Validator::new(&probe)
            .with_default_address(self.default_address.clone())
            .validate(&document);

        for fallback in &outcome.fallbacks {
            warn!("Invalid configuration value, {}", fallback);
        }
        metrics::counter!("policyd_fallbacks_total").increment(outcome.fallbacks.len() as u64);

        let from_file = matches!(report.origin, ConfigOrigin::File(_));
        if from_file && !outcome.is_clean() {
            if self.options.persist_fallbacks {
                match self.persist(&outcome.corrected(&document)) {
                    Ok(identity) => {
                        info!("Corrected configuration written to {} ({})", self.store.path().display(), identity);
                        report.persisted = true;
                    }
                    Err(e) => {
                        error!("Failed to save corrected configuration: {}", e);
                        metrics::counter!("policyd_save_failures_total").increment(1);
                        report.save_error = Some(e.to_string());
                    }
                }
            } else {
                debug!("Not persisting {} corrected field(s)", outcome.fallbacks.len());
            }
        }
        report.fallbacks = outcome.fallbacks;

        self.set_state(EngineState::Publishing);
        let current = Arc::new(outcome.config);
        let previous = published.replace(current.clone());
        self.live.store(current.clone());

        report.changed = diff(previous.as_deref(), &current);
        if report.changed.is_empty() {
            debug!("Configuration unchanged");
        } else {
            info!("Configuration published, changed: {}", join_fields(&report.changed));
            current.log();
            report.downstream_errors = self.converge(&report.changed, &current);
            if report.changed(ChangedField::FwOptions) {
                let interval = current.fw_options.monitor_interval;
                self.monitor_interval.send_if_modified(|published| {
                    let modified = *published != interval;
                    *published = interval;
                    modified
                });
            }
            self.notify_listeners(&ConfigChange {
                previous,
                current,
                changed: report.changed.clone(),
            });
        }

        self.set_state(if from_file { EngineState::Idle } else { EngineState::Degraded });
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }

    /// Save with the baseline moved to the new identity before the bytes land
    fn persist(&self, document: &RawDocument) -> Result<FileIdentity, StoreError> {
        let bytes = self.store.encode(document)?;
        let identity = FileIdentity::of_bytes(&bytes);
        let loaded = self.baseline.current();

        self.baseline.record(identity);
        if let Err(e) = self.store.write(&bytes) {
            if let Some(loaded) = loaded {
                self.baseline.record(loaded);
            }
            return Err(e);
        }
        Ok(identity)
    }

    /// Inform collaborators; failures are reported, never rolled back
    fn converge(&self, changed: &[ChangedField], config: &Config) -> Vec<DownstreamError> {
        let c = &self.collaborators;
        let mut errors = Vec::new();
        let mut check = |result: DownstreamResult| {
            if let Err(e) = result {
                error!("Downstream convergence failed: {}", e);
                metrics::counter!("policyd_downstream_failures_total", "subsystem" => e.subsystem).increment(1);
                errors.push(e);
            }
        };

        if changed.contains(&ChangedField::ProcMonitorMethod) {
            check(c.procmon.set_method(config.proc_monitor_method));
        }
        if changed.contains(&ChangedField::Firewall) || changed.contains(&ChangedField::FwOptions) {
            check(c.firewall.switch_backend(config.firewall, &config.fw_options));
        }
        if changed.contains(&ChangedField::Rules) {
            check(c.rules.reload_rules(&config.rules));
        }
        if changed.contains(&ChangedField::Stats) {
            check(c.stats.apply_limits(&config.stats));
        }

        errors
    }

    fn notify_listeners(&self, change: &ConfigChange) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener(change);
        }
    }
}

fn join_fields(fields: &[ChangedField]) -> String {
    fields.iter().map(ChangedField::as_str).collect::<Vec<_>>().join(", ")
}
