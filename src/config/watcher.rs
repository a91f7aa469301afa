//! Configuration file watcher
//!
//! A background task compares the file's content identity against the last
//! accepted one on every poll tick. Filesystem notifications, when available,
//! only wake the task early: both sources go through the same identity
//! comparison and debounce, so an editor that writes in several steps yields
//! a single [`WatchEvent`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::common::{PolicyError, Result};
use crate::config::defaults;
use crate::config::identity::{FileIdentity, IdentityBaseline, WatchEvent};

/// Watcher tuning
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Poll interval; `None` uses [`defaults::WATCH_POLL_INTERVAL`].
    /// Values below [`defaults::MIN_WATCH_POLL_INTERVAL`] are raised to it.
    pub poll_interval: Option<Duration>,
    /// How long a new identity must stay unchanged before it is reported
    pub debounce: Duration,
    /// Also subscribe to filesystem notifications
    pub use_notify: bool,
    pub channel_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            poll_interval: None,
            debounce: defaults::WATCH_DEBOUNCE,
            use_notify: true,
            channel_capacity: defaults::WATCH_CHANNEL_CAPACITY,
        }
    }
}

impl WatcherOptions {
    pub fn poll_interval(&self) -> Duration {
        poll_floor(self.poll_interval.unwrap_or(defaults::WATCH_POLL_INTERVAL))
    }
}

fn poll_floor(interval: Duration) -> Duration {
    interval.max(defaults::MIN_WATCH_POLL_INTERVAL)
}

/// Debounced change detection against a shared baseline
#[derive(Debug)]
struct ChangeDetector {
    baseline: IdentityBaseline,
    debounce: Duration,
    pending: Option<(FileIdentity, Instant)>,
}

impl ChangeDetector {
    fn new(baseline: IdentityBaseline, debounce: Duration) -> Self {
        Self { baseline, debounce, pending: None }
    }

    /// When the pending candidate becomes reportable
    fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    /// Feed the identity seen at `now` (`None` when the file is absent).
    /// Returns the identity to report, already recorded as the new baseline.
    fn observe(&mut self, current: Option<FileIdentity>, now: Instant) -> Option<FileIdentity> {
        let Some(identity) = current else {
            self.pending = None;
            return None;
        };

        if self.baseline.matches(&identity) {
            self.pending = None;
            return None;
        }

        match self.pending {
            Some((candidate, deadline)) if candidate == identity => {
                if now < deadline {
                    return None;
                }
            }
            _ => {
                if !self.debounce.is_zero() {
                    self.pending = Some((identity, now + self.debounce));
                    return None;
                }
            }
        }

        self.pending = None;
        self.baseline.record(identity);
        Some(identity)
    }
}

/// Watches one configuration file
pub struct ConfigWatcher {
    path: PathBuf,
    baseline: IdentityBaseline,
    options: WatcherOptions,
    poll_updates: Option<watch::Receiver<Duration>>,
}

impl ConfigWatcher {
    pub fn new<P: AsRef<Path>>(path: P, baseline: IdentityBaseline, options: WatcherOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            baseline,
            options,
            poll_updates: None,
        }
    }

    /// Replace the poll interval whenever `updates` publishes a new value
    pub fn with_poll_updates(mut self, updates: watch::Receiver<Duration>) -> Self {
        self.poll_updates = Some(updates);
        self
    }

    /// Start the background task. Must be called from within a tokio runtime.
    pub fn spawn(self) -> (WatcherHandle, mpsc::Receiver<WatchEvent>) {
        let (event_tx, event_rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            "Watching {} (poll every {:?}, debounce {:?}, notify: {})",
            self.path.display(),
            self.options.poll_interval(),
            self.options.debounce,
            self.options.use_notify
        );

        let task = tokio::spawn(self.run(event_tx, shutdown_rx));
        (WatcherHandle { shutdown: Some(shutdown_tx), task }, event_rx)
    }

    async fn run(mut self, events: mpsc::Sender<WatchEvent>, mut shutdown: oneshot::Receiver<()>) {
        let (poke_tx, mut poke_rx) = mpsc::channel::<()>(1);
        let _fs_watcher = if self.options.use_notify {
            match subscribe(&self.path, poke_tx.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Filesystem notifications unavailable, polling only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut poll_updates = self.poll_updates.take();
        let mut ticker = poll_ticker(self.options.poll_interval());
        let mut detector = ChangeDetector::new(self.baseline.clone(), self.options.debounce);

        loop {
            let deadline = detector.deadline();
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
                _ = ticker.tick() => {}
                Some(()) = poke_rx.recv() => {}
                interval = next_poll_interval(&mut poll_updates) => {
                    debug!("Poll interval for {} is now {:?}", self.path.display(), interval);
                    ticker = poll_ticker(interval);
                }
            }

            let Some(identity) = detector.observe(self.current_identity(), Instant::now()) else {
                continue;
            };

            debug!("Configuration file changed ({})", identity);
            metrics::counter!("policyd_watch_events_total").increment(1);

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                sent = events.send(WatchEvent::new(identity)) => {
                    if sent.is_err() {
                        debug!("Watch event receiver dropped, stopping watcher");
                        break;
                    }
                }
            }
        }

        debug!("Watcher for {} stopped", self.path.display());
    }

    fn current_identity(&self) -> Option<FileIdentity> {
        match FileIdentity::of_file(&self.path) {
            Ok(identity) => Some(identity),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                None
            }
        }
    }
}

fn poll_ticker(interval: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(poll_floor(interval));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolves with each new poll interval; pending forever once the sender is gone
async fn next_poll_interval(updates: &mut Option<watch::Receiver<Duration>>) -> Duration {
    if let Some(rx) = updates {
        if rx.changed().await.is_ok() {
            return *rx.borrow_and_update();
        }
        *updates = None;
    }
    std::future::pending().await
}

/// Watch the parent directory so atomic renames onto the file are seen
fn subscribe(path: &Path, poke: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| PolicyError::Watcher(format!("{} has no file name", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                // Full channel means a wake-up is already queued
                let _ = poke.try_send(());
            }
        }
        Err(e) => warn!("Watch error: {}", e),
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Owner of a running watcher task
pub struct WatcherHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Stop the watcher. No event is emitted after this returns.
    ///
    /// Dropping the handle also stops the task, without waiting for it.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("Watcher task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
