//! Watcher tests: debounce, self-write suppression, shutdown

mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{fast_watch_options, wait_until, Fixture, Harness, RecordingProcmon};
use policyd::client::{ClientOptions, EngineState, ReloadTrigger};
use policyd::config::{
    ChangedField, ConfigWatcher, DefaultAction, FileIdentity, FirewallBackend, IdentityBaseline, ProcMonitorMethod,
    WatcherOptions,
};
use serde_json::json;
use tokio::time::sleep;

fn count_changes(harness: &Harness) -> Arc<AtomicUsize> {
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    harness.client.add_listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    changes
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_saved_change_is_picked_up() {
    let fixture = Fixture::with(json!({
        "DefaultAction": "allow",
        "InterceptUnknown": false,
        "Firewall": "nftables",
        "ProcMonitorMethod": "ebpf"
    }));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(true));
    let client = harness.client.clone();
    let before = client.snapshot();

    let watching = client.start_watching();
    fixture.write(json!({
        "DefaultAction": "deny",
        "InterceptUnknown": true,
        "Firewall": "iptables",
        "ProcMonitorMethod": "ebpf"
    }));

    let c = client.clone();
    assert!(wait_until(move || c.firewall_type() == FirewallBackend::Iptables, Duration::from_secs(5)).await);
    watching.stop().await;

    assert_eq!(client.default_action(), DefaultAction::Deny);
    assert!(client.intercept_unknown());
    assert_eq!(client.proc_monitor_method(), ProcMonitorMethod::Ebpf);
    assert_eq!(client.default_duration(), before.default_duration);
    assert_eq!(client.server_address(), before.server.address);

    let report = client.last_report().unwrap();
    assert!(matches!(report.trigger, ReloadTrigger::FileChanged(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rapid_writes_reload_once() {
    let fixture = Fixture::with(json!({"ProcMonitorMethod": "ebpf"}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(true));
    let changes = count_changes(&harness);
    let startup_probes = harness.procmon.probes();

    let watching = harness.client.start_watching();
    fixture.write(json!({"ProcMonitorMethod": "ebpf", "Firewall": "nftables"}));
    sleep(Duration::from_millis(30)).await;
    fixture.write(json!({"ProcMonitorMethod": "ebpf", "Firewall": "nftables", "DefaultAction": "allow"}));

    let client = harness.client.clone();
    assert!(wait_until(move || client.default_action() == DefaultAction::Allow, Duration::from_secs(5)).await);
    // Give a second reload time to show up if the writes were not coalesced
    sleep(Duration::from_millis(500)).await;
    watching.stop().await;

    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.procmon.probes(), startup_probes + 1);
    assert_eq!(harness.client.firewall_type(), FirewallBackend::Nftables);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_corrected_save_does_not_retrigger() {
    let fixture = Fixture::with(json!({"ProcMonitorMethod": "ebpf"}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(true));
    let startup_probes = harness.procmon.probes();

    let watching = harness.client.start_watching();
    fixture.write(json!({"ProcMonitorMethod": "ebpf", "DefaultAction": "maybe"}));

    let client = harness.client.clone();
    assert!(
        wait_until(
            move || client.last_report().map(|r| r.persisted).unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );
    sleep(Duration::from_millis(600)).await;
    watching.stop().await;

    // One reload for the edit, none for the engine's own write
    assert_eq!(harness.procmon.probes(), startup_probes + 1);
    assert_eq!(fixture.read()["DefaultAction"], "deny");
    assert_eq!(harness.client.baseline(), Some(FileIdentity::of_file(&fixture.path).unwrap()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_reload_after_stop() {
    let fixture = Fixture::with(json!({"ProcMonitorMethod": "ebpf"}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(false));
    let startup_probes = harness.procmon.probes();

    let watching = harness.client.start_watching();
    watching.stop().await;

    fixture.write(json!({"ProcMonitorMethod": "ebpf", "Firewall": "nftables"}));
    sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.procmon.probes(), startup_probes);
    assert_eq!(harness.client.firewall_type(), FirewallBackend::Iptables);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_file_keeps_live_config() {
    let fixture = Fixture::with(json!({"Firewall": "nftables"}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(true));
    let changes = count_changes(&harness);

    let watching = harness.client.start_watching();
    fs::remove_file(&fixture.path).unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(changes.load(Ordering::SeqCst), 0);
    assert_eq!(harness.client.firewall_type(), FirewallBackend::Nftables);
    assert_eq!(harness.client.state(), EngineState::Idle);

    // Recreating it is a regular change
    fixture.write(json!({"Firewall": "iptables"}));
    let client = harness.client.clone();
    assert!(wait_until(move || client.firewall_type() == FirewallBackend::Iptables, Duration::from_secs(5)).await);
    watching.stop().await;
}

#[tokio::test]
async fn test_watcher_emits_one_event_per_settled_change() {
    let fixture = Fixture::with(json!({"Firewall": "nftables"}));
    let baseline = IdentityBaseline::new();
    baseline.record(FileIdentity::of_file(&fixture.path).unwrap());

    let options = WatcherOptions {
        poll_interval: Some(Duration::from_millis(20)),
        debounce: Duration::from_millis(100),
        use_notify: false,
        ..WatcherOptions::default()
    };
    let (handle, mut events) = ConfigWatcher::new(&fixture.path, baseline.clone(), options).spawn();

    fixture.write(json!({"Firewall": "iptables"}));
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("No watch event")
        .expect("Watcher closed");

    let written = FileIdentity::of_file(&fixture.path).unwrap();
    assert_eq!(event.identity, written);
    assert!(baseline.matches(&written));

    sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_err());

    handle.stop().await;
    assert!(events.recv().await.is_none());
}

fn polling_only(poll_interval: Option<Duration>) -> ClientOptions {
    ClientOptions {
        persist_fallbacks: true,
        watcher: WatcherOptions {
            poll_interval,
            debounce: Duration::from_millis(100),
            use_notify: false,
            ..WatcherOptions::default()
        },
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_poll_interval_still_watches() {
    let fixture = Fixture::with(json!({"DefaultAction": "deny"}));
    let harness = Harness::start_with(
        &fixture.path,
        RecordingProcmon::default(),
        polling_only(Some(Duration::ZERO)),
    );

    let watching = harness.client.start_watching();
    fixture.write(json!({"DefaultAction": "allow"}));

    let client = harness.client.clone();
    assert!(wait_until(move || client.default_action() == DefaultAction::Allow, Duration::from_secs(5)).await);
    watching.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poll_interval_follows_monitor_interval() {
    let fixture = Fixture::with(json!({"FwOptions": {"MonitorInterval": "1h"}}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), polling_only(None));

    let watching = harness.client.start_watching();
    sleep(Duration::from_millis(100)).await;

    fixture.write(json!({"FwOptions": {"MonitorInterval": "1s"}}));
    let report = harness.client.reload();
    assert_eq!(report.changed, vec![ChangedField::FwOptions]);

    // Only a retuned poller can notice this within the hour
    fixture.write(json!({"FwOptions": {"MonitorInterval": "1s"}, "DefaultAction": "allow"}));
    let client = harness.client.clone();
    assert!(wait_until(move || client.default_action() == DefaultAction::Allow, Duration::from_secs(5)).await);
    watching.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_guard_stops_watching() {
    let fixture = Fixture::with(json!({"ProcMonitorMethod": "ebpf"}));
    let harness = Harness::start_with(&fixture.path, RecordingProcmon::default(), fast_watch_options(false));
    let startup_probes = harness.procmon.probes();

    drop(harness.client.start_watching());
    sleep(Duration::from_millis(100)).await;

    fixture.write(json!({"ProcMonitorMethod": "ebpf", "Firewall": "nftables"}));
    sleep(Duration::from_millis(500)).await;

    assert_eq!(harness.procmon.probes(), startup_probes);
    assert_eq!(harness.client.firewall_type(), FirewallBackend::Iptables);
}
