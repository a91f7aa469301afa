//! Readers racing reloads never observe a half-published configuration

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use common::{Fixture, Harness};
use policyd::config::{Config, DefaultAction, FirewallBackend};
use serde_json::{json, Value};

const READERS: usize = 8;
const PUBLISHES: usize = 200;

/// Two documents whose fields all move together
fn generation(n: usize) -> Value {
    if n % 2 == 0 {
        json!({
            "DefaultAction": "deny",
            "InterceptUnknown": false,
            "Firewall": "iptables",
            "FwOptions": {"QueueNum": 10},
            "Stats": {"Workers": 2}
        })
    } else {
        json!({
            "DefaultAction": "allow",
            "InterceptUnknown": true,
            "Firewall": "nftables",
            "FwOptions": {"QueueNum": 20},
            "Stats": {"Workers": 4}
        })
    }
}

fn is_consistent(config: &Config) -> bool {
    match config.firewall {
        FirewallBackend::Iptables => {
            config.default_action == DefaultAction::Deny
                && !config.intercept_unknown
                && config.fw_options.queue_num == 10
                && config.stats.workers == 2
        }
        FirewallBackend::Nftables => {
            config.default_action == DefaultAction::Allow
                && config.intercept_unknown
                && config.fw_options.queue_num == 20
                && config.stats.workers == 4
        }
    }
}

#[test]
fn test_snapshots_are_never_torn() {
    let fixture = Fixture::with(generation(0));
    let harness = Harness::start(&fixture.path);
    assert!(is_consistent(&harness.client.snapshot()));

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let torn = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let policy = harness.client.policy();
            let done = done.clone();
            let reads = reads.clone();
            let torn = torn.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    if !is_consistent(&policy.snapshot()) {
                        torn.fetch_add(1, Ordering::Relaxed);
                    }
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for n in 1..=PUBLISHES {
        fixture.write(generation(n));
        let report = harness.client.reload();
        assert!(report.is_clean());
    }

    // Keep reading a little after the last publish
    while reads.load(Ordering::Relaxed) < 10_000 {
        thread::yield_now();
    }
    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(torn.load(Ordering::Relaxed), 0);
    assert!(reads.load(Ordering::Relaxed) >= 10_000);
    assert_eq!(harness.client.firewall_type(), FirewallBackend::Iptables);
}

#[test]
fn test_accessors_stay_within_variants_during_reloads() {
    let fixture = Fixture::with(generation(0));
    let harness = Harness::start(&fixture.path);
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let policy = harness.client.policy();
        let done = done.clone();
        thread::spawn(move || {
            let mut observed = 0usize;
            loop {
                let queue = policy.fw_options().queue_num;
                assert!(queue == 10 || queue == 20, "unexpected queue {}", queue);
                assert_eq!(policy.server_address().as_str(), "unix:///tmp/osui.sock");
                observed += 1;
                if done.load(Ordering::Acquire) {
                    break observed;
                }
            }
        })
    };

    for n in 1..=50 {
        fixture.write(generation(n));
        harness.client.reload();
    }
    done.store(true, Ordering::Release);

    assert!(reader.join().unwrap() > 0);
}
