//! Registry scenario tests.
//!
//! These drive the session registry the way the hub does and check what the
//! consumer would see in the published batches.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;
use telemetry_hub::session::SessionRegistry;
use telemetry_hub::{
    Configuration, ConnectionHandle, EventBatcher, SessionSnapshot, SessionStatus,
};

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 168, 0, 10], port))
}

fn registry() -> (SessionRegistry, Arc<EventBatcher>) {
    let batcher = Arc::new(EventBatcher::new());
    (SessionRegistry::new(Arc::clone(&batcher)), batcher)
}

fn handle(raw: u64) -> ConnectionHandle {
    ConnectionHandle::from_raw(raw)
}

fn removed(changes: &[SessionSnapshot]) -> Vec<ConnectionHandle> {
    changes
        .iter()
        .filter(|s| s.status == SessionStatus::Removed)
        .map(|s| s.handle)
        .collect()
}

// ============================================================================
// Reconnect Scenarios
// ============================================================================

#[test]
fn test_collision_then_reclaim() {
    let (mut reg, batcher) = registry();

    reg.on_connected(handle(1), peer(1)).unwrap();
    assert_eq!(
        reg.register(handle(1), "agentA", Configuration::new()).unwrap(),
        "agentA"
    );

    reg.on_connected(handle(2), peer(2)).unwrap();
    assert_eq!(
        reg.register(handle(2), "agentA", Configuration::new()).unwrap(),
        "agentA_1"
    );

    reg.on_disconnected(handle(1)).unwrap();
    batcher.take_session_changes();

    reg.on_connected(handle(3), peer(3)).unwrap();
    assert_eq!(
        reg.register(handle(3), "agentA", Configuration::new()).unwrap(),
        "agentA"
    );

    assert!(reg.get(&handle(1)).is_none());
    assert_eq!(reg.get(&handle(2)).unwrap().identifier, "agentA_1");
    assert_eq!(reg.handle_of("agentA"), Some(handle(3)));
    assert_eq!(removed(&batcher.take_session_changes()), vec![handle(1)]);
}

#[test]
fn test_takeover_carries_operator_decision() {
    let (mut reg, _batcher) = registry();
    let mut reported = Configuration::new();
    reported.insert("maxCpuUsage", 75.0);
    reported.insert("interface", "eth0");

    reg.on_connected(handle(1), peer(1)).unwrap();
    reg.register(handle(1), "agentB", reported.clone()).unwrap();
    reg.set_send_enabled(handle(1), false, reported).unwrap();
    reg.on_disconnected(handle(1)).unwrap();

    let mut update = Configuration::new();
    update.insert("interface", "wlan0");
    reg.on_connected(handle(2), peer(2)).unwrap();
    reg.register(handle(2), "agentB", update).unwrap();

    let session = reg.get(&handle(2)).unwrap();
    assert_eq!(session.status, SessionStatus::Connected);
    assert!(!session.send_enabled);
    assert_eq!(
        session.configuration.get("maxCpuUsage").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(
        session.configuration.get("interface").and_then(|v| v.as_str()),
        Some("wlan0")
    );
}

#[test]
fn test_unregistered_disconnect_leaves_nothing() {
    let (mut reg, batcher) = registry();

    reg.on_connected(handle(7), peer(7)).unwrap();
    let placeholder = reg.get(&handle(7)).unwrap().identifier.clone();
    assert!(reg.is_reserved(&placeholder));

    assert_eq!(
        reg.on_disconnected(handle(7)).unwrap(),
        SessionStatus::Removed
    );

    let changes = batcher.take_session_changes();
    assert_eq!(removed(&changes), vec![handle(7)]);
    assert!(reg.is_empty());
    assert!(!reg.is_reserved(&placeholder));
}

#[test]
fn test_purge_reports_each_session_once() {
    let (mut reg, batcher) = registry();
    for raw in 1..=4 {
        reg.on_connected(handle(raw), peer(raw as u16)).unwrap();
        reg.register(handle(raw), &format!("dev{}", raw), Configuration::new())
            .unwrap();
    }
    reg.on_disconnected(handle(1)).unwrap();
    reg.on_disconnected(handle(3)).unwrap();
    batcher.take_session_changes();

    assert_eq!(reg.purge_disconnected(), 2);
    assert_eq!(reg.purge_disconnected(), 0);

    let mut gone = removed(&batcher.take_session_changes());
    gone.sort();
    assert_eq!(gone, vec![handle(1), handle(3)]);
    assert!(!reg.is_reserved("dev1"));
    assert!(reg.is_reserved("dev2"));
}

// ============================================================================
// Telemetry Batching
// ============================================================================

#[test]
fn test_telemetry_between_ticks_keeps_order() {
    let (mut reg, batcher) = registry();
    reg.on_connected(handle(1), peer(1)).unwrap();
    reg.register(handle(1), "sensor", Configuration::new()).unwrap();

    for seq in 0..10 {
        reg.record_telemetry(handle(1), "NetworkMetrics", json!({ "seq": seq }))
            .unwrap();
    }

    let batch = batcher.take_telemetry();
    assert_eq!(batch.len(), 10);
    for (seq, record) in batch.iter().enumerate() {
        assert_eq!(record.identifier, "sensor");
        assert_eq!(record.payload["seq"], seq);
    }
    assert!(batcher.take_telemetry().is_empty());
}

// ============================================================================
// Identifier Uniqueness
// ============================================================================

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn assert_unique(reg: &SessionRegistry) {
    let snapshots = reg.snapshots();
    let live: Vec<&str> = snapshots
        .iter()
        .filter(|s| s.status != SessionStatus::Removed)
        .map(|s| s.identifier.as_str())
        .collect();
    let distinct: HashSet<&str> = live.iter().copied().collect();
    assert_eq!(live.len(), distinct.len(), "duplicate identifiers: {:?}", live);
}

#[test]
fn test_identifiers_stay_unique_under_random_churn() {
    const NAMES: [&str; 3] = ["alpha", "beta", "alpha_1"];

    for seed in 1..=20u64 {
        let (mut reg, batcher) = registry();
        let mut rng = Lcg(seed);
        let mut next_raw = 1u64;
        let mut open: Vec<ConnectionHandle> = Vec::new();

        for _ in 0..200 {
            match rng.next(5) {
                0 | 1 => {
                    let h = handle(next_raw);
                    next_raw += 1;
                    reg.on_connected(h, peer(1000)).unwrap();
                    open.push(h);
                }
                2 if !open.is_empty() => {
                    let h = open[rng.next(open.len() as u64) as usize];
                    let name = NAMES[rng.next(NAMES.len() as u64) as usize];
                    // Registering twice is rejected; uniqueness must hold either way
                    let _ = reg.register(h, name, Configuration::new());
                }
                3 if !open.is_empty() => {
                    let h = open.swap_remove(rng.next(open.len() as u64) as usize);
                    reg.on_disconnected(h).unwrap();
                }
                4 => {
                    reg.purge_disconnected();
                }
                _ => {}
            }
            assert_unique(&reg);
        }

        let changes = batcher.take_session_changes();
        let gone = removed(&changes);
        let distinct: HashSet<_> = gone.iter().collect();
        assert_eq!(gone.len(), distinct.len(), "session removed twice");
    }
}
