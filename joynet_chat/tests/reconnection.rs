mod common;

use common::*;
use joynet_chat::prelude::*;
use std::time::Duration;
use tokio::time::advance;

fn b() -> MemberId {
    MemberId::from("b")
}

#[tokio::test(start_paused = true)]
async fn recovery_within_the_watchdog_sends_no_reconnect() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    let mut events = harness.manager.subscribe();
    harness.init().await;
    let conn = harness.conn("b");

    conn.set_ice_state(IceConnectionState::Connected);
    settle().await;
    conn.set_ice_state(IceConnectionState::Disconnected);
    settle().await;
    assert_eq!(harness.manager.link_state(&b()), Some(PeerLinkState::Disconnected));
    assert!(drain(&mut events).contains(&ChatEvent::ConnectionLost(b())));

    advance(Duration::from_secs(3)).await;
    settle().await;
    conn.set_ice_state(IceConnectionState::Connected);
    settle().await;

    advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 0);
    assert_eq!(harness.manager.link_state(&b()), Some(PeerLinkState::Connected));
}

#[tokio::test(start_paused = true)]
async fn watchdog_requests_exactly_one_reconnect() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    conn.set_ice_state(IceConnectionState::Connected);
    settle().await;
    conn.set_ice_state(IceConnectionState::Disconnected);
    settle().await;

    advance(Duration::from_millis(4_900)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 0);

    advance(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 1);

    // repeated reports of the same state do not arm another watchdog
    conn.set_ice_state(IceConnectionState::Disconnected);
    settle().await;
    advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 1);
    assert!(harness.manager.has_link(&b()));
}

#[tokio::test(start_paused = true)]
async fn watchdog_rearms_after_a_new_disconnect() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    for expected in 1..=2 {
        conn.set_ice_state(IceConnectionState::Connected);
        settle().await;
        conn.set_ice_state(IceConnectionState::Disconnected);
        settle().await;
        advance(Duration::from_millis(5_001)).await;
        settle().await;
        assert_eq!(harness.signaling.reconnects_to("b"), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn ice_failure_restarts_once_then_removes_the_link() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    let mut events = harness.manager.subscribe();
    harness.init().await;
    let conn = harness.conn("b");
    assert_eq!(conn.offers().len(), 1);

    conn.set_ice_state(IceConnectionState::Failed);
    settle().await;
    let offers = conn.offers();
    assert_eq!(offers.len(), 2);
    assert!(offers[1].ice_restart);
    assert_eq!(harness.signaling.offers_to("b").len(), 2);
    assert!(harness.manager.has_link(&b()));

    conn.set_ice_state(IceConnectionState::Failed);
    settle().await;
    assert_eq!(conn.offers().len(), 2);
    assert!(!harness.manager.has_link(&b()));
    assert!(conn.is_closed());

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, ChatEvent::CallError { member_id, .. } if member_id == &b())));
    assert!(events.contains(&ChatEvent::LinkStateChanged {
        member_id: b(),
        state: PeerLinkState::Closed,
    }));
}

#[tokio::test(start_paused = true)]
async fn connected_resets_the_restart_budget() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    for _ in 0..3 {
        conn.set_ice_state(IceConnectionState::Failed);
        settle().await;
        conn.set_ice_state(IceConnectionState::Connected);
        settle().await;
    }

    let restarts = conn.offers().iter().filter(|offer| offer.ice_restart).count();
    assert_eq!(restarts, 3);
    assert!(harness.manager.has_link(&b()));
}

#[tokio::test(start_paused = true)]
async fn failure_cancels_a_pending_watchdog() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    conn.set_ice_state(IceConnectionState::Disconnected);
    settle().await;
    conn.set_ice_state(IceConnectionState::Failed);
    settle().await;

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_restart_offer_keeps_the_link() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");
    harness.signaling.fail_for("b");

    conn.set_ice_state(IceConnectionState::Failed);
    settle().await;
    assert!(harness.manager.has_link(&b()));
    assert_eq!(harness.manager.link_state(&b()), Some(PeerLinkState::Failed));
}

#[tokio::test(start_paused = true)]
async fn local_candidates_are_relayed_and_failures_swallowed() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    conn.gather_candidate(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host"));
    settle().await;
    assert_eq!(harness.signaling.candidates_to("b"), 1);

    harness.signaling.fail_for("b");
    conn.gather_candidate(IceCandidate::new("candidate:2 1 udp 1 10.0.0.1 5001 typ host"));
    settle().await;
    assert_eq!(harness.signaling.candidates_to("b"), 2);
    assert!(harness.manager.has_link(&b()));
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_an_armed_watchdog() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    conn.set_ice_state(IceConnectionState::Connected);
    settle().await;
    conn.set_ice_state(IceConnectionState::Disconnected);
    settle().await;
    assert_eq!(harness.manager.link_state(&b()), Some(PeerLinkState::Disconnected));

    advance(Duration::from_secs(2)).await;
    settle().await;
    harness.manager.teardown().await;

    advance(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(harness.signaling.reconnects_to("b"), 0);
}
