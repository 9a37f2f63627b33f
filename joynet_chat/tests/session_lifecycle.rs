mod common;

use common::*;
use joynet_chat::constants::*;
use joynet_chat::prelude::*;
use joynet_rtc::channel::DataChannel;
use joynet_rtc::simulator::SimulatedOp;
use rstest::rstest;

#[tokio::test]
async fn init_creates_one_labelled_link_per_member() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b", "c"]);
    let mut events = harness.manager.subscribe();
    harness.init().await;

    assert_eq!(
        harness.manager.members(),
        vec![MemberId::from("b"), MemberId::from("c")]
    );
    assert_eq!(harness.connector.connect_count(), 2);
    assert_eq!(harness.signaling.fetch_count(), 1);

    for id in ["b", "c"] {
        let channels = harness.conn(id).data_channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].label(), "groupchat-g1");
        assert_eq!(
            harness.manager.link_state(&MemberId::from(id)),
            Some(PeerLinkState::New)
        );
    }

    assert!(drain(&mut events).contains(&ChatEvent::success(NOTICE_CONNECTED)));
}

#[rstest]
#[case("a", &["b"], 1)]
#[case("m", &["b"], 0)]
#[tokio::test]
async fn lower_id_sends_the_initial_offer(
    #[case] me: &str,
    #[case] others: &[&str],
    #[case] offers: usize,
) {
    joynet_logging::setup_log();
    let harness = Harness::new(me, others);
    harness.init().await;

    assert_eq!(harness.signaling.offers_to("b").len(), offers);
    assert_eq!(harness.conn("b").offers().len(), offers);
    if offers > 0 {
        assert_eq!(
            harness.conn("b").local_description(),
            Some(harness.signaling.offers_to("b")[0].clone())
        );
    }
}

#[tokio::test]
async fn config_fetch_failure_blocks_the_session() {
    joynet_logging::setup_log();
    let harness = Harness::with_signaling("a", &["b"], RecordingSignalingClient::unreachable());
    let mut events = harness.manager.subscribe();
    let members = harness.manager.session().members().to_vec();

    let err = harness.manager.init_session(&members).await.unwrap_err();
    assert!(matches!(err, ChatError::ConfigFetch(..)));
    assert!(err.is_fatal());
    assert!(harness.manager.members().is_empty());
    assert_eq!(harness.connector.connect_count(), 0);
    assert_eq!(
        drain(&mut events),
        vec![ChatEvent::error(NOTICE_CONNECT_FAILED)]
    );
}

#[tokio::test]
async fn refused_member_does_not_block_the_others() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b", "c"]);
    harness.connector.refuse(&MemberId::from("b"));
    harness.init().await;

    assert_eq!(harness.manager.members(), vec![MemberId::from("c")]);
}

#[tokio::test]
async fn add_member_skips_self_and_existing_links() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;

    harness.manager.add_member(&MemberId::from("b")).await.unwrap();
    harness.manager.add_member(&MemberId::from("a")).await.unwrap();
    assert_eq!(harness.connector.connect_count(), 1);

    harness.manager.add_member(&MemberId::from("z")).await.unwrap();
    assert_eq!(
        harness.manager.members(),
        vec![MemberId::from("b"), MemberId::from("z")]
    );
}

#[tokio::test]
async fn teardown_is_idempotent_and_stops_tracks_once() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b", "c"]);
    harness.init().await;
    let _ = harness.manager.start_call().await.unwrap();
    let token = harness.manager.cancellation_token();

    harness.manager.teardown().await;
    harness.manager.teardown().await;

    assert_eq!(harness.devices.stop_count(), 2);
    assert!(harness.conn("b").is_closed());
    assert!(harness.conn("c").is_closed());
    assert!(harness.manager.members().is_empty());
    assert!(harness.manager.media_state().is_none());
    assert!(!harness.manager.is_call_active());
    assert!(harness.manager.is_closed());
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn operations_after_teardown_do_not_panic() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    harness.manager.teardown().await;

    let b = MemberId::from("b");
    harness
        .manager
        .handle_incoming_offer(SessionDescription::offer("late"), &b)
        .await
        .unwrap();
    harness
        .manager
        .handle_incoming_answer(SessionDescription::answer("late"), &b)
        .await
        .unwrap();
    harness
        .manager
        .handle_incoming_ice_candidate(IceCandidate::new("candidate:1"), &b)
        .await;
    harness.manager.end_call();
    assert_eq!(harness.manager.toggle_audio(), None);

    let message = ChatMessage::new(&member("a"), "too late");
    assert!(matches!(
        harness.manager.send_message(message).await,
        Err(ChatError::SessionClosed)
    ));
    assert!(matches!(
        harness.manager.start_call().await,
        Err(ChatError::SessionClosed)
    ));
    assert!(matches!(
        harness.manager.add_member(&MemberId::from("z")).await,
        Err(ChatError::SessionClosed)
    ));
    assert_eq!(harness.connector.connect_count(), 1);
}

#[tokio::test]
async fn removed_link_ignores_late_events() {
    joynet_logging::setup_log();
    let harness = Harness::new("a", &["b"]);
    harness.init().await;
    let conn = harness.conn("b");

    // two failures without a connected state in between exhaust the restart budget
    assert!(conn.set_ice_state(IceConnectionState::Failed));
    settle().await;
    assert!(conn.set_ice_state(IceConnectionState::Failed));
    settle().await;
    assert!(!harness.manager.has_link(&MemberId::from("b")));

    assert!(!conn.set_ice_state(IceConnectionState::Connected));
    settle().await;
    assert_eq!(harness.manager.link_state(&MemberId::from("b")), None);
}

#[tokio::test]
async fn teardown_during_an_incoming_offer_relays_no_answer() {
    joynet_logging::setup_log();
    let harness = Harness::new("m", &["b"]);
    harness.init().await;
    let mut events = harness.manager.subscribe();
    let conn = harness.conn("b");
    conn.hold(SimulatedOp::SetRemoteDescription);

    let remote = MemberId::from("b");
    let answering = harness
        .manager
        .handle_incoming_offer(SessionDescription::offer("o"), &remote);
    let closing = async {
        settle().await;
        harness.manager.teardown().await;
        conn.release(SimulatedOp::SetRemoteDescription);
    };
    let (answered, ()) = tokio::join!(answering, closing);

    assert!(answered.is_ok());
    assert_eq!(conn.answer_count(), 0);
    assert_eq!(harness.signaling.answers_to("b"), 0);
    assert!(!drain(&mut events).contains(&ChatEvent::error(NOTICE_INCOMING_CALL_FAILED)));
}

#[tokio::test]
async fn teardown_during_call_start_sends_no_offer() {
    joynet_logging::setup_log();
    let harness = Harness::new("m", &["b", "c"]);
    harness.init().await;
    for peer in ["b", "c"] {
        harness.conn(peer).hold(SimulatedOp::AddTrack);
    }

    let starting = harness.manager.start_call();
    let closing = async {
        settle().await;
        harness.manager.teardown().await;
        for peer in ["b", "c"] {
            harness.conn(peer).release(SimulatedOp::AddTrack);
        }
    };
    let (started, ()) = tokio::join!(starting, closing);

    assert!(matches!(started, Err(ChatError::SessionClosed)));
    assert!(harness.signaling.offers_to("b").is_empty());
    assert!(harness.signaling.offers_to("c").is_empty());
    // both captured tracks were stopped by the teardown and not again by the aborted start
    assert_eq!(harness.devices.captured().len(), 2);
    assert_eq!(harness.devices.stop_count(), 2);
    assert!(!harness.manager.is_call_active());
    assert!(harness.manager.media_state().is_none());
}
