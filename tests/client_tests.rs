#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end tests of the connection loop against a scripted transport.

mod common;

use std::time::Duration;

use lobby_sync_client::{
    topics, ClientFrame, LobbyClient, LobbyConfig, LobbyError, LobbyEvent, PlayerColor,
};

use common::{
    assert_no_event, color_changed, game_cancelled, game_created, game_started, recv_until,
    server_error, snapshot, snapshot_json, transport_pair, user_joined, user_left, MockFetcher,
    ScriptedConnector,
};

fn config() -> LobbyConfig {
    LobbyConfig::new(1)
        .with_reconnect_delay(Duration::from_millis(10))
        .with_heartbeat(Duration::from_secs(30), Duration::from_secs(60))
        .with_shutdown_timeout(Duration::from_millis(200))
}

#[tokio::test]
async fn seed_then_live_events_update_the_roster() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());

    let first = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = first {
        assert_eq!(session.roster().len(), 1);
    }

    handle.push(user_joined(1, 2, "guest"));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        let ids: Vec<_> = session.roster().iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    handle.push(user_left(1, 2));
    let after_leave = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = after_leave {
        assert_eq!(session.roster().len(), 1);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn color_change_comes_back_as_an_event_not_optimistically() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    client.change_color(PlayerColor::Red).unwrap();
    // No snapshot change until the server confirms.
    assert_no_event(&mut events, Duration::from_millis(50), |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    handle.push(color_changed(1, 1, "RED"));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        assert_eq!(session.roster()[0].color, Some(PlayerColor::Red));
    }

    client.shutdown().await;
}

#[tokio::test]
async fn events_before_seed_are_buffered_and_drained_in_order() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let (fetcher, open_seed) = MockFetcher::gated(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    // Live events race ahead of the seed fetch.
    handle.push(user_joined(1, 2, "early"));
    handle.push(user_joined(1, 3, "earlier-still"));
    assert_no_event(&mut events, Duration::from_millis(50), |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    open_seed.send(()).unwrap();
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        let ids: Vec<_> = session.roster().iter().map(|p| p.user_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn cancellation_buffered_before_seed_never_exposes_a_forming_snapshot() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let (fetcher, open_seed) = MockFetcher::gated(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    handle.push(game_cancelled(1, "creator left"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    open_seed.send(()).unwrap();

    let terminal = recv_until(&mut events, |e| {
        matches!(
            e,
            LobbyEvent::SessionUpdated { .. } | LobbyEvent::SessionCancelled { .. }
        )
    })
    .await;
    assert!(
        matches!(terminal, LobbyEvent::SessionCancelled { .. }),
        "expected cancellation, got {terminal:?}"
    );
    assert!(client.session().is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn creation_ack_seeds_the_view_without_the_fetch() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    // The fetch never resolves; the ack on the personal queue seeds instead.
    let (fetcher, _open_seed) = MockFetcher::gated(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    handle.push(game_created(snapshot_json(1, &[(1, "creator")])));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        assert_eq!(session.id, 1);
        assert_eq!(session.creator_id, 1);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn reconnect_resubscribes_each_topic_exactly_once() {
    let (transport1, handle1) = transport_pair();
    let (transport2, handle2) = transport_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport1), Ok(transport2)]);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    // Server drops the connection.
    handle1.close();
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::Disconnected { .. })
    })
    .await;
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    // Give the replay a moment to land on the new transport.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let subscribed = handle2.subscribed_topics();
    for topic in topics::ALL {
        assert_eq!(
            subscribed.iter().filter(|t| *t == topic).count(),
            1,
            "expected exactly one subscription for {topic} after reconnect"
        );
    }

    // The session survives the reconnect and keeps reconciling.
    handle2.push(user_joined(1, 2, "guest"));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        assert_eq!(session.roster().len(), 2);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn dispatch_fails_fast_while_reconnecting() {
    let (transport1, handle1) = transport_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport1)]);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(
        connector,
        fetcher,
        config().with_reconnect_delay(Duration::from_secs(60)),
    );
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;
    assert!(client.is_connected());

    handle1.close();
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::Disconnected { .. })
    })
    .await;

    assert!(!client.is_connected());
    assert!(matches!(client.join_game(), Err(LobbyError::NotConnected)));
    assert!(matches!(
        client.change_color(PlayerColor::Blue),
        Err(LobbyError::NotConnected)
    ));

    client.shutdown().await;
}

#[tokio::test]
async fn server_rejection_surfaces_without_touching_the_session() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    let before = client.session().unwrap();

    handle.push(server_error("Color already taken"));
    let rejected = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::CommandRejected { .. })
    })
    .await;
    if let LobbyEvent::CommandRejected { message } = rejected {
        assert_eq!(message, "Color already taken");
    }
    assert_eq!(client.session().unwrap(), before);

    client.shutdown().await;
}

#[tokio::test]
async fn session_started_is_terminal() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    handle.push(game_started(1));
    let started = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionStarted { .. })
    })
    .await;
    assert_eq!(started, LobbyEvent::SessionStarted { game_id: 1 });
    assert!(client.session().is_none());

    // Late events no longer mutate anything.
    handle.push(user_joined(1, 9, "too-late"));
    assert_no_event(&mut events, Duration::from_millis(50), |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    client.shutdown().await;
}

#[tokio::test]
async fn events_for_other_sessions_are_ignored() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    handle.push(user_joined(2, 7, "elsewhere"));
    handle.push(game_cancelled(2, "not ours"));
    assert_no_event(&mut events, Duration::from_millis(50), |e| {
        matches!(
            e,
            LobbyEvent::SessionUpdated { .. } | LobbyEvent::SessionCancelled { .. }
        )
    })
    .await;
    assert!(client.session().is_some());

    client.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_killing_the_connection() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    handle.push_raw("{not json");
    handle.push_raw("[1, 2, 3]");
    // The connection survives and keeps reconciling.
    handle.push(user_joined(1, 2, "guest"));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        assert_eq!(session.roster().len(), 2);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn unknown_event_kinds_are_tolerated() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;

    handle.push(serde_json::json!({
        "topic": "/topic/game-updates",
        "type": "TURN_TIMER_TICK",
        "payload": { "gameId": 1, "remaining": 30 },
    }));
    handle.push(user_joined(1, 2, "guest"));
    let updated = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::SessionUpdated { .. })
    })
    .await;
    if let LobbyEvent::SessionUpdated { session } = updated {
        assert_eq!(session.roster().len(), 2);
    }

    client.shutdown().await;
}

#[tokio::test]
async fn receive_error_triggers_a_reconnect() {
    let (transport1, handle1) = transport_pair();
    let (transport2, _handle2) = transport_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport1), Ok(transport2)]);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    handle1.push_error("tls stream torn down");
    let dropped = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::Disconnected { .. })
    })
    .await;
    if let LobbyEvent::Disconnected { reason } = dropped {
        assert!(reason.unwrap().contains("tls stream torn down"));
    }

    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    client.shutdown().await;
}

#[tokio::test]
async fn heartbeat_pings_are_sent_while_connected() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(
        connector,
        fetcher,
        config().with_heartbeat(Duration::from_millis(20), Duration::from_secs(60)),
    );
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    let pings = handle
        .sent_frames()
        .into_iter()
        .filter(|f| matches!(f, ClientFrame::Ping))
        .count();
    assert!(pings >= 2, "expected repeated pings, saw {pings}");

    client.shutdown().await;
}

#[tokio::test]
async fn heartbeat_timeout_forces_a_reconnect() {
    let (transport1, handle1) = transport_pair();
    let (transport2, _handle2) = transport_pair();
    let connector = ScriptedConnector::new(vec![Ok(transport1), Ok(transport2)]);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(
        connector,
        fetcher,
        config().with_heartbeat(Duration::from_millis(20), Duration::from_millis(80)),
    );
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    // Never answer; the silent connection is treated as lost.
    let dropped = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::Disconnected { .. })
    })
    .await;
    if let LobbyEvent::Disconnected { reason } = dropped {
        assert_eq!(reason.as_deref(), Some("heartbeat timeout"));
    }
    assert!(handle1.was_closed());

    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    client.shutdown().await;
}

#[tokio::test]
async fn seed_failure_is_fatal_to_the_view() {
    let (transport, _handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::err("404 game not found");

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());

    let failed = recv_until(&mut events, |e| matches!(e, LobbyEvent::SeedFailed { .. })).await;
    if let LobbyEvent::SeedFailed { message } = failed {
        assert!(message.contains("404 game not found"));
    }

    // Final disconnect, then the loop exits and the channel closes.
    let _ = recv_until(&mut events, |e| {
        matches!(e, LobbyEvent::Disconnected { .. })
    })
    .await;
    assert!(
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .is_none()
    );

    client.shutdown().await;
}

#[tokio::test]
async fn create_game_sends_to_the_creation_destination() {
    let (transport, handle) = transport_pair();
    let connector = ScriptedConnector::single(transport);
    let fetcher = MockFetcher::ok(snapshot(1, &[(1, "creator")]));

    let (mut client, mut events) = LobbyClient::start(connector, fetcher, config());
    let _ = recv_until(&mut events, |e| matches!(e, LobbyEvent::Connected)).await;

    client.create_game("friday night", 5).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = handle.sent_frames();
    let frame = sent
        .iter()
        .find_map(|f| match f {
            ClientFrame::Send { destination, body } if destination == "/app/create-game" => {
                Some(body.clone())
            }
            _ => None,
        })
        .expect("create-game frame not sent");
    assert_eq!(frame["gameName"], "friday night");
    assert_eq!(frame["maxPlayers"], 5);

    client.shutdown().await;
}
