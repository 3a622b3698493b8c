//! Live Feed Integration Tests
//!
//! A real socket between a feed and the dashboard's link.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use switchboard_bridge::{link, FeedServer, LinkConfig, LinkEvent, LinkState};
use switchboard_vis::{
    ConnectionMode, Control, Dashboard, DashboardConfig, Inbound, MessageKind, Outbound, Phase,
    Scenario,
};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

fn link_config(url: String) -> LinkConfig {
    LinkConfig {
        url,
        reconnect_base: Duration::from_millis(20),
        reconnect_max: Duration::from_millis(100),
        heartbeat: Duration::from_secs(5),
    }
}

async fn next_event(events: &mut tokio::sync::mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for link event")
        .expect("link closed")
}

fn feed(dashboard: &mut Dashboard, event: LinkEvent) {
    match event {
        LinkEvent::Connected => dashboard.on_connected(),
        LinkEvent::Disconnected => dashboard.on_disconnected(),
        LinkEvent::Inbound(inbound) => dashboard.on_inbound(inbound),
    }
}

#[tokio::test]
async fn malformed_frames_leave_session_untouched() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        for frame in [
            r#"{"type":"demo_started","scenario":"branchA"}"#,
            r#"{"type":"user_message","from":"user","to":"orchestrator","payload":{"text":"help"}}"#,
            r#"{"type":"agent_status","agent":"orchestrator","status":"thinking""#,
            r#"not json at all"#,
            r#"{"type":"teleport","agent":"excel"}"#,
            r#"{"status":"working"}"#,
            r#"{"type":"agent_status","agent":"ghost","status":"working"}"#,
            r#"{"type":"message","sender":"NobodyAgent","content":"hi"}"#,
            r#"{"type":"pong"}"#,
        ] {
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut dashboard = Dashboard::new(DashboardConfig::default());
    let (handle, mut events, _task) = link::spawn(link_config(url));

    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    feed(&mut dashboard, LinkEvent::Connected);

    // lifecycle then the one valid event
    for _ in 0..2 {
        let event = next_event(&mut events).await;
        feed(&mut dashboard, event);
    }
    let before = dashboard.session().snapshot();
    assert_eq!(before.message_count(), 1);

    loop {
        let event = next_event(&mut events).await;
        let done = event == LinkEvent::Inbound(Inbound::Control(Control::Pong));
        feed(&mut dashboard, event);
        if done {
            break;
        }
    }

    assert_eq!(dashboard.session().snapshot(), before);
    handle.shutdown();
}

#[tokio::test]
async fn feed_replay_matches_local_playback() {
    let server = FeedServer::new(Scenario::branch_a(), 0.01, 1500);
    let (addr, _server) = server.spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();

    let mut dashboard = Dashboard::new(DashboardConfig::default());
    let (mut handle, mut events, _task) = link::spawn(link_config(format!("ws://{addr}/ws")));

    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    feed(&mut dashboard, LinkEvent::Connected);
    assert_eq!(dashboard.connection(), ConnectionMode::Connected);
    handle.wait_for(|s| *s == LinkState::Connected).await;

    match dashboard.start_playback() {
        switchboard_vis::PlaybackRequest::Remote(message) => {
            assert_eq!(message, Outbound::StartDemo);
            assert!(handle.send(message));
        }
        other => panic!("expected a remote request, got {other:?}"),
    }

    loop {
        let event = next_event(&mut events).await;
        let done = matches!(
            event,
            LinkEvent::Inbound(Inbound::Control(Control::DemoComplete { .. }))
        );
        feed(&mut dashboard, event);
        if done {
            break;
        }
    }

    let mut local = Dashboard::new(DashboardConfig::default());
    local.start_playback();
    local.advance_to(20_000);

    let kinds = |d: &Dashboard| -> Vec<(MessageKind, String)> {
        d.session()
            .read()
            .messages()
            .iter()
            .map(|m| (m.kind, m.from.clone()))
            .collect()
    };
    assert_eq!(dashboard.session().read().phase(), Phase::Complete);
    assert_eq!(kinds(&dashboard), kinds(&local));
    assert_eq!(dashboard.log().entries().len(), 11);
    handle.shutdown();
}

#[tokio::test]
async fn ping_is_answered_by_the_feed() {
    let server = FeedServer::new(Scenario::branch_a(), 1.0, 1500);
    let (addr, _server) = server.spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();

    let (mut handle, mut events, _task) = link::spawn(link_config(format!("ws://{addr}/ws")));
    assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
    handle.wait_for(|s| *s == LinkState::Connected).await;

    assert!(matches!(
        next_event(&mut events).await,
        LinkEvent::Inbound(Inbound::Control(Control::BridgeStatus { .. }))
    ));
    assert!(handle.send(Outbound::Ping));
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Inbound(Inbound::Control(Control::Pong))
    );
    handle.shutdown();
}
