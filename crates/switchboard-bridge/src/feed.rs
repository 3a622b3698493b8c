//! Feed server: the producer side of the wire protocol.
//!
//! Serves `/ws` for dashboards and `GET /api/status`. A client can ask for a
//! replay of the configured scenario; every replay message is broadcast to
//! all connected clients in order.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use switchboard_vis::{Control, DashboardConfig, Outbound, Scenario};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::error::Result;

const CHANNEL_CAPACITY: usize = 256;

/// Shared server state.
struct FeedState {
    scenario: Scenario,
    speed: f64,
    grace_ms: u64,
    events: broadcast::Sender<String>,
    replay: Mutex<Option<JoinHandle<()>>>,
    clients: AtomicUsize,
}

impl FeedState {
    fn scaled(&self, t_ms: u64) -> Duration {
        Duration::from_millis((t_ms as f64 * self.speed).round() as u64)
    }

    fn publish(&self, message: &impl Serialize) {
        if let Some(text) = encode(message) {
            // no subscribers is fine
            let _ = self.events.send(text);
        }
    }

    async fn is_replaying(&self) -> bool {
        self.replay
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn start_demo(self: &Arc<Self>) -> bool {
        let mut replay = self.replay.lock().await;
        if replay.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!(scenario = %self.scenario.name, "Replay already running, duplicate start ignored");
            return false;
        }
        *replay = Some(tokio::spawn(run_replay(self.clone())));
        true
    }

    async fn stop_demo(&self) {
        if let Some(handle) = self.replay.lock().await.take() {
            handle.abort();
        }
        info!(scenario = %self.scenario.name, "Replay stopped");
        self.publish(&Control::DemoStopped {
            scenario: self.scenario.name.clone(),
        });
    }
}

fn encode(message: &impl Serialize) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "Failed to encode feed message");
            None
        }
    }
}

/// The `action` a client payload names, if it names one at all.
fn requested_action(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value.get("action")?.as_str().map(str::to_string)
}

async fn run_replay(state: Arc<FeedState>) {
    let scenario = &state.scenario;
    info!(scenario = %scenario.name, steps = scenario.len(), speed = state.speed, "Replay started");

    state.publish(&Control::BridgeStatus {
        status: "demo".to_string(),
        rooms: Vec::new(),
    });
    state.publish(&Control::DemoStarted {
        scenario: scenario.name.clone(),
    });

    let start = Instant::now();
    for step in &scenario.steps {
        sleep_until(start + state.scaled(step.t)).await;
        debug!(t = step.t, kind = step.event.kind(), "Replay step");
        state.publish(step);
    }

    sleep_until(start + state.scaled(scenario.last_offset_ms() + state.grace_ms)).await;
    state.publish(&Control::DemoComplete {
        scenario: scenario.name.clone(),
    });
    info!(scenario = %scenario.name, "Replay complete");
}

/// Replay feed server.
pub struct FeedServer {
    state: Arc<FeedState>,
}

impl FeedServer {
    /// Serve `scenario`, with offsets multiplied by `speed`.
    pub fn new(scenario: Scenario, speed: f64, grace_ms: u64) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Arc::new(FeedState {
                scenario,
                speed,
                grace_ms,
                events,
                replay: Mutex::new(None),
                clients: AtomicUsize::new(0),
            }),
        }
    }

    /// Serve the config's default scenario.
    pub fn from_config(config: &DashboardConfig, speed: f64) -> Result<Self> {
        let scenario = config.default_scenario()?.clone();
        Ok(Self::new(scenario, speed, config.timing.finish_grace_ms))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(status_handler))
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Start a replay unless one is running.
    pub async fn start_demo(&self) -> bool {
        self.state.start_demo().await
    }

    pub async fn stop_demo(&self) {
        self.state.stop_demo().await
    }

    pub async fn is_replaying(&self) -> bool {
        self.state.is_replaying().await
    }

    pub fn client_count(&self) -> usize {
        self.state.clients.load(Ordering::Relaxed)
    }

    /// Run the server on `addr` until it fails.
    pub async fn serve(self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Feed server running on ws://{}/ws", listener.local_addr()?);
        axum::serve(listener, self.router()).await
    }

    /// Bind `addr` and serve in the background; returns the bound address.
    pub async fn spawn(
        &self,
        addr: SocketAddr,
    ) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let router = self.router();
        info!("Feed server running on ws://{}/ws", local);
        let task = tokio::spawn(async move { axum::serve(listener, router).await });
        Ok((local, task))
    }
}

/// Server status response.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    scenario: String,
    clients: usize,
    replaying: bool,
}

async fn status_handler(State(state): State<Arc<FeedState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        scenario: state.scenario.name.clone(),
        clients: state.clients.load(Ordering::Relaxed),
        replaying: state.is_replaying().await,
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<FeedState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: Arc<FeedState>) {
    let mut feed = state.events.subscribe();
    let (mut sink, mut stream) = socket.split();
    let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();

    let clients = state.clients.fetch_add(1, Ordering::Relaxed) + 1;
    info!(clients, "Dashboard connected");

    let greeting = Control::BridgeStatus {
        status: "demo_available".to_string(),
        rooms: Vec::new(),
    };
    if let Some(text) = encode(&greeting) {
        let _ = reply_tx.send(text);
    }

    let writer = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                biased;
                reply = replies.recv() => match reply {
                    Some(text) => text,
                    None => break,
                },
                message = feed.recv() => match message {
                    Ok(text) => text,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dashboard lagging, messages skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match Outbound::decode(text.as_str()) {
                Ok(Outbound::StartDemo) => {
                    state.start_demo().await;
                }
                Ok(Outbound::StopDemo) => state.stop_demo().await,
                Ok(Outbound::Ping) => {
                    if let Some(text) = encode(&Control::Pong) {
                        let _ = reply_tx.send(text);
                    }
                }
                Err(e) => match requested_action(text.as_str()) {
                    // no live mode here, so start_live_demo lands in this arm too
                    Some(action) => {
                        warn!(%action, "Unsupported client action");
                        let reply = Control::Error {
                            message: format!("unsupported action '{action}'"),
                        };
                        if let Some(text) = encode(&reply) {
                            let _ = reply_tx.send(text);
                        }
                    }
                    None => debug!(error = %e, "Unparsable client payload ignored"),
                },
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    let clients = state.clients.fetch_sub(1, Ordering::Relaxed) - 1;
    info!(clients, "Dashboard disconnected");
}
