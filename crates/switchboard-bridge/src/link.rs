//! Reconnecting WebSocket link to a live feed.
//!
//! The link runs as its own task and talks to the dashboard only through
//! channels: decoded inbound messages and connection transitions go out as
//! [`LinkEvent`]s, outbound messages and mode changes come in through the
//! [`LinkHandle`]. The dashboard stays the single writer of session state.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use switchboard_vis::{Inbound, Outbound};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Floor for the heartbeat and reconnect intervals.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Link settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub url: String,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub heartbeat: Duration,
}

impl LinkConfig {
    /// Raise zero intervals to [`MIN_INTERVAL`].
    fn clamped(mut self) -> Self {
        for (name, value) in [
            ("heartbeat", &mut self.heartbeat),
            ("reconnect_base", &mut self.reconnect_base),
            ("reconnect_max", &mut self.reconnect_max),
        ] {
            if *value < MIN_INTERVAL {
                warn!(setting = name, "Zero link interval raised to 1 ms");
                *value = MIN_INTERVAL;
            }
        }
        self
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the link reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Inbound(Inbound),
}

#[derive(Debug)]
enum Command {
    Send(Outbound),
    EnterDemo,
    Resume,
    Shutdown,
}

/// How a connected session ended.
enum Exit {
    Closed,
    Parked,
    Shutdown,
}

/// How a wait between attempts ended.
enum Wait {
    Retry,
    Parked,
    Shutdown,
}

/// Control side of a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<LinkState>,
}

impl LinkHandle {
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Wait until the state satisfies `f`.
    pub async fn wait_for(&mut self, f: impl FnMut(&LinkState) -> bool) -> Option<LinkState> {
        self.state.wait_for(f).await.ok().map(|s| *s)
    }

    /// Send now or never: dropped unless connected.
    pub fn send(&self, message: Outbound) -> bool {
        if self.state() != LinkState::Connected {
            debug!(?message, "Link not connected, message dropped");
            return false;
        }
        self.commands.send(Command::Send(message)).is_ok()
    }

    /// Close the socket quietly and stop reconnecting until [`resume`](Self::resume).
    pub fn enter_demo(&self) {
        let _ = self.commands.send(Command::EnterDemo);
    }

    /// Leave demo mode and reconnect right away with a fresh attempt counter.
    pub fn resume(&self) {
        let _ = self.commands.send(Command::Resume);
    }

    /// Manual disconnect: socket, heartbeat and reconnect timer all go.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Start the link task.
pub fn spawn(config: LinkConfig) -> (LinkHandle, mpsc::UnboundedReceiver<LinkEvent>, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(LinkState::Disconnected);

    let task = tokio::spawn(run(config.clamped(), command_rx, event_tx, state_tx));
    let handle = LinkHandle {
        commands: command_tx,
        state: state_rx,
    };
    (handle, event_rx, task)
}

async fn run(
    config: LinkConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<LinkEvent>,
    state: watch::Sender<LinkState>,
) {
    let mut backoff = Backoff::new(config.reconnect_base, config.reconnect_max);
    let mut parked = false;

    loop {
        if parked {
            match park(&mut commands).await {
                Wait::Retry => {
                    info!("Leaving demo mode, reconnecting");
                    parked = false;
                    backoff.reset();
                }
                Wait::Shutdown => break,
                Wait::Parked => continue,
            }
        }

        state.send_replace(LinkState::Connecting);
        debug!(url = %config.url, attempt = backoff.attempts(), "Connecting");
        match connect_async(config.url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                state.send_replace(LinkState::Connected);
                info!(url = %config.url, "Connected to feed");
                if events.send(LinkEvent::Connected).is_err() {
                    break;
                }

                let exit = drive(socket, config.heartbeat, &mut commands, &events).await;
                state.send_replace(LinkState::Disconnected);
                match exit {
                    Exit::Closed => {
                        info!("Feed connection closed");
                        if events.send(LinkEvent::Disconnected).is_err() {
                            break;
                        }
                    }
                    Exit::Parked => {
                        info!("Link parked for demo mode");
                        parked = true;
                        continue;
                    }
                    Exit::Shutdown => break,
                }
            }
            Err(e) => {
                state.send_replace(LinkState::Disconnected);
                warn!(url = %config.url, error = %e, "Connection failed");
            }
        }

        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, attempt = backoff.attempts(), "Reconnect scheduled");
        match wait(delay, &mut commands).await {
            Wait::Retry => {}
            Wait::Parked => parked = true,
            Wait::Shutdown => break,
        }
    }

    state.send_replace(LinkState::Disconnected);
    info!("Link shut down");
}

/// One open connection: heartbeat, outbound commands and inbound frames.
async fn drive(
    socket: Socket,
    heartbeat: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> Exit {
    let (mut sink, mut stream) = socket.split();
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = send(&mut sink, Outbound::Ping).await {
                    warn!(error = %e, "Heartbeat failed");
                    return Exit::Closed;
                }
                trace!("Ping");
            }
            command = commands.recv() => match command {
                Some(Command::Send(message)) => {
                    if let Err(e) = send(&mut sink, message).await {
                        warn!(error = %e, ?message, "Send failed");
                        return Exit::Closed;
                    }
                }
                Some(Command::EnterDemo) => {
                    let _ = sink.close().await;
                    return Exit::Parked;
                }
                Some(Command::Resume) => {}
                Some(Command::Shutdown) | None => {
                    let _ = sink.close().await;
                    return Exit::Shutdown;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match Inbound::decode(&text) {
                    Ok(inbound) => {
                        if events.send(LinkEvent::Inbound(inbound)).is_err() {
                            return Exit::Shutdown;
                        }
                    }
                    Err(e) => warn!(error = %e, "Malformed inbound payload discarded"),
                },
                Some(Ok(Message::Close(_))) | None => return Exit::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Feed connection error");
                    return Exit::Closed;
                }
            },
        }
    }
}

async fn send<S>(sink: &mut S, message: Outbound) -> crate::Result<()>
where
    S: Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = message.encode()?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// Sit out the reconnect delay. Sends issued meanwhile are dropped.
async fn wait(delay: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> Wait {
    let timer = sleep(delay);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            _ = &mut timer => return Wait::Retry,
            command = commands.recv() => match command {
                Some(Command::Send(message)) => debug!(?message, "Link not connected, message dropped"),
                Some(Command::EnterDemo) => return Wait::Parked,
                Some(Command::Resume) => {}
                Some(Command::Shutdown) | None => return Wait::Shutdown,
            },
        }
    }
}

/// Demo mode: no socket and no reconnects until resumed.
async fn park(commands: &mut mpsc::UnboundedReceiver<Command>) -> Wait {
    loop {
        match commands.recv().await {
            Some(Command::Resume) => return Wait::Retry,
            Some(Command::Send(message)) => debug!(?message, "Link parked, message dropped"),
            Some(Command::EnterDemo) => {}
            Some(Command::Shutdown) | None => return Wait::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn config(url: String) -> LinkConfig {
        LinkConfig {
            url,
            reconnect_base: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(200),
            heartbeat: Duration::from_millis(50),
        }
    }

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn decodes_frames_and_skips_garbage() {
        let (listener, url) = listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("not json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"teleport"}"#.into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"pong"}"#.into())).await.unwrap();
            ws
        });

        let (handle, mut events, task) = spawn(config(url));
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        assert_eq!(
            events.recv().await,
            Some(LinkEvent::Inbound(Inbound::decode(r#"{"type":"pong"}"#).unwrap()))
        );

        let _ws = server.await.unwrap();
        handle.shutdown();
        task.await.unwrap();
        assert_eq!(handle.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn zero_intervals_do_not_kill_the_link() {
        let (listener, url) = listener().await;
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = seen_tx.send(Outbound::decode(&text).unwrap());
                }
            }
        });

        let (handle, mut events, task) = spawn(LinkConfig {
            url,
            reconnect_base: Duration::ZERO,
            reconnect_max: Duration::ZERO,
            heartbeat: Duration::ZERO,
        });
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(2), seen.recv()).await.unwrap(),
            Some(Outbound::Ping)
        );
        assert_eq!(handle.state(), LinkState::Connected);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_and_sends_reach_the_feed() {
        let (listener, url) = listener().await;
        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(Outbound::decode(&text).unwrap());
            }
        });

        let (mut handle, mut events, _task) = spawn(config(url));
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        handle.wait_for(|s| *s == LinkState::Connected).await;
        assert!(handle.send(Outbound::StartDemo));

        let mut got = Vec::new();
        while got.len() < 2 {
            got.push(seen.recv().await.unwrap());
        }
        assert!(got.contains(&Outbound::StartDemo));
        assert!(got.contains(&Outbound::Ping));
        handle.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_close() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            // first connection closed straight away, second kept
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.close(None).await.unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(ws);
        });

        let (handle, mut events, _task) = spawn(config(url));
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        assert_eq!(events.recv().await, Some(LinkEvent::Disconnected));
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        handle.shutdown();
    }

    #[tokio::test]
    async fn send_while_down_is_dropped() {
        let (handle, _events, _task) = spawn(config("ws://127.0.0.1:1".to_string()));
        assert!(!handle.send(Outbound::StartDemo));
        handle.shutdown();
    }

    #[tokio::test]
    async fn demo_mode_parks_quietly_until_resumed() {
        let (listener, url) = listener().await;
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            }
        });

        let (mut handle, mut events, _task) = spawn(config(url));
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));

        handle.enter_demo();
        handle.wait_for(|s| *s == LinkState::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(handle.state(), LinkState::Disconnected);

        handle.resume();
        assert_eq!(events.recv().await, Some(LinkEvent::Connected));
        handle.shutdown();
    }
}
