//! The event loop.
//!
//! One task owns the dashboard and serializes everything that touches it:
//! link events, user commands, scheduler deadlines and animation frames.
//! The dashboard's virtual clock follows a monotonic [`Instant`].

use std::str::FromStr;
use std::time::Duration;

use switchboard_vis::{
    BusEvent, ConnectionMode, Dashboard, PlaybackRequest, ResetOutcome, Subscription, Topic,
};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::link::{LinkEvent, LinkHandle};

/// User-facing controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Play,
    Reset,
    Quit,
}

impl FromStr for UserCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" | "start" => Ok(UserCommand::Play),
            "reset" => Ok(UserCommand::Reset),
            "quit" | "exit" => Ok(UserCommand::Quit),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

pub struct Runtime {
    dashboard: Dashboard,
    link: LinkHandle,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    started: Instant,
    frame: Duration,
}

impl Runtime {
    pub fn new(
        dashboard: Dashboard,
        link: LinkHandle,
        link_events: mpsc::UnboundedReceiver<LinkEvent>,
    ) -> Self {
        let frame = Duration::from_millis(dashboard.config().timing.frame_ms.max(1));
        Self {
            dashboard,
            link,
            link_events,
            started: Instant::now(),
            frame,
        }
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Bring the dashboard clock up to now.
    pub fn tick(&mut self) {
        let now = self.now_ms();
        self.dashboard.advance_to(now);
    }

    pub fn on_link_event(&mut self, event: LinkEvent) {
        if self.dashboard.connection() == ConnectionMode::Demo {
            debug!(?event, "Demo mode, link event ignored");
            return;
        }
        match event {
            LinkEvent::Connected => {
                info!("Feed connected");
                self.dashboard.on_connected();
            }
            LinkEvent::Disconnected => {
                info!("Feed disconnected");
                self.dashboard.on_disconnected();
            }
            LinkEvent::Inbound(inbound) => self.dashboard.on_inbound(inbound),
        }
    }

    /// Returns `false` when the loop should end.
    pub fn on_command(&mut self, command: UserCommand) -> bool {
        self.tick();
        match command {
            UserCommand::Play => match self.dashboard.start_playback() {
                PlaybackRequest::Remote(message) => {
                    if !self.link.send(message) {
                        warn!("Feed unreachable, playback request dropped");
                    }
                }
                PlaybackRequest::Local { scenario } => {
                    info!(%scenario, "Playing scenario locally");
                    self.link.enter_demo();
                }
                PlaybackRequest::Unavailable => {}
            },
            UserCommand::Reset => match self.dashboard.reset() {
                ResetOutcome::Local => {}
                ResetOutcome::ResumeLink => {
                    info!("Left demo mode, resuming feed link");
                    self.link.resume();
                }
                ResetOutcome::StopFeed(message) => {
                    if !self.link.send(message) {
                        warn!("Feed unreachable, stop request dropped");
                    }
                }
            },
            UserCommand::Quit => return false,
        }
        true
    }

    /// Run until `Quit` or until the command channel closes.
    ///
    /// Hands the dashboard back for inspection.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<UserCommand>) -> Dashboard {
        let mut frames = interval(self.frame);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut link_open = true;

        loop {
            self.tick();
            let deadline = self
                .dashboard
                .next_deadline()
                .map(|ms| self.started + Duration::from_millis(ms));
            let animating = self.dashboard.wants_frame();

            tokio::select! {
                event = self.link_events.recv(), if link_open => match event {
                    Some(event) => self.on_link_event(event),
                    None => {
                        warn!("Link task ended");
                        link_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.on_command(command) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or(self.started)), if deadline.is_some() => {}
                _ = frames.tick(), if animating => self.dashboard.frame(),
            }
        }

        info!("Shutting down");
        self.link.shutdown();
        self.tick();
        self.dashboard
    }
}

/// Log what the views see, for headless runs.
pub fn log_activity(dashboard: &Dashboard) -> Vec<Subscription> {
    let topics = [
        Topic::Message,
        Topic::Stage,
        Topic::Phase,
        Topic::Connection,
        Topic::Reset,
    ];
    topics
        .into_iter()
        .map(|topic| {
            dashboard.bus().on(topic, |event| {
                match event {
                    BusEvent::MessageAdded(m) => info!(
                        kind = ?m.kind,
                        from = %m.from,
                        to = m.to.as_deref().unwrap_or("-"),
                        text = m.payload.text().unwrap_or_default(),
                        "Message"
                    ),
                    BusEvent::StageChanged { stage } => info!(?stage, "Stage"),
                    BusEvent::PhaseChanged { phase } => info!(?phase, "Phase"),
                    BusEvent::ConnectionChanged { mode } => info!(?mode, "Connection"),
                    BusEvent::Reset => info!("Session reset"),
                    _ => {}
                }
                Ok(())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedServer;
    use crate::link::{self, LinkConfig, LinkState};
    use switchboard_vis::{DashboardConfig, Phase, Scenario};

    fn fast_config() -> DashboardConfig {
        let mut config = DashboardConfig::default();
        config.timing.speed = 0.01;
        config.timing.tick_ms = 5;
        config
    }

    fn link_config(url: String) -> LinkConfig {
        LinkConfig {
            url,
            reconnect_base: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(100),
            heartbeat: Duration::from_secs(5),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(" Play\n".parse::<UserCommand>().unwrap(), UserCommand::Play);
        assert_eq!("reset".parse::<UserCommand>().unwrap(), UserCommand::Reset);
        assert_eq!("exit".parse::<UserCommand>().unwrap(), UserCommand::Quit);
        assert!(matches!("dance".parse::<UserCommand>(), Err(Error::UnknownCommand(_))));
    }

    #[tokio::test]
    async fn plays_locally_without_a_feed() {
        let (handle, events, _task) = link::spawn(link_config("ws://127.0.0.1:1/ws".to_string()));
        let runtime = Runtime::new(Dashboard::new(fast_config()), handle, events);
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            tx.send(UserCommand::Play).unwrap();
            tokio::time::sleep(Duration::from_millis(400)).await;
            tx.send(UserCommand::Quit).unwrap();
        });
        let dashboard = runtime.run(rx).await;

        assert_eq!(dashboard.connection(), ConnectionMode::Demo);
        let session = dashboard.session();
        let session = session.read();
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.message_count(), 11);
    }

    #[tokio::test]
    async fn reset_leaves_demo_mode() {
        let (handle, events, _task) = link::spawn(link_config("ws://127.0.0.1:1/ws".to_string()));
        let mut runtime = Runtime::new(Dashboard::new(fast_config()), handle, events);

        assert!(runtime.on_command(UserCommand::Play));
        assert_eq!(runtime.dashboard().connection(), ConnectionMode::Demo);
        assert!(runtime.on_command(UserCommand::Reset));
        assert_eq!(runtime.dashboard().connection(), ConnectionMode::Disconnected);
        assert_eq!(runtime.dashboard().session().read().message_count(), 0);
        assert!(!runtime.on_command(UserCommand::Quit));
    }

    #[tokio::test]
    async fn reset_stops_the_feed_replay() {
        let server = FeedServer::new(Scenario::branch_a(), 0.1, 1500);
        let (addr, _server_task) = server.spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let (handle, events, _task) = link::spawn(link_config(format!("ws://{addr}/ws")));
        let mut watcher = handle.clone();
        let runtime = Runtime::new(Dashboard::new(DashboardConfig::default()), handle, events);
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            watcher.wait_for(|s| *s == LinkState::Connected).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(UserCommand::Play).unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            tx.send(UserCommand::Reset).unwrap();
            // the remaining replay would have finished well within this
            tokio::time::sleep(Duration::from_millis(1500)).await;
            tx.send(UserCommand::Quit).unwrap();
        });
        let dashboard = runtime.run(rx).await;

        assert!(!server.is_replaying().await);
        assert_eq!(dashboard.connection(), ConnectionMode::Connected);
        let session = dashboard.session();
        let session = session.read();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.message_count(), 0);
        assert!(dashboard.scheduler().run().is_none());
    }

    #[tokio::test]
    async fn feed_drives_a_live_run() {
        let server = FeedServer::new(Scenario::branch_a(), 0.01, 1500);
        let (addr, _server_task) = server.spawn("127.0.0.1:0".parse().unwrap()).await.unwrap();

        let (handle, events, _task) = link::spawn(link_config(format!("ws://{addr}/ws")));
        let mut watcher = handle.clone();
        let runtime = Runtime::new(Dashboard::new(DashboardConfig::default()), handle, events);
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            watcher.wait_for(|s| *s == LinkState::Connected).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(UserCommand::Play).unwrap();
            tokio::time::sleep(Duration::from_millis(600)).await;
            tx.send(UserCommand::Quit).unwrap();
        });
        let dashboard = runtime.run(rx).await;

        assert_eq!(dashboard.connection(), ConnectionMode::Connected);
        let session = dashboard.session();
        let session = session.read();
        assert_eq!(session.phase(), Phase::Complete);
        assert_eq!(session.message_count(), 11);
        assert_eq!(dashboard.log().entries().len(), 11);
    }
}
