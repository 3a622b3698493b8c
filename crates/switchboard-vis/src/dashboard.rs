//! Composition root: one session, one bus, one scheduler and the four views.
//!
//! A driver (the async runtime, or a test) feeds the dashboard inbound wire
//! messages, connection changes and clock readings. Everything the dashboard
//! does in response happens synchronously inside those calls.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use tracing::{debug, error, info, trace, warn};

use crate::bus::EventBus;
use crate::config::DashboardConfig;
use crate::particles::ParticleAnimator;
use crate::scheduler::{RunKind, Scheduler};
use crate::session::{ConnectionMode, Phase, Session, SessionReader};
use crate::views::{AgentCardsView, MessageLogView, TimelineView, TopologyView, View};
use crate::wire::{Control, Inbound, Outbound};

/// What a playback request turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackRequest {
    /// Connected to a feed: send this and let the feed drive the run
    Remote(Outbound),
    /// Replaying a scenario locally
    Local { scenario: String },
    /// No scenario to play
    Unavailable,
}

/// What the driver still has to do after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The local reset was all there was to it
    Local,
    /// Demo mode ended; resume the feed link
    ResumeLink,
    /// A feed replay was driving the run; send this to stop it
    StopFeed(Outbound),
}

pub struct Dashboard {
    config: DashboardConfig,
    scheduler: Scheduler,
    cards: Option<Rc<RefCell<AgentCardsView>>>,
    topology: Option<Rc<RefCell<TopologyView>>>,
    timeline: Rc<RefCell<TimelineView>>,
    log: Rc<RefCell<MessageLogView>>,
    problems: Vec<String>,
    clock_ms: u64,
    /// Set between asking the feed to stop and hearing that it did
    stopping_feed: bool,
}

impl Dashboard {
    /// Build everything from `config`.
    ///
    /// Misconfiguration is logged and only the affected feature is left out.
    pub fn new(config: DashboardConfig) -> Self {
        let problems = config.validate();
        for problem in &problems {
            error!(%problem, "Configuration problem");
        }

        let bus = EventBus::new();
        let session = Session::new(config.agent_keys());
        let scheduler = Scheduler::new(
            session,
            bus.clone(),
            config.scheduler_timing(),
            config.orchestrator.clone(),
        );

        let cards = match AgentCardsView::new(&config.agents, scheduler.session()) {
            Ok(view) => {
                let view = Rc::new(RefCell::new(view));
                AgentCardsView::attach(&view, &bus);
                Some(view)
            }
            Err(e) => {
                error!(error = %e, "Agent cards disabled");
                None
            }
        };

        let (paths, failed) = config.path_set();
        for (link, e) in &failed {
            error!(%link, error = %e, "Link left out of topology");
        }
        let topology = if paths.is_empty() {
            error!("No drawable links, topology disabled");
            None
        } else {
            let particles = config.particle_settings();
            if particles != config.particles {
                warn!(?particles, "Particle settings unusable, falling back to defaults");
            }
            let animator = ParticleAnimator::new(paths, particles);
            let view = Rc::new(RefCell::new(TopologyView::new(
                &config.agents,
                &config.links,
                animator,
                config.timing.pulse_ms,
            )));
            TopologyView::attach(&view, &bus);
            Some(view)
        };

        let timeline = Rc::new(RefCell::new(TimelineView::new(scheduler.session())));
        TimelineView::attach(&timeline, &bus);

        let log = Rc::new(RefCell::new(MessageLogView::new()));
        MessageLogView::attach(&log, &bus);

        info!(
            agents = config.agents.len(),
            links = config.links.len(),
            scenarios = config.scenarios.len(),
            "Dashboard ready"
        );

        Self {
            config,
            scheduler,
            cards,
            topology,
            timeline,
            log,
            problems,
            clock_ms: 0,
            stopping_feed: false,
        }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Problems found in the configuration at start-up.
    pub fn problems(&self) -> &[String] {
        &self.problems
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn session(&self) -> SessionReader {
        self.scheduler.session()
    }

    pub fn bus(&self) -> &EventBus {
        self.scheduler.bus()
    }

    pub fn connection(&self) -> ConnectionMode {
        self.scheduler.session().read().connection()
    }

    pub fn cards(&self) -> Option<Ref<'_, AgentCardsView>> {
        self.cards.as_ref().map(|v| v.borrow())
    }

    pub fn topology(&self) -> Option<Ref<'_, TopologyView>> {
        self.topology.as_ref().map(|v| v.borrow())
    }

    pub fn timeline(&self) -> Ref<'_, TimelineView> {
        self.timeline.borrow()
    }

    pub fn log(&self) -> Ref<'_, MessageLogView> {
        self.log.borrow()
    }

    /// The user asked for playback.
    ///
    /// With a live feed attached the feed runs the replay. Otherwise the
    /// dashboard switches to demo mode and replays the default scenario.
    pub fn start_playback(&mut self) -> PlaybackRequest {
        if self.connection() == ConnectionMode::Connected {
            info!("Requesting replay from feed");
            return PlaybackRequest::Remote(Outbound::StartDemo);
        }

        let scenario = match self.config.default_scenario() {
            Ok(scenario) => scenario.clone(),
            Err(e) => {
                error!(error = %e, "Playback unavailable");
                return PlaybackRequest::Unavailable;
            }
        };
        self.scheduler.set_connection(ConnectionMode::Demo);
        self.scheduler.start_scripted(&scenario);
        PlaybackRequest::Local {
            scenario: scenario.name,
        }
    }

    /// Stop any run and clear the session.
    ///
    /// Leaving demo mode disconnects the dashboard and asks the caller to
    /// resume its link. Resetting a feed-driven run asks the caller to stop
    /// the feed; its events are dropped until the feed confirms.
    pub fn reset(&mut self) -> ResetOutcome {
        let feed_running = self.connection() == ConnectionMode::Connected
            && self.scheduler.run() == Some(&RunKind::Live)
            && self.scheduler.phase() == Phase::Running;
        self.scheduler.reset();

        if self.connection() == ConnectionMode::Demo {
            self.scheduler.set_connection(ConnectionMode::Disconnected);
            return ResetOutcome::ResumeLink;
        }
        if feed_running {
            info!("Asking feed to stop its replay");
            self.stopping_feed = true;
            return ResetOutcome::StopFeed(Outbound::StopDemo);
        }
        ResetOutcome::Local
    }

    pub fn on_connected(&mut self) {
        self.stopping_feed = false;
        self.scheduler.set_connection(ConnectionMode::Connected);
    }

    pub fn on_disconnected(&mut self) {
        self.stopping_feed = false;
        if self.connection() == ConnectionMode::Connected {
            self.scheduler.set_connection(ConnectionMode::Disconnected);
        }
    }

    /// Handle one decoded message from the feed.
    pub fn on_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Event(event) if self.stopping_feed => {
                debug!(kind = event.kind(), "Feed stopping, event dropped");
            }
            Inbound::Event(event) => {
                if let Err(e) = self.scheduler.apply_live(&event) {
                    debug!(error = %e, "Live event not applied");
                }
            }
            Inbound::Control(control) => self.on_control(control),
        }
    }

    fn on_control(&mut self, control: Control) {
        match control {
            Control::BridgeStatus { status, rooms } => {
                info!(%status, rooms = rooms.len(), "Feed status");
            }
            Control::Message { sender, .. } if self.stopping_feed => {
                debug!(%sender, "Feed stopping, chat dropped");
            }
            Control::Message { sender, content, .. } => match self.config.map_sender(&sender) {
                Some(agent) => {
                    let agent = agent.to_string();
                    if let Err(e) = self.scheduler.record_chat(&agent, &content) {
                        debug!(error = %e, "Chat not recorded");
                    }
                }
                None => debug!(%sender, "Chat from unmapped sender ignored"),
            },
            Control::DemoStarted { scenario } => {
                info!(%scenario, "Feed replay started");
                self.stopping_feed = false;
                self.scheduler.begin_live();
            }
            Control::DemoComplete { scenario } => {
                info!(%scenario, "Feed replay complete");
                if self.stopping_feed {
                    self.stopping_feed = false;
                    return;
                }
                self.scheduler.complete();
            }
            Control::DemoStopped { scenario } => {
                info!(%scenario, "Feed replay stopped");
                self.stopping_feed = false;
                self.scheduler.stop();
            }
            Control::Pong => trace!("Pong"),
            Control::Error { message } => warn!(%message, "Feed reported an error"),
        }
    }

    /// Move the clock to `now_ms`: fire due timers and let link pulses fade.
    pub fn advance_to(&mut self, now_ms: u64) {
        let dt = now_ms.saturating_sub(self.clock_ms);
        self.clock_ms = self.clock_ms.max(now_ms);
        if let Some(topology) = &self.topology {
            topology.borrow_mut().advance(dt);
        }
        self.scheduler.advance_to(now_ms);
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    /// Whether the topology needs animation frames.
    pub fn wants_frame(&self) -> bool {
        self.topology
            .as_ref()
            .is_some_and(|t| t.borrow().is_animating())
    }

    /// Run one animation frame.
    pub fn frame(&mut self) {
        if let Some(topology) = &self.topology {
            topology.borrow_mut().step_frame();
        }
    }

    /// Re-derive every view from the session.
    pub fn rebuild_views(&mut self) {
        let reader = self.scheduler.session();
        let session = reader.read();
        if let Some(cards) = &self.cards {
            cards.borrow_mut().rebuild(&session);
        }
        if let Some(topology) = &self.topology {
            topology.borrow_mut().rebuild(&session);
        }
        self.timeline.borrow_mut().rebuild(&session);
        self.log.borrow_mut().rebuild(&session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;
    use crate::session::{AgentStatus, Phase};

    #[test]
    fn local_playback_when_disconnected() {
        let mut d = Dashboard::new(DashboardConfig::default());
        assert!(d.problems().is_empty());

        let request = d.start_playback();
        assert_eq!(
            request,
            PlaybackRequest::Local {
                scenario: "branchA".to_string()
            }
        );
        assert_eq!(d.connection(), ConnectionMode::Demo);

        d.advance_to(1000);
        assert_eq!(d.session().read().message_count(), 3);
        assert!(d.wants_frame());
        assert_eq!(d.log().entries().len(), 3);

        assert_eq!(d.reset(), ResetOutcome::ResumeLink);
        assert_eq!(d.connection(), ConnectionMode::Disconnected);
        assert!(!d.wants_frame());
        assert_eq!(d.session().read().phase(), Phase::Idle);
    }

    #[test]
    fn remote_playback_when_connected() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.on_connected();
        assert_eq!(d.start_playback(), PlaybackRequest::Remote(Outbound::StartDemo));
        assert_eq!(d.session().read().phase(), Phase::Idle);
        assert_eq!(d.reset(), ResetOutcome::Local);
    }

    #[test]
    fn reset_during_feed_replay_stops_the_feed() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.on_connected();
        d.on_inbound(Inbound::decode(r#"{"type":"demo_started","scenario":"branchA"}"#).unwrap());
        d.on_inbound(
            Inbound::decode(r#"{"type":"user_message","from":"user","to":"orchestrator","payload":{"text":"help"}}"#)
                .unwrap(),
        );
        assert_eq!(d.session().read().message_count(), 1);

        assert_eq!(d.reset(), ResetOutcome::StopFeed(Outbound::StopDemo));
        assert_eq!(d.connection(), ConnectionMode::Connected);

        // still in flight when the feed got the stop
        d.on_inbound(
            Inbound::decode(
                r#"{"type":"dispatch","from":"orchestrator","targets":["excel"],"payload":{"text":"look"}}"#,
            )
            .unwrap(),
        );
        d.on_inbound(
            Inbound::decode(r#"{"type":"message","sender":"ExcelAgent","content":"late"}"#).unwrap(),
        );
        d.on_inbound(Inbound::decode(r#"{"type":"demo_stopped","scenario":"branchA"}"#).unwrap());
        {
            let session = d.session();
            let session = session.read();
            assert_eq!(session.phase(), Phase::Idle);
            assert_eq!(session.message_count(), 0);
        }
        assert!(d.scheduler().run().is_none());

        // a second reset has nothing left to stop
        assert_eq!(d.reset(), ResetOutcome::Local);

        // once stopped, the feed drives runs again
        d.on_inbound(
            Inbound::decode(r#"{"type":"agent_status","agent":"excel","status":"working"}"#).unwrap(),
        );
        assert_eq!(d.session().read().phase(), Phase::Running);
    }

    #[test]
    fn feed_lifecycle_drives_live_run() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.on_connected();
        d.on_inbound(Inbound::decode(r#"{"type":"demo_started","scenario":"branchA"}"#).unwrap());
        assert_eq!(d.session().read().phase(), Phase::Running);

        d.on_inbound(
            Inbound::decode(r#"{"type":"agent_status","agent":"excel","status":"working","task":"lookup"}"#)
                .unwrap(),
        );
        d.on_inbound(
            Inbound::decode(r#"{"type":"message","sender":"ExcelAgent","content":"found it"}"#).unwrap(),
        );
        d.on_inbound(
            Inbound::decode(r#"{"type":"message","sender":"Stranger","content":"hello"}"#).unwrap(),
        );

        {
            let session = d.session();
            let session = session.read();
            assert_eq!(session.message_count(), 2);
            assert_eq!(session.agent("excel").unwrap().status, AgentStatus::Working);
        }

        d.advance_to(250);
        d.on_inbound(Inbound::decode(r#"{"type":"demo_complete","scenario":"branchA"}"#).unwrap());
        assert_eq!(d.session().read().phase(), Phase::Complete);
        assert_eq!(d.timeline().elapsed_ms(), 250);
        assert_eq!(d.scheduler().pending_timers(), 0);
    }

    #[test]
    fn demo_stopped_leaves_session_intact() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.on_inbound(Inbound::decode(r#"{"type":"demo_started"}"#).unwrap());
        d.on_inbound(
            Inbound::decode(r#"{"type":"agent_status","agent":"github","status":"working"}"#).unwrap(),
        );
        d.on_inbound(Inbound::decode(r#"{"type":"demo_stopped"}"#).unwrap());

        assert_eq!(d.session().read().phase(), Phase::Idle);
        assert_eq!(d.session().read().message_count(), 1);
    }

    #[test]
    fn broken_link_only_disables_that_link() {
        let mut config = DashboardConfig::default();
        config.links.push(LinkConfig {
            from: "user".to_string(),
            to: "excel".to_string(),
            path: "M 0 0 X".to_string(),
        });
        let d = Dashboard::new(config);

        assert_eq!(d.problems().len(), 1);
        let topology = d.topology().unwrap();
        assert_eq!(topology.lines().len(), 5);
        assert!(d.cards().is_some());
    }

    #[test]
    fn steps_naming_unknown_agents_are_skipped() {
        let mut config = DashboardConfig::default();
        config.agents[2].key = "spreadsheet".to_string();
        let mut d = Dashboard::new(config);
        assert!(d.cards().is_some());
        assert!(!d.problems().is_empty());

        assert!(matches!(d.start_playback(), PlaybackRequest::Local { .. }));
        d.advance_to(20_000);
        assert_eq!(d.session().read().phase(), Phase::Complete);
    }

    #[test]
    fn zero_tick_interval_is_reported_and_playback_finishes() {
        let mut config = DashboardConfig::default();
        config.timing.tick_ms = 0;
        let mut d = Dashboard::new(config);
        assert_eq!(d.problems().len(), 1);

        d.start_playback();
        d.advance_to(100);
        assert_eq!(d.session().read().message_count(), 1);
        d.advance_to(20_000);
        assert_eq!(d.session().read().phase(), Phase::Complete);
        assert_eq!(d.scheduler().pending_timers(), 0);
    }

    #[test]
    fn stalled_particle_speed_falls_back_to_default_motion() {
        let mut config = DashboardConfig::default();
        config.particles.speed = 0.0;
        let mut d = Dashboard::new(config);
        assert_eq!(d.problems().len(), 1);

        d.start_playback();
        let mut frames = 0;
        for now in (0..=12_000).step_by(16) {
            d.advance_to(now);
            if d.wants_frame() {
                d.frame();
                frames += 1;
            }
        }
        assert!(frames > 0);
        assert!(!d.wants_frame());

        let topology = d.topology().unwrap();
        let stats = topology.animator().stats();
        assert_eq!(stats.sent, 6);
        assert_eq!(stats.delivered, stats.sent);
    }

    #[test]
    fn rebuild_views_matches_live_views() {
        let mut d = Dashboard::new(DashboardConfig::default());
        d.start_playback();
        d.advance_to(6000);

        let before = (d.log().entries().to_vec(), d.timeline().markers().to_vec());
        d.rebuild_views();
        let after = (d.log().entries().to_vec(), d.timeline().markers().to_vec());
        assert_eq!(before, after);
    }
}
