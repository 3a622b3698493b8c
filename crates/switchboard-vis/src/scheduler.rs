//! Run control and event application.
//!
//! The scheduler is the single writer of the [`Session`]. It owns a virtual
//! timer queue for scripted runs and the elapsed-time tick, and it funnels
//! scripted steps and live events through one [`Scheduler::apply`] so both
//! drive sources produce the same state and the same bus traffic.
//!
//! At most one run is active. Starting a run stops the previous one, cancels
//! every pending timer and resets the session before anything is scheduled.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::bus::{AgentUpdate, BusEvent, EventBus, Stage, Traversal, TraversalKind};
use crate::error::{Error, Result};
use crate::events::{AgentKey, Payload, ScriptEvent};
use crate::scenario::Scenario;
use crate::session::{AgentStatus, ConnectionMode, MessageKind, Phase, Session, SessionReader};
use crate::timer::{TimerId, TimerQueue};

/// Timer payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Cue {
    /// Apply one scripted event
    Step(ScriptEvent),
    /// Publish elapsed time and re-arm
    Tick,
    /// End of a scripted run
    Finish,
}

/// Timing knobs the scheduler needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerTiming {
    /// Interval of the elapsed-time tick
    pub tick_ms: u64,
    /// Scripted offsets are multiplied by this
    pub speed: f64,
    /// Delay after the last scripted step before the run completes
    pub finish_grace_ms: u64,
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            speed: 1.0,
            finish_grace_ms: 1500,
        }
    }
}

/// Which source drives the active run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKind {
    Scripted { scenario: String },
    Live,
}

/// The choreography state machine.
pub struct Scheduler {
    session: Rc<RefCell<Session>>,
    bus: EventBus,
    timers: TimerQueue<Cue>,
    timing: SchedulerTiming,
    orchestrator: AgentKey,
    run: Option<RunKind>,
    tick_timer: Option<TimerId>,
    run_started_ms: Option<u64>,
    frozen_elapsed_ms: Option<u64>,
}

impl Scheduler {
    pub fn new(
        session: Session,
        bus: EventBus,
        timing: SchedulerTiming,
        orchestrator: impl Into<AgentKey>,
    ) -> Self {
        Self {
            session: Rc::new(RefCell::new(session)),
            bus,
            timers: TimerQueue::new(),
            timing: SchedulerTiming {
                // a zero interval would re-arm the tick at the instant it fired
                tick_ms: timing.tick_ms.max(1),
                ..timing
            },
            orchestrator: orchestrator.into(),
            run: None,
            tick_timer: None,
            run_started_ms: None,
            frozen_elapsed_ms: None,
        }
    }

    /// Read-only access for views.
    pub fn session(&self) -> SessionReader {
        SessionReader::new(self.session.clone())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn phase(&self) -> Phase {
        self.session.borrow().phase()
    }

    pub fn run(&self) -> Option<&RunKind> {
        self.run.as_ref()
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.timers.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Milliseconds since the active run started; frozen once it completes.
    pub fn elapsed_ms(&self) -> u64 {
        if let Some(frozen) = self.frozen_elapsed_ms {
            return frozen;
        }
        self.run_started_ms
            .map(|start| self.timers.now().saturating_sub(start))
            .unwrap_or(0)
    }

    fn scaled(&self, ms: u64) -> u64 {
        (ms as f64 * self.timing.speed).round().max(0.0) as u64
    }

    /// Replay `scenario` on the local clock.
    pub fn start_scripted(&mut self, scenario: &Scenario) {
        self.reset();
        info!(scenario = %scenario.name, steps = scenario.len(), speed = self.timing.speed, "Starting scripted run");

        self.begin_run(RunKind::Scripted {
            scenario: scenario.name.clone(),
        });
        for step in &scenario.steps {
            self.timers
                .schedule_in(self.scaled(step.t), Cue::Step(step.event.clone()));
        }
        let finish_at = self.scaled(scenario.last_offset_ms() + self.timing.finish_grace_ms);
        self.timers.schedule_in(finish_at, Cue::Finish);
    }

    /// Start a run driven by a remote feed.
    pub fn begin_live(&mut self) {
        self.reset();
        info!("Starting live run");
        self.begin_run(RunKind::Live);
    }

    fn begin_run(&mut self, kind: RunKind) {
        self.run = Some(kind);
        self.run_started_ms = Some(self.timers.now());
        self.frozen_elapsed_ms = None;
        self.session.borrow_mut().set_phase(Phase::Running);
        self.bus.emit(&BusEvent::PhaseChanged {
            phase: Phase::Running,
        });
        self.tick_timer = Some(self.timers.schedule_in(self.timing.tick_ms, Cue::Tick));
    }

    /// Finish the active run: freeze elapsed time, stop the tick, mark
    /// complete. Ignored when nothing is running.
    pub fn complete(&mut self) {
        if self.phase() != Phase::Running {
            debug!("Complete ignored, no run active");
            return;
        }
        let elapsed = self.elapsed_ms();
        self.frozen_elapsed_ms = Some(elapsed);
        if let Some(id) = self.tick_timer.take() {
            self.timers.cancel(id);
        }
        self.session.borrow_mut().set_phase(Phase::Complete);
        info!(elapsed_ms = elapsed, "Run complete");

        self.bus.emit(&BusEvent::Tick { elapsed_ms: elapsed });
        self.bus.emit(&BusEvent::PhaseChanged {
            phase: Phase::Complete,
        });
    }

    /// Cancel every pending timer and leave the running phase.
    ///
    /// Safe to call repeatedly and while nothing runs.
    pub fn stop(&mut self) {
        if !self.timers.is_empty() {
            debug!(pending = self.timers.len(), "Cancelling timers");
        }
        self.timers.clear();
        self.tick_timer = None;
        self.run = None;

        if self.phase() == Phase::Running {
            self.frozen_elapsed_ms = Some(self.elapsed_ms());
            self.session.borrow_mut().set_phase(Phase::Idle);
            self.bus.emit(&BusEvent::PhaseChanged { phase: Phase::Idle });
        }
    }

    /// Stop, then return the session to its initial state.
    pub fn reset(&mut self) {
        self.stop();
        self.session.borrow_mut().reset();
        self.run_started_ms = None;
        self.frozen_elapsed_ms = None;
        self.bus.emit(&BusEvent::Reset);
    }

    /// Apply an event pushed by a live feed, starting a live run if none is
    /// active.
    pub fn apply_live(&mut self, event: &ScriptEvent) -> Result<()> {
        self.validate(event)?;
        let live_running = self.run == Some(RunKind::Live) && self.phase() == Phase::Running;
        if !live_running {
            self.begin_live();
        }
        self.apply(event)
    }

    /// Record connection state and announce it.
    pub fn set_connection(&mut self, mode: ConnectionMode) {
        if self.session.borrow().connection() == mode {
            return;
        }
        self.session.borrow_mut().set_connection(mode);
        self.bus.emit(&BusEvent::ConnectionChanged { mode });
    }

    /// Record raw chat from a known agent as a status message.
    pub fn record_chat(&mut self, agent: &str, text: &str) -> Result<()> {
        let now = self.timers.now();
        let emitted = {
            let mut session = self.session.borrow_mut();
            if !session.has_agent(agent) {
                warn!(agent, "Chat from unknown agent ignored");
                return Err(Error::UnknownAgent(agent.to_string()));
            }
            session.touch_agent(agent, now)?;
            let message = session
                .add_message(MessageKind::Status, agent, None, Payload::from_text(text), now)
                .clone();
            BusEvent::MessageAdded(message)
        };
        self.bus.emit(&emitted);
        Ok(())
    }

    /// Apply one event at the current time.
    ///
    /// Unknown kinds and events naming unknown agents are rejected before
    /// anything is mutated.
    pub fn apply(&mut self, event: &ScriptEvent) -> Result<()> {
        self.validate(event)?;

        let now = self.timers.now();
        debug!(kind = event.kind(), at_ms = now, "Applying event");

        let emitted = {
            let mut session = self.session.borrow_mut();
            let mut out = Vec::new();
            Self::mutate(&mut session, &self.orchestrator, event, now, &mut out)?;
            out
        };
        for e in &emitted {
            self.bus.emit(e);
        }
        Ok(())
    }

    fn validate(&self, event: &ScriptEvent) -> Result<()> {
        if let ScriptEvent::Unrecognized = event {
            warn!("Rejected event of unknown kind");
            return Err(Error::UnknownKind(event.kind().to_string()));
        }
        let session = self.session.borrow();
        let mut named = event.agents();
        if let ScriptEvent::AgentResult { .. } = event {
            named.push(self.orchestrator.as_str());
        }
        if let Some(unknown) = named.into_iter().find(|key| !session.has_agent(key)) {
            warn!(kind = event.kind(), agent = unknown, "Rejected event naming unknown agent");
            return Err(Error::UnknownAgent(unknown.to_string()));
        }
        Ok(())
    }

    fn mutate(
        session: &mut Session,
        orchestrator: &str,
        event: &ScriptEvent,
        now: u64,
        out: &mut Vec<BusEvent>,
    ) -> Result<()> {
        match event {
            ScriptEvent::UserMessage { from, to, payload } => {
                set_status(session, out, from, AgentStatus::Working, None, now)?;
                set_status(session, out, to, AgentStatus::Working, None, now)?;
                let msg = session.add_message(MessageKind::UserMessage, from, Some(to.as_str()), payload.clone(), now);
                out.push(BusEvent::MessageAdded(msg.clone()));
                let tl = session.add_timeline_event(MessageKind::UserMessage, from, "Request received", now);
                out.push(BusEvent::TimelineAdded(tl.clone()));
                out.push(BusEvent::StageChanged {
                    stage: Stage::Acknowledge,
                });
            }

            ScriptEvent::AgentStatus {
                agent,
                status,
                task,
                payload,
                synthesis,
            } => {
                let text = task.clone().or_else(|| payload.text().map(str::to_string));
                set_status(session, out, agent, *status, text.clone(), now)?;
                let payload = match (payload.text(), &text) {
                    (None, Some(t)) => Payload::from_text(t.clone()),
                    _ => payload.clone(),
                };
                let msg = session.add_message(MessageKind::Status, agent, None, payload, now);
                out.push(BusEvent::MessageAdded(msg.clone()));
                let label = format!("{} {}", agent, status_label(*status));
                let tl = session.add_timeline_event(MessageKind::Status, agent, label, now);
                out.push(BusEvent::TimelineAdded(tl.clone()));
                if *synthesis {
                    out.push(BusEvent::StageChanged {
                        stage: Stage::Synthesize,
                    });
                }
            }

            ScriptEvent::Dispatch {
                from,
                targets,
                payload,
            } => {
                set_status(session, out, from, AgentStatus::Working, None, now)?;
                for target in targets {
                    let task = payload.task_for(target).map(str::to_string);
                    set_status(session, out, target, AgentStatus::Idle, task, now)?;
                }
                let msg = session.add_message(MessageKind::Dispatch, from, None, payload.clone(), now);
                out.push(BusEvent::MessageAdded(msg.clone()));
                let label = format!("Dispatch to {}", targets.join(", "));
                let tl = session.add_timeline_event(MessageKind::Dispatch, from, label, now);
                out.push(BusEvent::TimelineAdded(tl.clone()));
                for target in targets {
                    out.push(BusEvent::Traversal(Traversal {
                        from: from.clone(),
                        to: target.clone(),
                        kind: TraversalKind::Dispatch,
                    }));
                }
                out.push(BusEvent::StageChanged {
                    stage: Stage::Investigate,
                });
            }

            ScriptEvent::AgentResult {
                agent,
                status,
                payload,
            } => {
                let text = payload.text().map(str::to_string);
                set_status(session, out, agent, *status, text, now)?;
                let msg = session.add_message(
                    MessageKind::Result,
                    agent,
                    Some(orchestrator),
                    payload.clone(),
                    now,
                );
                out.push(BusEvent::MessageAdded(msg.clone()));
                let tl = session.add_timeline_event(MessageKind::Result, agent, format!("{} result", agent), now);
                out.push(BusEvent::TimelineAdded(tl.clone()));
                out.push(BusEvent::Traversal(Traversal {
                    from: agent.clone(),
                    to: orchestrator.to_string(),
                    kind: TraversalKind::Result,
                }));
            }

            ScriptEvent::FinalResponse { from, to, payload } => {
                set_status(session, out, from, AgentStatus::Done, None, now)?;
                set_status(session, out, to, AgentStatus::Done, None, now)?;
                let msg = session.add_message(MessageKind::FinalResponse, from, Some(to.as_str()), payload.clone(), now);
                out.push(BusEvent::MessageAdded(msg.clone()));
                let tl = session.add_timeline_event(MessageKind::FinalResponse, from, "Final response", now);
                out.push(BusEvent::TimelineAdded(tl.clone()));
            }

            ScriptEvent::Unrecognized => {
                return Err(Error::UnknownKind(event.kind().to_string()));
            }
        }
        Ok(())
    }

    /// Advance the virtual clock to `now_ms`, firing every timer due by then
    /// in order.
    pub fn advance_to(&mut self, now_ms: u64) {
        while let Some((id, cue)) = self.timers.pop_due(now_ms) {
            match cue {
                Cue::Step(event) => {
                    if let Err(e) = self.apply(&event) {
                        debug!(error = %e, "Scripted step skipped");
                    }
                }
                Cue::Tick => {
                    if self.tick_timer == Some(id) {
                        self.tick_timer = Some(self.timers.schedule_in(self.timing.tick_ms, Cue::Tick));
                    }
                    self.bus.emit(&BusEvent::Tick {
                        elapsed_ms: self.elapsed_ms(),
                    });
                }
                Cue::Finish => self.complete(),
            }
        }
        self.timers.set_now(now_ms);
    }
}

fn set_status(
    session: &mut Session,
    out: &mut Vec<BusEvent>,
    key: &str,
    status: AgentStatus,
    task: Option<String>,
    now: u64,
) -> Result<()> {
    let agent = session.set_agent_status(key, status, task, now)?;
    out.push(BusEvent::AgentChanged(AgentUpdate {
        key: agent.key.clone(),
        status: agent.status,
        task: agent.task.clone(),
        at_ms: now,
    }));
    Ok(())
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => "idle",
        AgentStatus::Working => "working",
        AgentStatus::Thinking => "thinking",
        AgentStatus::Done => "done",
        AgentStatus::Error => "error",
    }
}
