//! Canonical session record: agents, message log and timeline.
//!
//! The scheduler is the only writer. Views reach the session through a
//! [`SessionReader`], which hands out shared borrows only.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{AgentKey, Payload};

/// Status of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Thinking,
    Done,
    Error,
}

impl AgentStatus {
    /// Working or thinking.
    pub fn is_active(self) -> bool {
        matches!(self, AgentStatus::Working | AgentStatus::Thinking)
    }
}

/// One agent taking part in the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agent {
    pub key: AgentKey,
    pub status: AgentStatus,
    /// Clock time (ms) of the last change to this agent
    pub last_activity_ms: Option<u64>,
    pub task: Option<String>,
}

impl Agent {
    fn idle(key: AgentKey) -> Self {
        Self {
            key,
            status: AgentStatus::Idle,
            last_activity_ms: None,
            task: None,
        }
    }
}

/// Message taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserMessage,
    Dispatch,
    Status,
    Result,
    FinalResponse,
}

/// Append-only message log entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub kind: MessageKind,
    pub from: AgentKey,
    pub to: Option<AgentKey>,
    pub payload: Payload,
    pub at_ms: u64,
}

/// A message or agent transition projected onto the session's time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub kind: MessageKind,
    pub agent: AgentKey,
    pub label: String,
    /// Milliseconds since the session started
    pub offset_ms: u64,
}

/// One status assignment, kept so views can re-derive activity intervals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub agent: AgentKey,
    pub status: AgentStatus,
    pub offset_ms: u64,
}

/// Run phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Complete,
}

/// How the dashboard is currently fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    Disconnected,
    Connected,
    Demo,
}

/// The session record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    agents: BTreeMap<AgentKey, Agent>,
    messages: Vec<Message>,
    timeline: Vec<TimelineEvent>,
    status_history: Vec<StatusChange>,
    phase: Phase,
    connection: ConnectionMode,
    started_at_ms: Option<u64>,
}

impl Session {
    /// Create a session with every configured agent idle.
    pub fn new<I, K>(agents: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<AgentKey>,
    {
        let agents = agents
            .into_iter()
            .map(|k| {
                let key = k.into();
                (key.clone(), Agent::idle(key))
            })
            .collect();

        Self {
            agents,
            messages: Vec::new(),
            timeline: Vec::new(),
            status_history: Vec::new(),
            phase: Phase::Idle,
            connection: ConnectionMode::Disconnected,
            started_at_ms: None,
        }
    }

    /// Set an agent's status, optionally replacing its task text.
    pub fn set_agent_status(
        &mut self,
        key: &str,
        status: AgentStatus,
        task: Option<String>,
        now_ms: u64,
    ) -> Result<&Agent> {
        let offset_ms = self.offset_of(now_ms);
        let agent = self
            .agents
            .get_mut(key)
            .ok_or_else(|| Error::UnknownAgent(key.to_string()))?;
        self.status_history.push(StatusChange {
            agent: key.to_string(),
            status,
            offset_ms,
        });
        agent.status = status;
        if task.is_some() {
            agent.task = task;
        }
        agent.last_activity_ms = Some(now_ms);
        Ok(agent)
    }

    /// Refresh an agent's last-activity time without changing its status.
    pub fn touch_agent(&mut self, key: &str, now_ms: u64) -> Result<()> {
        let agent = self
            .agents
            .get_mut(key)
            .ok_or_else(|| Error::UnknownAgent(key.to_string()))?;
        agent.last_activity_ms = Some(now_ms);
        Ok(())
    }

    /// Append a message with a freshly generated id.
    pub fn add_message(
        &mut self,
        kind: MessageKind,
        from: &str,
        to: Option<&str>,
        payload: Payload,
        now_ms: u64,
    ) -> &Message {
        self.mark_started(now_ms);
        self.messages.push(Message {
            id: Uuid::new_v4().to_string(),
            kind,
            from: from.to_string(),
            to: to.map(str::to_string),
            payload,
            at_ms: now_ms,
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Append a timeline event; its offset is fixed here, at insertion.
    ///
    /// Offsets never decrease in insertion order, even if `now_ms` does.
    pub fn add_timeline_event(
        &mut self,
        kind: MessageKind,
        agent: &str,
        label: impl Into<String>,
        now_ms: u64,
    ) -> &TimelineEvent {
        self.mark_started(now_ms);
        let floor = self.timeline.last().map(|e| e.offset_ms).unwrap_or(0);
        let offset_ms = self.offset_of(now_ms).max(floor);
        self.timeline.push(TimelineEvent {
            kind,
            agent: agent.to_string(),
            label: label.into(),
            offset_ms,
        });
        &self.timeline[self.timeline.len() - 1]
    }

    /// Record the session start if it has not started yet.
    pub fn mark_started(&mut self, now_ms: u64) {
        if self.started_at_ms.is_none() {
            self.started_at_ms = Some(now_ms);
        }
    }

    /// Milliseconds between session start and `now_ms` (0 before start).
    pub fn offset_of(&self, now_ms: u64) -> u64 {
        self.started_at_ms
            .map(|start| now_ms.saturating_sub(start))
            .unwrap_or(0)
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn set_connection(&mut self, mode: ConnectionMode) {
        self.connection = mode;
    }

    /// Every agent back to idle, both logs cleared, start time and phase reset.
    ///
    /// Agents stay in the mapping; the connection mode is left alone.
    pub fn reset(&mut self) {
        for agent in self.agents.values_mut() {
            agent.status = AgentStatus::Idle;
            agent.task = None;
            agent.last_activity_ms = None;
        }
        self.messages.clear();
        self.timeline.clear();
        self.status_history.clear();
        self.started_at_ms = None;
        self.phase = Phase::Idle;
    }

    pub fn agent(&self, key: &str) -> Option<&Agent> {
        self.agents.get(key)
    }

    pub fn has_agent(&self, key: &str) -> bool {
        self.agents.contains_key(key)
    }

    /// Agents ordered by key.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    /// Every status assignment since the last reset, in order.
    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connection(&self) -> ConnectionMode {
        self.connection
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    /// Agents currently working or thinking. Computed on every call.
    pub fn active_agent_count(&self) -> usize {
        self.agents.values().filter(|a| a.status.is_active()).count()
    }

    /// Messages logged so far. Computed on every call.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Read-only handle to a shared session.
#[derive(Debug, Clone)]
pub struct SessionReader(Rc<RefCell<Session>>);

impl SessionReader {
    pub(crate) fn new(session: Rc<RefCell<Session>>) -> Self {
        Self(session)
    }

    /// Borrow the session for reading.
    pub fn read(&self) -> Ref<'_, Session> {
        self.0.borrow()
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> Session {
        self.0.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn session() -> Session {
        Session::new(["user", "orchestrator", "excel"])
    }

    #[test]
    fn session_starts_idle() {
        let s = session();
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.connection(), ConnectionMode::Disconnected);
        assert_eq!(s.started_at_ms(), None);
        assert!(s.agents().all(|a| a.status == AgentStatus::Idle));
        assert_eq!(s.active_agent_count(), 0);
        assert_eq!(s.message_count(), 0);
    }

    #[test]
    fn unknown_agent_rejected() {
        let mut s = session();
        let err = s.set_agent_status("linear", AgentStatus::Working, None, 10);
        assert!(matches!(err, Err(Error::UnknownAgent(ref k)) if k == "linear"));
        assert!(s.touch_agent("linear", 10).is_err());
    }

    #[test]
    fn status_keeps_task_unless_replaced() {
        let mut s = session();
        s.set_agent_status("excel", AgentStatus::Idle, Some("lookup".into()), 5)
            .unwrap();
        s.set_agent_status("excel", AgentStatus::Working, None, 7).unwrap();

        let excel = s.agent("excel").unwrap();
        assert_eq!(excel.status, AgentStatus::Working);
        assert_eq!(excel.task.as_deref(), Some("lookup"));
        assert_eq!(excel.last_activity_ms, Some(7));
        assert_eq!(s.active_agent_count(), 1);
    }

    #[test]
    fn offsets_measured_from_first_insertion() {
        let mut s = session();
        s.add_message(MessageKind::UserMessage, "user", Some("orchestrator"), Payload::default(), 1_000);
        let first = s.add_timeline_event(MessageKind::UserMessage, "user", "hi", 1_000).offset_ms;
        let second = s.add_timeline_event(MessageKind::Status, "orchestrator", "thinking", 1_500).offset_ms;

        assert_eq!(s.started_at_ms(), Some(1_000));
        assert_eq!(first, 0);
        assert_eq!(second, 500);
    }

    #[test]
    fn message_ids_are_unique() {
        let mut s = session();
        let a = s.add_message(MessageKind::Status, "excel", None, Payload::default(), 0).id.clone();
        let b = s.add_message(MessageKind::Status, "excel", None, Payload::default(), 0).id.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut s = session();
        s.set_phase(Phase::Running);
        s.set_connection(ConnectionMode::Demo);
        s.set_agent_status("excel", AgentStatus::Done, Some("x".into()), 3).unwrap();
        s.add_message(MessageKind::Result, "excel", Some("orchestrator"), Payload::default(), 3);
        s.add_timeline_event(MessageKind::Result, "excel", "result", 3);

        s.reset();
        let once = s.clone();
        s.reset();

        assert_eq!(s, once);
        assert_eq!(s.phase(), Phase::Idle);
        assert_eq!(s.connection(), ConnectionMode::Demo);
        assert_eq!(s.agents().count(), 3);
        assert!(s.agents().all(|a| a.status == AgentStatus::Idle && a.task.is_none()));
        assert!(s.messages().is_empty());
        assert!(s.timeline().is_empty());
        assert!(s.status_history().is_empty());
        assert_eq!(s.started_at_ms(), None);
    }

    proptest! {
        #[test]
        fn timeline_offsets_never_decrease(times in proptest::collection::vec(0u64..100_000, 1..64)) {
            let mut s = session();
            for t in &times {
                s.add_timeline_event(MessageKind::Status, "excel", "tick", *t);
            }
            let offsets: Vec<u64> = s.timeline().iter().map(|e| e.offset_ms).collect();
            prop_assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
