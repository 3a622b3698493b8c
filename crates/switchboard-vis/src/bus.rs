//! Synchronous in-process event bus.
//!
//! `emit` calls every subscriber of the event's topic, in subscription order,
//! before it returns. A failing or panicking handler is logged and the
//! remaining handlers still run. Handlers may emit again; the nested emission
//! completes before the outer one moves on to its next handler.
//!
//! The handler list is read once when an emission starts: handlers added
//! during an emission first see the next one, handlers removed during an
//! emission are not called again. A handler that is re-entered while it is
//! still running is skipped for the nested event.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{error, trace, warn};

use crate::error::Result;
use crate::events::AgentKey;
use crate::session::{AgentStatus, ConnectionMode, Message, Phase, TimelineEvent};

/// Bus topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Agent,
    Message,
    Timeline,
    Stage,
    Traversal,
    Phase,
    Tick,
    Connection,
    Reset,
}

/// Coarse investigation stage shown in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Acknowledge,
    Investigate,
    Synthesize,
}

/// What a traversal carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalKind {
    Dispatch,
    Result,
}

/// A conceptual message moving from one agent to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Traversal {
    pub from: AgentKey,
    pub to: AgentKey,
    pub kind: TraversalKind,
}

/// New state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentUpdate {
    pub key: AgentKey,
    pub status: AgentStatus,
    pub task: Option<String>,
    pub at_ms: u64,
}

/// Everything that travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    AgentChanged(AgentUpdate),
    MessageAdded(Message),
    TimelineAdded(TimelineEvent),
    StageChanged { stage: Stage },
    Traversal(Traversal),
    PhaseChanged { phase: Phase },
    Tick { elapsed_ms: u64 },
    ConnectionChanged { mode: ConnectionMode },
    Reset,
}

impl BusEvent {
    pub fn topic(&self) -> Topic {
        match self {
            BusEvent::AgentChanged(_) => Topic::Agent,
            BusEvent::MessageAdded(_) => Topic::Message,
            BusEvent::TimelineAdded(_) => Topic::Timeline,
            BusEvent::StageChanged { .. } => Topic::Stage,
            BusEvent::Traversal(_) => Topic::Traversal,
            BusEvent::PhaseChanged { .. } => Topic::Phase,
            BusEvent::Tick { .. } => Topic::Tick,
            BusEvent::ConnectionChanged { .. } => Topic::Connection,
            BusEvent::Reset => Topic::Reset,
        }
    }
}

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<dyn FnMut(&BusEvent) -> Result<()>>>;

#[derive(Default)]
struct BusInner {
    handlers: RefCell<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
    next_id: Cell<u64>,
}

/// Cheaply cloneable handle to one bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.inner.handlers.borrow();
        let count: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

/// Returned by [`EventBus::on`]; drop it to keep the subscription forever.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove the handler. A no-op if the bus is gone or already cleared.
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            EventBus { inner }.off(self.topic, self.id);
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `topic`.
    pub fn on<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: FnMut(&BusEvent) -> Result<()> + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);

        let handler: Handler = Rc::new(RefCell::new(handler));
        self.inner
            .handlers
            .borrow_mut()
            .entry(topic)
            .or_default()
            .push((id, handler));

        Subscription {
            bus: Rc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Remove one handler.
    pub fn off(&self, topic: Topic, id: SubscriptionId) {
        if let Some(list) = self.inner.handlers.borrow_mut().get_mut(&topic) {
            list.retain(|(sid, _)| *sid != id);
        }
    }

    /// Remove every handler of `topic`.
    pub fn off_topic(&self, topic: Topic) {
        self.inner.handlers.borrow_mut().remove(&topic);
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.inner.handlers.borrow_mut().clear();
    }

    pub fn handler_count(&self, topic: Topic) -> usize {
        self.inner
            .handlers
            .borrow()
            .get(&topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn is_subscribed(&self, topic: Topic, id: SubscriptionId) -> bool {
        self.inner
            .handlers
            .borrow()
            .get(&topic)
            .is_some_and(|list| list.iter().any(|(sid, _)| *sid == id))
    }

    /// Deliver `event` to every subscriber of its topic.
    pub fn emit(&self, event: &BusEvent) {
        let topic = event.topic();
        let snapshot: Vec<(SubscriptionId, Handler)> = self
            .inner
            .handlers
            .borrow()
            .get(&topic)
            .cloned()
            .unwrap_or_default();

        trace!(?topic, handlers = snapshot.len(), "emit");

        for (id, handler) in snapshot {
            if !self.is_subscribed(topic, id) {
                continue;
            }
            let Ok(mut f) = handler.try_borrow_mut() else {
                warn!(?topic, subscription = id.0, "Handler re-entered during its own call, skipped");
                continue;
            };
            match catch_unwind(AssertUnwindSafe(|| (&mut *f)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(?topic, subscription = id.0, error = %e, "Bus handler failed");
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(?topic, subscription = id.0, %reason, "Bus handler panicked");
                }
            }
        }
    }
}
