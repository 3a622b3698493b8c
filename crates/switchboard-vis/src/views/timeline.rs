//! Swim-lane timeline.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::bus::{BusEvent, EventBus, Topic};
use crate::events::AgentKey;
use crate::session::{AgentStatus, MessageKind, Session, SessionReader};
use crate::views::View;

/// An interval during which an agent was working or thinking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start_ms: u64,
    /// `None` while still open
    pub end_ms: Option<u64>,
}

/// One lane per agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lane {
    pub agent: AgentKey,
    pub spans: Vec<Span>,
}

impl Lane {
    fn open(&mut self, at_ms: u64) {
        if !self.is_open() {
            self.spans.push(Span {
                start_ms: at_ms,
                end_ms: None,
            });
        }
    }

    fn close(&mut self, at_ms: u64) {
        if let Some(span) = self.spans.last_mut().filter(|s| s.end_ms.is_none()) {
            span.end_ms = Some(at_ms.max(span.start_ms));
        }
    }

    pub fn is_open(&self) -> bool {
        self.spans.last().is_some_and(|s| s.end_ms.is_none())
    }

    fn apply(&mut self, status: AgentStatus, at_ms: u64) {
        if status.is_active() {
            self.open(at_ms);
        } else {
            self.close(at_ms);
        }
    }
}

/// A point marker for one timeline event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineMarker {
    pub agent: AgentKey,
    pub kind: MessageKind,
    pub label: String,
    pub offset_ms: u64,
}

#[derive(Debug)]
pub struct TimelineView {
    lanes: Vec<Lane>,
    markers: Vec<TimelineMarker>,
    elapsed_ms: u64,
    reader: SessionReader,
}

impl TimelineView {
    pub fn new(reader: SessionReader) -> Self {
        let lanes = reader
            .read()
            .agents()
            .map(|a| Lane {
                agent: a.key.clone(),
                spans: Vec::new(),
            })
            .collect();
        Self {
            lanes,
            markers: Vec::new(),
            elapsed_ms: 0,
            reader,
        }
    }

    pub fn attach(view: &Rc<RefCell<Self>>, bus: &EventBus) {
        for topic in [Topic::Agent, Topic::Timeline, Topic::Tick, Topic::Reset] {
            let v = view.clone();
            bus.on(topic, move |event| {
                v.borrow_mut().handle(event);
                Ok(())
            });
        }
    }

    fn handle(&mut self, event: &BusEvent) {
        match event {
            BusEvent::AgentChanged(update) => {
                let at = self.reader.read().offset_of(update.at_ms);
                if let Some(lane) = self.lanes.iter_mut().find(|l| l.agent == update.key) {
                    lane.apply(update.status, at);
                }
            }
            BusEvent::TimelineAdded(e) => self.markers.push(TimelineMarker {
                agent: e.agent.clone(),
                kind: e.kind,
                label: e.label.clone(),
                offset_ms: e.offset_ms,
            }),
            BusEvent::Tick { elapsed_ms } => self.elapsed_ms = *elapsed_ms,
            BusEvent::Reset => {
                let reader = self.reader.clone();
                self.rebuild(&reader.read());
            }
            _ => {}
        }
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn lane(&self, agent: &str) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.agent == agent)
    }

    pub fn markers(&self) -> &[TimelineMarker] {
        &self.markers
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Where a span ends on screen; open spans run to the elapsed clock.
    pub fn span_end(&self, span: &Span) -> u64 {
        span.end_ms.unwrap_or(self.elapsed_ms.max(span.start_ms))
    }
}

impl View for TimelineView {
    fn rebuild(&mut self, session: &Session) {
        for lane in &mut self.lanes {
            lane.spans.clear();
        }
        for change in session.status_history() {
            if let Some(lane) = self.lanes.iter_mut().find(|l| l.agent == change.agent) {
                lane.apply(change.status, change.offset_ms);
            }
        }
        self.markers = session
            .timeline()
            .iter()
            .map(|e| TimelineMarker {
                agent: e.agent.clone(),
                kind: e.kind,
                label: e.label.clone(),
                offset_ms: e.offset_ms,
            })
            .collect();
        if session.started_at_ms().is_none() {
            self.elapsed_ms = 0;
        }
    }
}
