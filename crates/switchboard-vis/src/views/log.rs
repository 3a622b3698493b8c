//! Message log.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::bus::{BusEvent, EventBus, Topic};
use crate::events::AgentKey;
use crate::session::{Message, MessageKind, Session};
use crate::views::View;

const SUMMARY_CHARS: usize = 96;

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub id: String,
    pub kind: MessageKind,
    pub from: AgentKey,
    pub to: Option<AgentKey>,
    pub summary: String,
    pub at_ms: u64,
}

impl From<&Message> for LogEntry {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            kind: m.kind,
            from: m.from.clone(),
            to: m.to.clone(),
            summary: summarize(m),
            at_ms: m.at_ms,
        }
    }
}

/// First line of the payload text, shortened; the kind when there is no text.
fn summarize(message: &Message) -> String {
    let Some(text) = message.payload.text() else {
        return kind_label(message.kind).to_string();
    };
    let line = text.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= SUMMARY_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(SUMMARY_CHARS - 3).collect();
        format!("{}...", cut.trim_end())
    }
}

fn kind_label(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::UserMessage => "user message",
        MessageKind::Dispatch => "dispatch",
        MessageKind::Status => "status",
        MessageKind::Result => "result",
        MessageKind::FinalResponse => "final response",
    }
}

#[derive(Debug, Default)]
pub struct MessageLogView {
    entries: Vec<LogEntry>,
}

impl MessageLogView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(view: &Rc<RefCell<Self>>, bus: &EventBus) {
        for topic in [Topic::Message, Topic::Reset] {
            let v = view.clone();
            bus.on(topic, move |event| {
                let mut v = v.borrow_mut();
                match event {
                    BusEvent::MessageAdded(m) => v.entries.push(LogEntry::from(m)),
                    BusEvent::Reset => v.entries.clear(),
                    _ => {}
                }
                Ok(())
            });
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }
}

impl View for MessageLogView {
    fn rebuild(&mut self, session: &Session) {
        self.entries = session.messages().iter().map(LogEntry::from).collect();
    }
}
