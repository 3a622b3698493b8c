//! Agent status cards.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::bus::{BusEvent, EventBus, Stage, Topic};
use crate::config::AgentProfile;
use crate::error::{Error, Result};
use crate::events::AgentKey;
use crate::session::{AgentStatus, Session, SessionReader};
use crate::views::View;

/// One card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentCard {
    pub key: AgentKey,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub status: AgentStatus,
    pub task: Option<String>,
    /// Offset of the last change from session start
    pub last_activity_ms: Option<u64>,
}

/// Header counters, read from the session when asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CardsHeader {
    pub active_agents: usize,
    pub messages: usize,
    pub stage: Option<Stage>,
}

#[derive(Debug)]
pub struct AgentCardsView {
    cards: Vec<AgentCard>,
    stage: Option<Stage>,
    reader: SessionReader,
}

impl AgentCardsView {
    /// Build one card per session agent. Every agent needs a profile.
    pub fn new(profiles: &[AgentProfile], reader: SessionReader) -> Result<Self> {
        let cards = {
            let session = reader.read();
            session
                .agents()
                .map(|agent| {
                    let profile = profiles
                        .iter()
                        .find(|p| p.key == agent.key)
                        .ok_or_else(|| Error::MissingConfig(format!("profile for agent '{}'", agent.key)))?;
                    Ok(AgentCard {
                        key: agent.key.clone(),
                        name: profile.name.clone(),
                        color: profile.color.clone(),
                        icon: profile.icon.clone(),
                        status: agent.status,
                        task: agent.task.clone(),
                        last_activity_ms: None,
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };
        let mut view = Self {
            cards,
            stage: None,
            reader,
        };
        let session = view.reader.clone();
        view.rebuild(&session.read());
        Ok(view)
    }

    /// Wire the view to the bus.
    pub fn attach(view: &Rc<RefCell<Self>>, bus: &EventBus) {
        for topic in [Topic::Agent, Topic::Stage, Topic::Reset] {
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
                let offset = self.reader.read().offset_of(update.at_ms);
                if let Some(card) = self.cards.iter_mut().find(|c| c.key == update.key) {
                    card.status = update.status;
                    card.task = update.task.clone();
                    card.last_activity_ms = Some(offset);
                }
            }
            BusEvent::StageChanged { stage } => self.stage = Some(*stage),
            BusEvent::Reset => {
                let reader = self.reader.clone();
                self.rebuild(&reader.read());
            }
            _ => {}
        }
    }

    pub fn cards(&self) -> &[AgentCard] {
        &self.cards
    }

    pub fn card(&self, key: &str) -> Option<&AgentCard> {
        self.cards.iter().find(|c| c.key == key)
    }

    pub fn header(&self) -> CardsHeader {
        let session = self.reader.read();
        CardsHeader {
            active_agents: session.active_agent_count(),
            messages: session.message_count(),
            stage: self.stage,
        }
    }
}

impl View for AgentCardsView {
    fn rebuild(&mut self, session: &Session) {
        for card in &mut self.cards {
            if let Some(agent) = session.agent(&card.key) {
                card.status = agent.status;
                card.task = agent.task.clone();
                card.last_activity_ms = agent.last_activity_ms.map(|t| session.offset_of(t));
            }
        }
        if session.messages().is_empty() {
            self.stage = None;
        }
    }
}
