//! Render models fed by the bus.
//!
//! Views never talk to each other and never write the session. Each one keeps
//! just enough state to draw itself and can rebuild that state from the
//! session alone at any time.

mod cards;
mod log;
mod timeline;
mod topology;

pub use cards::{AgentCard, AgentCardsView, CardsHeader};
pub use log::{LogEntry, MessageLogView};
pub use timeline::{Lane, Span, TimelineMarker, TimelineView};
pub use topology::{LineVisual, NodeVisual, Sprite, TopologyView};

use crate::session::Session;

/// A view whose whole state is derivable from the session.
pub trait View {
    /// Discard local state and re-derive it from `session`.
    fn rebuild(&mut self, session: &Session);
}
