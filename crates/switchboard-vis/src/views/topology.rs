//! Node-link topology with traveling particles.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use switchboard_geometry::{Direction, Vec2};
use tracing::{debug, warn};

use crate::bus::{BusEvent, EventBus, Topic, Traversal};
use crate::config::{link_name, AgentProfile, LinkConfig};
use crate::events::AgentKey;
use crate::particles::{Marker, ParticleAnimator};
use crate::session::{AgentStatus, Session};
use crate::views::View;

/// One agent node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeVisual {
    pub key: AgentKey,
    pub position: [f32; 2],
    pub color: String,
    pub status: AgentStatus,
}

/// One drawn link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineVisual {
    pub name: String,
    pub from: AgentKey,
    pub to: AgentKey,
    /// Time left before the pulse is back at baseline
    pub pulse_remaining_ms: u64,
}

/// A marker ready to draw.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sprite {
    pub position: [f32; 2],
    pub opacity: f32,
}

pub struct TopologyView {
    nodes: BTreeMap<AgentKey, NodeVisual>,
    lines: Vec<LineVisual>,
    animator: ParticleAnimator,
    pulse_ms: u64,
}

impl TopologyView {
    /// `links` should only contain links whose curves are in the animator.
    pub fn new(
        profiles: &[AgentProfile],
        links: &[LinkConfig],
        animator: ParticleAnimator,
        pulse_ms: u64,
    ) -> Self {
        let nodes = profiles
            .iter()
            .map(|p| {
                (
                    p.key.clone(),
                    NodeVisual {
                        key: p.key.clone(),
                        position: p.position,
                        color: p.color.clone(),
                        status: AgentStatus::Idle,
                    },
                )
            })
            .collect();
        let lines = links
            .iter()
            .filter(|l| animator.paths().contains(&l.name()))
            .map(|l| LineVisual {
                name: l.name(),
                from: l.from.clone(),
                to: l.to.clone(),
                pulse_remaining_ms: 0,
            })
            .collect();

        Self {
            nodes,
            lines,
            animator,
            pulse_ms,
        }
    }

    pub fn attach(view: &Rc<RefCell<Self>>, bus: &EventBus) {
        for topic in [Topic::Agent, Topic::Traversal, Topic::Reset] {
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
                if let Some(node) = self.nodes.get_mut(&update.key) {
                    node.status = update.status;
                }
            }
            BusEvent::Traversal(traversal) => self.traverse(traversal),
            BusEvent::Reset => self.reset(),
            _ => {}
        }
    }

    /// Pulse the link between the two agents and send a particle along it.
    ///
    /// A link drawn the other way round is reused in reverse.
    pub fn traverse(&mut self, traversal: &Traversal) {
        let forward = link_name(&traversal.from, &traversal.to);
        let backward = link_name(&traversal.to, &traversal.from);
        let (name, direction) = if self.animator.paths().contains(&forward) {
            (forward, Direction::Forward)
        } else if self.animator.paths().contains(&backward) {
            (backward, Direction::Reverse)
        } else {
            warn!(from = %traversal.from, to = %traversal.to, "No link for traversal");
            return;
        };

        if let Some(line) = self.lines.iter_mut().find(|l| l.name == name) {
            line.pulse_remaining_ms = self.pulse_ms;
        }
        match self.animator.send(&name, direction) {
            Ok(_) => debug!(link = %name, ?direction, kind = ?traversal.kind, "Traversal"),
            Err(e) => warn!(link = %name, error = %e, "Particle not sent"),
        }
    }

    /// Let pulses decay by `dt_ms`.
    pub fn advance(&mut self, dt_ms: u64) {
        for line in &mut self.lines {
            line.pulse_remaining_ms = line.pulse_remaining_ms.saturating_sub(dt_ms);
        }
    }

    /// Advance particles by one frame.
    pub fn step_frame(&mut self) -> bool {
        self.animator.step()
    }

    /// Whether anything still moves or fades.
    pub fn is_animating(&self) -> bool {
        self.animator.is_running() || self.lines.iter().any(|l| l.pulse_remaining_ms > 0)
    }

    /// Pulse intensity of a link in `[0, 1]`.
    pub fn pulse(&self, name: &str) -> f32 {
        if self.pulse_ms == 0 {
            return 0.0;
        }
        self.lines
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.pulse_remaining_ms as f32 / self.pulse_ms as f32)
            .unwrap_or(0.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeVisual> {
        self.nodes.values()
    }

    pub fn node(&self, key: &str) -> Option<&NodeVisual> {
        self.nodes.get(key)
    }

    pub fn lines(&self) -> &[LineVisual] {
        &self.lines
    }

    pub fn animator(&self) -> &ParticleAnimator {
        &self.animator
    }

    /// Visible markers only.
    pub fn sprites(&self) -> Vec<Sprite> {
        self.animator
            .markers()
            .into_iter()
            .filter_map(|Marker { position, opacity, .. }| {
                position.map(|p: Vec2| Sprite {
                    position: p.to_array(),
                    opacity,
                })
            })
            .collect()
    }

    /// Stop the clock, drop particles, put lines and nodes back to baseline.
    pub fn reset(&mut self) {
        self.animator.reset();
        for line in &mut self.lines {
            line.pulse_remaining_ms = 0;
        }
        for node in self.nodes.values_mut() {
            node.status = AgentStatus::Idle;
        }
    }
}

impl View for TopologyView {
    fn rebuild(&mut self, session: &Session) {
        self.reset();
        for node in self.nodes.values_mut() {
            if let Some(agent) = session.agent(&node.key) {
                node.status = agent.status;
            }
        }
    }
}
