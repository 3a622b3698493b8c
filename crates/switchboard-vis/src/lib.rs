//! Switchboard Visualization Core
//!
//! Event choreography for a dashboard that follows one multi-agent
//! request-handling session across four views: agent cards, a node-link
//! topology with traveling particles, a swim-lane timeline and a message log.
//!
//! # Architecture
//!
//! - **Scheduler**: the only writer of the [`Session`]. A scripted scenario
//!   and a live feed both go through [`Scheduler::apply`], so either source
//!   produces the same state and the same bus traffic. At most one run is
//!   active at a time.
//! - **Event bus**: synchronous publish/subscribe. Views subscribe per
//!   [`Topic`]; a failing handler is logged and does not affect the others.
//! - **Views**: pure consumers of bus events, each able to rebuild itself from
//!   the session alone.
//! - **Particles**: discrete traversals animated as continuous motion along
//!   the topology's curves, one path per link in either direction.
//! - **Timers**: a virtual clock. The async runtime advances it from real time,
//!   tests advance it step by step.
//!
//! Everything here is single-threaded (`Rc`/`RefCell`) and free of I/O apart
//! from reading a config file.
//!
//! # Usage
//!
//! ```ignore
//! let mut dashboard = Dashboard::new(DashboardConfig::default());
//! dashboard.start_playback();
//! dashboard.advance_to(10_000);
//! assert_eq!(dashboard.session().read().message_count(), 11);
//! ```

mod bus;
mod config;
mod dashboard;
mod error;
mod events;
mod particles;
mod scenario;
mod scheduler;
mod session;
mod timer;
mod wire;

pub mod views;

pub use bus::{
    AgentUpdate, BusEvent, EventBus, Stage, Subscription, SubscriptionId, Topic, Traversal,
    TraversalKind,
};
pub use config::{link_name, AgentProfile, DashboardConfig, LinkConfig, TimingConfig};
pub use dashboard::{Dashboard, PlaybackRequest, ResetOutcome};
pub use error::{Error, Result};
pub use events::{AgentKey, Payload, ScriptEvent};
pub use particles::{Marker, Particle, ParticleAnimator, ParticleConfig, ParticleId, ParticleStats};
pub use scenario::{Scenario, ScenarioStep, BRANCH_A};
pub use scheduler::{Cue, RunKind, Scheduler, SchedulerTiming};
pub use session::{
    Agent, AgentStatus, ConnectionMode, Message, MessageKind, Phase, Session, SessionReader,
    StatusChange, TimelineEvent,
};
pub use timer::{TimerId, TimerQueue};
pub use wire::{Control, Inbound, Outbound};
