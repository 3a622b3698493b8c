//! Switchboard Bridge
//!
//! Async plumbing around the single-threaded dashboard core.
//!
//! # Architecture
//!
//! - **Link**: a reconnecting WebSocket client running in its own task.
//!   Exponential backoff between attempts, a heartbeat while open, a quiet
//!   demo mode that parks it. Malformed frames are dropped with a warning.
//! - **Runtime**: owns the [`Dashboard`](switchboard_vis::Dashboard) and
//!   serializes link events, user commands, timers and animation frames
//!   through one `select!` loop.
//! - **Feed server**: axum WebSocket endpoint that replays a scenario to
//!   every connected dashboard, for local runs and tests.
//!
//! # Usage
//!
//! ```ignore
//! let config = BridgeConfig::from_env()?;
//! let (link, events, _task) = link::spawn(config.link());
//! let runtime = Runtime::new(Dashboard::new(config.dashboard), link, events);
//! runtime.run(commands).await;
//! ```

mod backoff;
mod config;
mod error;
mod feed;
pub mod link;
mod runtime;

pub use backoff::Backoff;
pub use config::{BridgeConfig, DEFAULT_FEED_ADDR, DEFAULT_FEED_URL};
pub use error::{Error, Result};
pub use feed::FeedServer;
pub use link::{LinkConfig, LinkEvent, LinkHandle, LinkState};
pub use runtime::{log_activity, Runtime, UserCommand};
