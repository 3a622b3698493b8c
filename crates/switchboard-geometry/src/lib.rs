//! Switchboard Geometry
//!
//! Arc-length queries over 2D curves for animating markers along topology links.
//!
//! # Model
//!
//! A [`Path`] is an ordered run of [`Segment`]s (straight lines, quadratic and
//! cubic Béziers). Curved segments are measured by flattening them into
//! [`FLATTEN_STEPS`] chords, so [`Path::length`] and [`Path::point_at_length`]
//! always agree with each other: walking the full length lands exactly on the
//! end point.
//!
//! # Direction
//!
//! One path definition serves both directions of a link. A traversal in
//! [`Direction::Reverse`] measures distance from the end of the path, so a
//! marker moves back along the same visual curve instead of needing a second,
//! mirrored definition.
//!
//! # Named curves
//!
//! [`PathSet`] holds the fixed set of curves a topology is drawn with, keyed by
//! name. Everything here is pure: no caching, no interior state.

mod error;
mod parse;
mod path;
mod segment;
mod set;

pub use error::{Error, Result};
pub use path::{Path, PathBuilder};
pub use segment::Segment;
pub use set::PathSet;

pub use glam::Vec2;

/// Number of chords a curved segment is flattened into for measurement.
pub const FLATTEN_STEPS: usize = 32;

/// Which end of a path a traversal starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Start of the path to its end
    Forward,
    /// End of the path back to its start
    Reverse,
}

impl Direction {
    /// The opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}
