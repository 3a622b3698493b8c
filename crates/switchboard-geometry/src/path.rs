//! Multi-segment paths and arc-length queries.

use glam::Vec2;

use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::Direction;

/// A connected run of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Create a path from segments. At least one segment is required.
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        if segments.is_empty() {
            return Err(Error::EmptyPath);
        }
        Ok(Self { segments })
    }

    /// Start building a path at `start`.
    pub fn builder(start: Vec2) -> PathBuilder {
        PathBuilder {
            cursor: start,
            segments: Vec::new(),
        }
    }

    /// Parse SVG-style path data (`M`, `L`, `Q`, `C`, `Z`, absolute coordinates).
    pub fn parse(data: &str) -> Result<Self> {
        crate::parse::parse_path(data)
    }

    /// Segments in drawing order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First point of the path.
    pub fn start(&self) -> Vec2 {
        self.segments[0].start()
    }

    /// Last point of the path.
    pub fn end(&self) -> Vec2 {
        self.segments[self.segments.len() - 1].end()
    }

    /// Total arc length.
    pub fn length(&self) -> f32 {
        self.segments.iter().map(Segment::length).sum()
    }

    /// Point at `distance` from the start, clamped to the path's ends.
    pub fn point_at_length(&self, distance: f32) -> Vec2 {
        if distance <= 0.0 {
            return self.start();
        }

        let mut walked = 0.0;
        for segment in &self.segments {
            let len = segment.length();
            if walked + len >= distance {
                return segment.point_at_length(distance - walked);
            }
            walked += len;
        }
        self.end()
    }

    /// Point at `distance` measured from whichever end `direction` starts at.
    pub fn point_along(&self, distance: f32, direction: Direction) -> Vec2 {
        match direction {
            Direction::Forward => self.point_at_length(distance),
            Direction::Reverse => self.point_at_length(self.length() - distance),
        }
    }
}

/// Incremental path construction from a moving cursor.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    cursor: Vec2,
    segments: Vec<Segment>,
}

impl PathBuilder {
    /// Straight line to `to`.
    pub fn line_to(mut self, to: Vec2) -> Self {
        self.segments.push(Segment::Line { from: self.cursor, to });
        self.cursor = to;
        self
    }

    /// Quadratic curve to `to` through `ctrl`.
    pub fn quad_to(mut self, ctrl: Vec2, to: Vec2) -> Self {
        self.segments.push(Segment::Quadratic {
            from: self.cursor,
            ctrl,
            to,
        });
        self.cursor = to;
        self
    }

    /// Cubic curve to `to` through `ctrl1` and `ctrl2`.
    pub fn cubic_to(mut self, ctrl1: Vec2, ctrl2: Vec2, to: Vec2) -> Self {
        self.segments.push(Segment::Cubic {
            from: self.cursor,
            ctrl1,
            ctrl2,
            to,
        });
        self.cursor = to;
        self
    }

    /// Finish the path.
    pub fn build(self) -> Result<Path> {
        Path::new(self.segments)
    }
}
