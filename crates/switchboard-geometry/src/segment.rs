//! Individual curve segments.

use glam::Vec2;

use crate::FLATTEN_STEPS;

/// One piece of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    /// Straight line
    Line { from: Vec2, to: Vec2 },
    /// Quadratic Bézier with one control point
    Quadratic { from: Vec2, ctrl: Vec2, to: Vec2 },
    /// Cubic Bézier with two control points
    Cubic {
        from: Vec2,
        ctrl1: Vec2,
        ctrl2: Vec2,
        to: Vec2,
    },
}

impl Segment {
    /// Start point.
    pub fn start(&self) -> Vec2 {
        match *self {
            Segment::Line { from, .. } => from,
            Segment::Quadratic { from, .. } => from,
            Segment::Cubic { from, .. } => from,
        }
    }

    /// End point.
    pub fn end(&self) -> Vec2 {
        match *self {
            Segment::Line { to, .. } => to,
            Segment::Quadratic { to, .. } => to,
            Segment::Cubic { to, .. } => to,
        }
    }

    /// Evaluate the segment at parameter `t` in `[0, 1]`.
    pub fn point_at(&self, t: f32) -> Vec2 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        match *self {
            Segment::Line { from, to } => from.lerp(to, t),
            Segment::Quadratic { from, ctrl, to } => {
                from * (u * u) + ctrl * (2.0 * u * t) + to * (t * t)
            }
            Segment::Cubic { from, ctrl1, ctrl2, to } => {
                from * (u * u * u)
                    + ctrl1 * (3.0 * u * u * t)
                    + ctrl2 * (3.0 * u * t * t)
                    + to * (t * t * t)
            }
        }
    }

    /// Number of chords used to measure this segment.
    fn steps(&self) -> usize {
        match self {
            Segment::Line { .. } => 1,
            _ => FLATTEN_STEPS,
        }
    }

    /// Chord endpoints of the flattened segment, `steps + 1` points.
    fn chord_points(&self) -> impl Iterator<Item = Vec2> + '_ {
        let steps = self.steps();
        (0..=steps).map(move |i| self.point_at(i as f32 / steps as f32))
    }

    /// Arc length of the flattened segment.
    pub fn length(&self) -> f32 {
        let mut total = 0.0;
        let mut prev = self.start();
        for p in self.chord_points().skip(1) {
            total += prev.distance(p);
            prev = p;
        }
        total
    }

    /// Point at `distance` along the flattened segment, clamped to its ends.
    pub fn point_at_length(&self, distance: f32) -> Vec2 {
        if distance <= 0.0 {
            return self.start();
        }

        let mut walked = 0.0;
        let mut prev = self.start();
        for p in self.chord_points().skip(1) {
            let chord = prev.distance(p);
            if walked + chord >= distance {
                if chord <= f32::EPSILON {
                    return p;
                }
                return prev.lerp(p, (distance - walked) / chord);
            }
            walked += chord;
            prev = p;
        }
        self.end()
    }
}
