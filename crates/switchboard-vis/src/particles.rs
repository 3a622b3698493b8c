//! Particles traveling along topology links.
//!
//! Each traversal spawns one particle: a leading marker plus a fixed trail of
//! markers spaced behind it. One shared frame clock advances every particle by
//! a constant distance per frame. The clock only runs while particles exist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use switchboard_geometry::{Direction, PathSet, Vec2};
use tracing::{debug, trace};

use crate::error::Result;

/// Motion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Distance covered per frame
    pub speed: f32,
    /// Markers following the leading one
    pub trail: usize,
    /// Distance between consecutive markers
    pub spacing: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            speed: 4.0,
            trail: 3,
            spacing: 12.0,
        }
    }
}

/// Identifies one particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleId(u64);

/// A particle in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub id: ParticleId,
    pub path: String,
    pub direction: Direction,
    /// Total path length, resolved when the particle was sent
    pub length: f32,
    /// Frames advanced so far
    pub frames: u32,
    /// Frames until the leading marker reaches the end
    pub frames_needed: u32,
}

impl Particle {
    /// Distance the leading marker has traveled.
    pub fn traveled(&self, speed: f32) -> f32 {
        self.frames as f32 * speed
    }
}

/// Where one marker is drawn this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub particle: ParticleId,
    /// 0 for the leading marker
    pub index: usize,
    /// `None` while the marker is off either end of its path
    pub position: Option<Vec2>,
    pub opacity: f32,
}

/// Particle statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParticleStats {
    pub sent: u64,
    pub delivered: u64,
    pub frames: u64,
}

/// Owns the active particle set and the frame clock.
#[derive(Debug)]
pub struct ParticleAnimator {
    paths: PathSet,
    lengths: HashMap<String, f32>,
    particles: Vec<Particle>,
    config: ParticleConfig,
    clock_running: bool,
    next_id: u64,
    stats: ParticleStats,
}

impl ParticleAnimator {
    pub fn new(paths: PathSet, config: ParticleConfig) -> Self {
        Self {
            paths,
            lengths: HashMap::new(),
            particles: Vec::new(),
            config,
            clock_running: false,
            next_id: 0,
            stats: ParticleStats::default(),
        }
    }

    pub fn paths(&self) -> &PathSet {
        &self.paths
    }

    pub fn config(&self) -> ParticleConfig {
        self.config
    }

    pub fn stats(&self) -> ParticleStats {
        self.stats
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn active(&self) -> usize {
        self.particles.len()
    }

    /// Whether the frame clock is running.
    pub fn is_running(&self) -> bool {
        self.clock_running
    }

    fn length_of(&mut self, path: &str) -> Result<f32> {
        if let Some(len) = self.lengths.get(path) {
            return Ok(*len);
        }
        let len = self.paths.length(path)?;
        self.lengths.insert(path.to_string(), len);
        Ok(len)
    }

    /// Send a particle along `path` and start the clock if it is idle.
    pub fn send(&mut self, path: &str, direction: Direction) -> Result<ParticleId> {
        let length = self.length_of(path)?;
        let id = ParticleId(self.next_id);
        self.next_id += 1;
        self.stats.sent += 1;

        let frames_needed = (length / self.config.speed).ceil() as u32;
        if frames_needed == 0 {
            // Zero-length path: already at the end
            self.stats.delivered += 1;
            return Ok(id);
        }

        debug!(path, ?direction, length, frames_needed, "Particle sent");
        self.particles.push(Particle {
            id,
            path: path.to_string(),
            direction,
            length,
            frames: 0,
            frames_needed,
        });
        self.clock_running = true;
        Ok(id)
    }

    /// Advance every particle by one frame and release those that arrived.
    ///
    /// Returns whether the clock is still running afterwards.
    pub fn step(&mut self) -> bool {
        if !self.clock_running {
            return false;
        }
        self.stats.frames += 1;

        let before = self.particles.len();
        for p in &mut self.particles {
            p.frames += 1;
        }
        self.particles.retain(|p| p.frames < p.frames_needed);
        let arrived = before - self.particles.len();
        self.stats.delivered += arrived as u64;

        if self.particles.is_empty() {
            trace!("Particle clock stopped");
            self.clock_running = false;
        }
        self.clock_running
    }

    /// Marker positions for the current frame.
    pub fn markers(&self) -> Vec<Marker> {
        let trail = self.config.trail;
        let mut markers = Vec::with_capacity(self.particles.len() * (trail + 1));

        for p in &self.particles {
            let lead = p.traveled(self.config.speed);
            for index in 0..=trail {
                let d = lead - index as f32 * self.config.spacing;
                let position = if (0.0..=p.length).contains(&d) {
                    self.paths.point_along(&p.path, d, p.direction).ok()
                } else {
                    None
                };
                markers.push(Marker {
                    particle: p.id,
                    index,
                    position,
                    opacity: 1.0 - index as f32 / (trail + 1) as f32,
                });
            }
        }
        markers
    }

    /// Drop every particle and stop the clock.
    pub fn reset(&mut self) {
        if !self.particles.is_empty() {
            debug!(cleared = self.particles.len(), "Particles cleared");
        }
        self.particles.clear();
        self.clock_running = false;
    }
}
