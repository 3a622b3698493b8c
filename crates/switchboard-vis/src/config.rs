//! Dashboard configuration: agents, sender mapping, topology links, timing
//! and scenarios.
//!
//! [`DashboardConfig::default`] is complete on its own. A JSON file only needs
//! the fields it overrides.

use std::collections::{BTreeMap, HashSet};
use std::path::Path as FsPath;

use serde::{Deserialize, Serialize};
use switchboard_geometry::{Path, PathSet, Vec2};

use crate::error::{Error, Result};
use crate::events::AgentKey;
use crate::particles::ParticleConfig;
use crate::scenario::{Scenario, BRANCH_A};
use crate::scheduler::SchedulerTiming;

/// Display metadata for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub key: AgentKey,
    pub name: String,
    pub color: String,
    pub icon: String,
    /// Node center on the topology
    pub position: [f32; 2],
}

impl AgentProfile {
    fn new(key: &str, name: &str, color: &str, icon: &str, position: [f32; 2]) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            color: color.to_string(),
            icon: icon.to_string(),
            position,
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from(self.position)
    }
}

/// A drawn connection between two agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: AgentKey,
    pub to: AgentKey,
    /// SVG-style path data, drawn from `from` to `to`
    pub path: String,
}

impl LinkConfig {
    fn new(from: &str, to: &str, path: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            path: path.to_string(),
        }
    }

    /// Name the link's curve is registered under.
    pub fn name(&self) -> String {
        link_name(&self.from, &self.to)
    }
}

/// Curve name for a directed pair of agents.
pub fn link_name(from: &str, to: &str) -> String {
    format!("{}->{}", from, to)
}

/// Timing constants, all in milliseconds unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub heartbeat_ms: u64,
    pub tick_ms: u64,
    /// Scripted offsets are multiplied by this
    pub speed: f64,
    pub finish_grace_ms: u64,
    /// How long a pulsed link takes to fade back
    pub pulse_ms: u64,
    /// Animation frame interval
    pub frame_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1000,
            reconnect_max_ms: 30_000,
            heartbeat_ms: 25_000,
            tick_ms: 100,
            speed: 1.0,
            finish_grace_ms: 1500,
            pulse_ms: 600,
            frame_ms: 16,
        }
    }
}

/// Everything the dashboard is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub agents: Vec<AgentProfile>,
    pub orchestrator: AgentKey,
    pub user: AgentKey,
    /// Remote sender name to agent key
    pub sender_map: BTreeMap<String, AgentKey>,
    pub links: Vec<LinkConfig>,
    pub timing: TimingConfig,
    pub particles: ParticleConfig,
    pub default_scenario: String,
    pub scenarios: Vec<Scenario>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        let agents = vec![
            AgentProfile::new("user", "Customer", "#64748b", "user", [80.0, 250.0]),
            AgentProfile::new("orchestrator", "Support Orchestrator", "#8b5cf6", "hub", [400.0, 250.0]),
            AgentProfile::new("excel", "Excel Agent", "#22c55e", "table", [720.0, 70.0]),
            AgentProfile::new("github", "GitHub Agent", "#f97316", "git-branch", [780.0, 190.0]),
            AgentProfile::new("browser", "Browser Agent", "#0ea5e9", "globe", [780.0, 310.0]),
            AgentProfile::new("linear", "Linear Agent", "#6366f1", "ticket", [720.0, 430.0]),
        ];

        let sender_map = [
            ("SupportOrchestrator", "orchestrator"),
            ("ExcelAgent", "excel"),
            ("GitHubSupportAgent", "github"),
            ("BrowserAgent", "browser"),
            ("LinearAgent", "linear"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let links = vec![
            LinkConfig::new("user", "orchestrator", "M 80 250 L 400 250"),
            LinkConfig::new("orchestrator", "excel", "M 400 250 Q 560 110 720 70"),
            LinkConfig::new("orchestrator", "github", "M 400 250 Q 600 180 780 190"),
            LinkConfig::new("orchestrator", "browser", "M 400 250 Q 600 320 780 310"),
            LinkConfig::new("orchestrator", "linear", "M 400 250 Q 560 390 720 430"),
        ];

        Self {
            agents,
            orchestrator: "orchestrator".to_string(),
            user: "user".to_string(),
            sender_map,
            links,
            timing: TimingConfig::default(),
            particles: ParticleConfig::default(),
            default_scenario: BRANCH_A.to_string(),
            scenarios: vec![Scenario::branch_a()],
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file; absent fields keep their defaults.
    pub fn load(path: impl AsRef<FsPath>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn agent_keys(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(|a| a.key.as_str())
    }

    pub fn profile(&self, key: &str) -> Option<&AgentProfile> {
        self.agents.iter().find(|a| a.key == key)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn default_scenario(&self) -> Result<&Scenario> {
        self.scenario(&self.default_scenario)
            .ok_or_else(|| Error::MissingConfig(format!("scenario '{}'", self.default_scenario)))
    }

    /// Agent key for a remote sender name.
    pub fn map_sender(&self, sender: &str) -> Option<&str> {
        self.sender_map.get(sender).map(String::as_str)
    }

    /// Scheduler timing. A zero tick interval is raised to 1 ms.
    pub fn scheduler_timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            tick_ms: self.timing.tick_ms.max(1),
            speed: self.timing.speed,
            finish_grace_ms: self.timing.finish_grace_ms,
        }
    }

    /// Particle motion settings, or the defaults when these cannot move a
    /// particle forward.
    pub fn particle_settings(&self) -> ParticleConfig {
        let p = &self.particles;
        if p.speed > 0.0 && p.speed.is_finite() && p.spacing >= 0.0 && p.spacing.is_finite() {
            *p
        } else {
            ParticleConfig::default()
        }
    }

    /// Parse every link's curve. Links that fail to parse are returned
    /// separately with their error.
    pub fn path_set(&self) -> (PathSet, Vec<(String, Error)>) {
        let mut paths = PathSet::new();
        let mut failed = Vec::new();
        for link in &self.links {
            match Path::parse(&link.path) {
                Ok(path) => paths.insert(link.name(), path),
                Err(e) => failed.push((link.name(), e.into())),
            }
        }
        (paths, failed)
    }

    /// Every misconfiguration, one line each. Empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut keys = HashSet::new();
        for agent in &self.agents {
            if !keys.insert(agent.key.as_str()) {
                problems.push(format!("duplicate agent '{}'", agent.key));
            }
        }

        for (role, key) in [("orchestrator", &self.orchestrator), ("user", &self.user)] {
            if !keys.contains(key.as_str()) {
                problems.push(format!("{} '{}' is not a configured agent", role, key));
            }
        }

        for (sender, key) in &self.sender_map {
            if !keys.contains(key.as_str()) {
                problems.push(format!("sender '{}' maps to unknown agent '{}'", sender, key));
            }
        }

        for link in &self.links {
            for end in [&link.from, &link.to] {
                if !keys.contains(end.as_str()) {
                    problems.push(format!("link '{}' names unknown agent '{}'", link.name(), end));
                }
            }
            if let Err(e) = Path::parse(&link.path) {
                problems.push(format!("link '{}' has invalid path: {}", link.name(), e));
            }
        }

        for scenario in &self.scenarios {
            for (i, step) in scenario.steps.iter().enumerate() {
                for agent in step.event.agents() {
                    if !keys.contains(agent) {
                        problems.push(format!(
                            "scenario '{}' step {} names unknown agent '{}'",
                            scenario.name, i, agent
                        ));
                    }
                }
            }
        }

        if self.scenario(&self.default_scenario).is_none() {
            problems.push(format!("default scenario '{}' is missing", self.default_scenario));
        }

        if self.timing.speed <= 0.0 {
            problems.push(format!("speed multiplier must be positive, got {}", self.timing.speed));
        }
        if self.timing.tick_ms == 0 {
            problems.push("tick interval must be positive, got 0".to_string());
        }
        if self.timing.heartbeat_ms == 0 {
            problems.push("heartbeat interval must be positive, got 0".to_string());
        }
        if self.timing.reconnect_base_ms == 0 {
            problems.push("reconnect delay must be positive, got 0".to_string());
        }
        if !(self.particles.speed > 0.0 && self.particles.speed.is_finite()) {
            problems.push(format!("particle speed must be positive, got {}", self.particles.speed));
        }
        if !(self.particles.spacing >= 0.0 && self.particles.spacing.is_finite()) {
            problems.push(format!("particle spacing must not be negative, got {}", self.particles.spacing));
        }

        problems
    }
}
