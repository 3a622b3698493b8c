//! Scripted scenarios: ordered `(t, event)` lists replayed on a local clock.

use serde::{Deserialize, Serialize};

use crate::events::{Payload, ScriptEvent};
use crate::session::AgentStatus;

/// Name of the built-in scenario.
pub const BRANCH_A: &str = "branchA";

/// One scripted event and its offset from the start of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    /// Milliseconds from run start, before the speed multiplier
    pub t: u64,
    #[serde(flatten)]
    pub event: ScriptEvent,
}

impl ScenarioStep {
    pub fn new(t: u64, event: ScriptEvent) -> Self {
        Self { t, event }
    }
}

/// A named, ordered event list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Offset of the last step, or 0 for an empty scenario.
    pub fn last_offset_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.t).max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The PDF-export support case: one customer request fanned out to three
    /// specialists and synthesized into a single answer.
    pub fn branch_a() -> Self {
        let status = |agent: &str, status: AgentStatus, text: &str, synthesis: bool| {
            ScriptEvent::AgentStatus {
                agent: agent.to_string(),
                status,
                task: None,
                payload: Payload::from_text(text),
                synthesis,
            }
        };
        let result = |agent: &str, text: &str| ScriptEvent::AgentResult {
            agent: agent.to_string(),
            status: AgentStatus::Done,
            payload: Payload::from_text(text),
        };

        let steps = vec![
            ScenarioStep::new(
                0,
                ScriptEvent::UserMessage {
                    from: "user".to_string(),
                    to: "orchestrator".to_string(),
                    payload: Payload::from_text(
                        "Hi, I'm sarah@acme.com. The dashboard export to PDF has been \
                         broken since last Tuesday. It just spins forever and never \
                         downloads. This is blocking our weekly reporting. Can you help?",
                    ),
                },
            ),
            ScenarioStep::new(
                500,
                status(
                    "orchestrator",
                    AgentStatus::Thinking,
                    "Received support request from sarah@acme.com. Analyzing the \
                     issue and determining which specialist agents to engage...",
                    false,
                ),
            ),
            ScenarioStep::new(
                1000,
                ScriptEvent::Dispatch {
                    from: "orchestrator".to_string(),
                    targets: vec!["excel".to_string(), "github".to_string(), "browser".to_string()],
                    payload: Payload::with_tasks(
                        "Dispatching parallel investigation to 3 specialist agents.",
                        [
                            (
                                "excel",
                                "Look up customer sarah@acme.com -- retrieve account tier, \
                                 contract status, and any prior support tickets.",
                            ),
                            (
                                "github",
                                "Search for issues related to \"dashboard PDF export\" or \
                                 \"PDF download spinning\". Check for recent PRs or fixes.",
                            ),
                            (
                                "browser",
                                "Search the product knowledge base and release notes for \
                                 any known issues or workarounds related to PDF export.",
                            ),
                        ],
                    ),
                },
            ),
            ScenarioStep::new(
                1200,
                status(
                    "excel",
                    AgentStatus::Working,
                    "Querying CRM for customer record: sarah@acme.com...",
                    false,
                ),
            ),
            ScenarioStep::new(
                1300,
                status(
                    "github",
                    AgentStatus::Working,
                    "Searching repositories for \"dashboard PDF export\" issues...",
                    false,
                ),
            ),
            ScenarioStep::new(
                1400,
                status(
                    "browser",
                    AgentStatus::Working,
                    "Navigating to knowledge base, searching for PDF export articles...",
                    false,
                ),
            ),
            ScenarioStep::new(
                3000,
                result(
                    "excel",
                    "Customer found: Sarah Chen, Acme Corp. Enterprise plan, \
                     contract active through 2026-12. Previous ticket #4521 \
                     (resolved) about slow exports in Jan 2025. Account in good \
                     standing, high-priority support tier.",
                ),
            ),
            ScenarioStep::new(
                5000,
                result(
                    "github",
                    "Found issue #1847: \"PDF export hangs indefinitely on large \
                     dashboards\" opened 6 days ago. Labeled as bug, priority P1. \
                     Root cause identified -- timeout regression in pdf-renderer \
                     v3.2.1. Fix merged in PR #1853 but not yet deployed. Hotfix \
                     branch: fix/pdf-export-timeout.",
                ),
            ),
            ScenarioStep::new(
                8000,
                result(
                    "browser",
                    "Knowledge base article KB-2094 confirms known issue with PDF \
                     exports since v3.2.1 (released last Tuesday). Workaround \
                     available: append \"?legacy_render=true\" to the dashboard URL \
                     before exporting. Fix ETA: next patch release scheduled for \
                     Wednesday.",
                ),
            ),
            ScenarioStep::new(
                8500,
                status(
                    "orchestrator",
                    AgentStatus::Thinking,
                    "All 3 agents reported back. Synthesizing findings into a \
                     unified response for the customer...",
                    true,
                ),
            ),
            ScenarioStep::new(
                10000,
                ScriptEvent::FinalResponse {
                    from: "orchestrator".to_string(),
                    to: "user".to_string(),
                    payload: Payload::from_text(
                        "Hi Sarah! I've investigated your PDF export issue across our \
                         systems. Here's what I found:\n\n\
                         **Root Cause:** A timeout regression was introduced in our \
                         v3.2.1 release last Tuesday (tracked as issue #1847, P1 \
                         priority). This affects PDF exports on larger dashboards.\n\n\
                         **Immediate Workaround:** Add `?legacy_render=true` to your \
                         dashboard URL before exporting. This bypasses the new renderer \
                         and should let you complete your weekly reports right away.\n\n\
                         **Permanent Fix:** The fix has already been merged (PR #1853) \
                         and is scheduled for deployment in Wednesday's patch release.\n\n\
                         As an Enterprise customer, I've flagged your account for \
                         priority notification when the patch goes live. Is there \
                         anything else I can help with?",
                    ),
                },
            ),
        ];

        Scenario::new(BRANCH_A, steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_a_shape() {
        let scenario = Scenario::branch_a();
        let times: Vec<u64> = scenario.steps.iter().map(|s| s.t).collect();
        assert_eq!(
            times,
            vec![0, 500, 1000, 1200, 1300, 1400, 3000, 5000, 8000, 8500, 10000]
        );
        assert_eq!(scenario.last_offset_ms(), 10000);
        assert!(matches!(
            scenario.steps[9].event,
            ScriptEvent::AgentStatus { synthesis: true, .. }
        ));
    }

    #[test]
    fn step_wire_form_is_flat() {
        let json = r#"{"t":1000,"type":"dispatch","from":"orchestrator","targets":["excel"],
                       "payload":{"text":"go","tasks":{"excel":"look"}}}"#;
        let step: ScenarioStep = serde_json::from_str(json).unwrap();
        assert_eq!(step.t, 1000);
        assert_eq!(step.event.kind(), "dispatch");

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["t"], 1000);
        assert_eq!(back["type"], "dispatch");
    }

    #[test]
    fn empty_scenario() {
        let scenario = Scenario::new("empty", Vec::new());
        assert!(scenario.is_empty());
        assert_eq!(scenario.last_offset_ms(), 0);
    }
}
