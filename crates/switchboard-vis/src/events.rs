//! Session events for the dashboard timeline.
//!
//! The same five kinds drive both a scripted replay and a live feed; the wire
//! form is a JSON object tagged by `type`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::AgentStatus;

/// Stable key identifying an agent (`"orchestrator"`, `"excel"`, ...).
pub type AgentKey = String;

/// Free-form structured message content.
///
/// Conventionally an object with a `text` field; dispatches also carry a
/// `tasks` object mapping each target agent to its sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(pub Value);

impl Default for Payload {
    fn default() -> Self {
        Payload(Value::Object(Map::new()))
    }
}

impl Payload {
    /// Payload with only a `text` field.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("text".to_string(), Value::String(text.into()));
        Payload(Value::Object(map))
    }

    /// Payload with `text` and a per-agent `tasks` table.
    pub fn with_tasks<K, V>(text: impl Into<String>, tasks: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut payload = Self::from_text(text);
        let tasks: Map<String, Value> = tasks
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        if let Value::Object(map) = &mut payload.0 {
            map.insert("tasks".to_string(), Value::Object(tasks));
        }
        payload
    }

    /// The `text` field, if present.
    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    /// Sub-task assigned to `agent` in a dispatch payload.
    pub fn task_for(&self, agent: &str) -> Option<&str> {
        self.0.get("tasks")?.get(agent)?.as_str()
    }
}

fn default_result_status() -> AgentStatus {
    AgentStatus::Done
}

/// One event of a multi-agent session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// The user sent a request to the orchestrator
    UserMessage {
        from: AgentKey,
        to: AgentKey,
        #[serde(default)]
        payload: Payload,
    },

    /// An agent reported a status change
    AgentStatus {
        agent: AgentKey,
        status: AgentStatus,
        /// Live feeds carry the description here instead of `payload.text`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        #[serde(default)]
        payload: Payload,
        /// Marks the orchestrator's synthesis step
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        synthesis: bool,
    },

    /// The orchestrator fanned work out to specialist agents
    Dispatch {
        from: AgentKey,
        targets: Vec<AgentKey>,
        #[serde(default)]
        payload: Payload,
    },

    /// A specialist agent reported back to the orchestrator
    AgentResult {
        agent: AgentKey,
        #[serde(default = "default_result_status")]
        status: AgentStatus,
        #[serde(default)]
        payload: Payload,
    },

    /// The orchestrator answered the user
    FinalResponse {
        from: AgentKey,
        to: AgentKey,
        #[serde(default)]
        payload: Payload,
    },

    /// Any kind this dashboard does not know how to apply
    #[serde(other)]
    Unrecognized,
}

impl ScriptEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptEvent::UserMessage { .. } => "user_message",
            ScriptEvent::AgentStatus { .. } => "agent_status",
            ScriptEvent::Dispatch { .. } => "dispatch",
            ScriptEvent::AgentResult { .. } => "agent_result",
            ScriptEvent::FinalResponse { .. } => "final_response",
            ScriptEvent::Unrecognized => "unrecognized",
        }
    }

    /// Every agent key this event names.
    pub fn agents(&self) -> Vec<&str> {
        match self {
            ScriptEvent::UserMessage { from, to, .. } | ScriptEvent::FinalResponse { from, to, .. } => {
                vec![from.as_str(), to.as_str()]
            }
            ScriptEvent::AgentStatus { agent, .. } | ScriptEvent::AgentResult { agent, .. } => {
                vec![agent.as_str()]
            }
            ScriptEvent::Dispatch { from, targets, .. } => std::iter::once(from.as_str())
                .chain(targets.iter().map(String::as_str))
                .collect(),
            ScriptEvent::Unrecognized => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = ScriptEvent::Dispatch {
            from: "orchestrator".to_string(),
            targets: vec!["excel".to_string(), "github".to_string()],
            payload: Payload::with_tasks("Dispatching", [("excel", "look up customer")]),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"dispatch\""));

        let parsed: ScriptEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.kind(), "dispatch");
    }

    #[test]
    fn live_status_carries_task_text() {
        let json = r#"{"type":"agent_status","agent":"excel","status":"working",
                       "task":"lookup","task_id":"t-1","room":"R-excel","timestamp":"2025-01-01T00:00:00Z"}"#;
        let parsed: ScriptEvent = serde_json::from_str(json).unwrap();
        match parsed {
            ScriptEvent::AgentStatus { agent, status, task, synthesis, .. } => {
                assert_eq!(agent, "excel");
                assert_eq!(status, AgentStatus::Working);
                assert_eq!(task.as_deref(), Some("lookup"));
                assert!(!synthesis);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn result_defaults_to_done() {
        let parsed: ScriptEvent =
            serde_json::from_str(r#"{"type":"agent_result","agent":"github"}"#).unwrap();
        assert!(matches!(parsed, ScriptEvent::AgentResult { status: AgentStatus::Done, .. }));
    }

    #[test]
    fn unknown_kind_is_unrecognized() {
        let parsed: ScriptEvent = serde_json::from_str(r#"{"type":"teleport","agent":"x"}"#).unwrap();
        assert_eq!(parsed, ScriptEvent::Unrecognized);
        assert!(parsed.agents().is_empty());
    }

    #[test]
    fn payload_accessors() {
        let payload = Payload::with_tasks("go", [("excel", "a"), ("github", "b")]);
        assert_eq!(payload.text(), Some("go"));
        assert_eq!(payload.task_for("github"), Some("b"));
        assert_eq!(payload.task_for("browser"), None);
        assert_eq!(Payload::default().text(), None);
    }

    #[test]
    fn dispatch_names_all_agents() {
        let event = ScriptEvent::Dispatch {
            from: "orchestrator".to_string(),
            targets: vec!["excel".to_string(), "browser".to_string()],
            payload: Payload::default(),
        };
        assert_eq!(event.agents(), vec!["orchestrator", "excel", "browser"]);
    }
}
