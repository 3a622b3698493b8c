//! Wire messages exchanged with a live feed.
//!
//! Inbound messages are JSON objects tagged by `type`: either a control
//! message about the feed itself, or one of the five session event kinds.
//! Outbound messages are tagged by `action`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::events::ScriptEvent;

/// Feed lifecycle and chat messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Feed status: `connected`, `live`, `demo_available`, `demo`, ...
    BridgeStatus {
        status: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rooms: Vec<String>,
    },

    /// Raw chat content from a remote participant
    Message {
        sender: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },

    /// A feed-driven replay started
    DemoStarted {
        #[serde(default)]
        scenario: String,
    },

    /// A feed-driven replay finished
    DemoComplete {
        #[serde(default)]
        scenario: String,
    },

    /// A feed-driven replay was cancelled
    DemoStopped {
        #[serde(default)]
        scenario: String,
    },

    /// Heartbeat answer
    Pong,

    /// Remote-side failure report
    Error { message: String },
}

const CONTROL_KINDS: &[&str] = &[
    "bridge_status",
    "message",
    "demo_started",
    "demo_complete",
    "demo_stopped",
    "pong",
    "error",
];

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Inbound {
    Control(Control),
    Event(ScriptEvent),
}

impl Inbound {
    /// Decode one inbound text frame.
    ///
    /// Fails on unparsable JSON, a missing `type` and on kinds that are
    /// neither control messages nor session events.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnknownKind("<missing>".to_string()))?
            .to_string();

        if CONTROL_KINDS.contains(&kind.as_str()) {
            return Ok(Inbound::Control(serde_json::from_value(value)?));
        }

        match serde_json::from_value(value)? {
            ScriptEvent::Unrecognized => Err(Error::UnknownKind(kind)),
            event => Ok(Inbound::Event(event)),
        }
    }

    /// Encode for sending.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages sent to the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outbound {
    /// Heartbeat
    Ping,
    /// Ask the feed to run its replay
    StartDemo,
    /// Ask the feed to cancel its replay
    StopDemo,
}

impl Outbound {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
