use std::fmt;

use serde::{
    Deserialize,
    Serialize,
};

/// Categories of events emitted over the per-user event stream
/// (`GET /nublado/spawner/v1/labs/<username>/events`).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Complete,
    Error,
    Failed,
    Info,
    Progress,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Complete => "complete",
            EventType::Error => "error",
            EventType::Failed => "failed",
            EventType::Info => "info",
            EventType::Progress => "progress",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Event {
    pub data: String,
    pub event: EventType,
}

impl Event {
    pub fn info(msg: &str) -> Event {
        Event { data: msg.into(), event: EventType::Info }
    }

    // Progress events carry a percentage as their payload
    pub fn progress(pct: u32) -> Event {
        Event { data: pct.to_string(), event: EventType::Progress }
    }

    pub fn complete() -> Event {
        Event { data: "Lab pod running".into(), event: EventType::Complete }
    }

    pub fn error(msg: &str) -> Event {
        Event { data: msg.into(), event: EventType::Error }
    }

    pub fn failed(msg: &str) -> Event {
        Event { data: msg.into(), event: EventType::Failed }
    }

    /// A terminal event ends the user's event stream; no further events for
    /// the current operation will follow it.
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, EventType::Complete | EventType::Failed)
    }
}
