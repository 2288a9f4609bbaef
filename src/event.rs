//! The alert record emitted once per confirmed fall.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wall-clock format used in the event payload and the operator overlay.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "Fall_Detected")]
    FallDetected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FallDetected => "Fall_Detected",
        }
    }
}

/// Fixed per-device fields stamped onto every event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventIdentity {
    pub device_id: String,
    pub location: String,
}

impl EventIdentity {
    pub fn new(device_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            location: location.into(),
        }
    }
}

/// Immutable record of one confirmed fall.
///
/// Field order matches the notification payload:
/// `{event_id, event, device_id, timestamp, location}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallEvent {
    event_id: String,
    event: EventKind,
    device_id: String,
    timestamp: String,
    location: String,
}

impl FallEvent {
    /// Build a fresh event with a random v4 id, stamped with the local time.
    pub fn confirm(identity: &EventIdentity) -> Self {
        Self::confirm_at(identity, &Local::now())
    }

    pub fn confirm_at<Tz: TimeZone>(identity: &EventIdentity, at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event: EventKind::FallDetected,
            device_id: identity.device_id.clone(),
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            location: identity.location.clone(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn kind(&self) -> EventKind {
        self.event
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
