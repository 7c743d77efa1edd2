use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of activity recorded on a pull request timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Comment,
    Approved,
    ChangesRequested,
    Merged,
    Closed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventKind::Created => "created",
            EventKind::Comment => "comment",
            EventKind::Approved => "approved",
            EventKind::ChangesRequested => "changes_requested",
            EventKind::Merged => "merged",
            EventKind::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// A single timeline entry, serialized as `{type, date, person}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "person")]
    pub actor: String,
}

impl Event {
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>, actor: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            actor: actor.into(),
        }
    }
}

/// A pull request and its chronologically ordered events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrRecord {
    pub number: u64,
    pub title: String,
    pub events: Vec<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = Event::new(
            EventKind::ChangesRequested,
            "2025-06-15T10:00:00Z".parse().unwrap(),
            "alice",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "changes_requested",
                "date": "2025-06-15T10:00:00Z",
                "person": "alice"
            })
        );
    }

    #[test]
    fn test_kind_display_matches_wire_name() {
        for kind in [
            EventKind::Created,
            EventKind::Comment,
            EventKind::Approved,
            EventKind::ChangesRequested,
            EventKind::Merged,
            EventKind::Closed,
        ] {
            let wire = serde_json::to_value(kind).unwrap();
            assert_eq!(wire, serde_json::Value::String(kind.to_string()));
        }
    }
}
