//! Message types shared with the server's realtime stream

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Request,
    Tender,
    Supplier,
    Protocol,
    ArchivedProtocol,
}

/// Entities a user can sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SignTarget {
    Request,
    Protocol,
}

/// Messages from client to server
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { kinds: Vec<EntityKind> },
    Sign { target: SignTarget, id: Uuid },
}

/// Messages from server to client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        user_id: Option<Uuid>,
    },
    Subscribed {
        kinds: Vec<EntityKind>,
    },
    Event {
        entity_kind: EntityKind,
        /// Workflow event payload, kept loose so new server events still print
        event: serde_json::Value,
    },
    Signed {
        target: EntityKind,
        id: Uuid,
        newly_signed: bool,
        quorum_complete: bool,
    },
    Lagged {
        skipped: u64,
    },
    Error {
        message: String,
    },
}

/// One-line human readable summary of a workflow event
pub fn describe_event(event: &serde_json::Value) -> String {
    let kind = event["type"].as_str().unwrap_or("unknown");
    let ids: Vec<String> = event
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| key.as_str() != "type")
                .map(|(key, value)| match value.as_str() {
                    Some(s) => format!("{}={}", key, s),
                    None => format!("{}={}", key, value),
                })
                .collect()
        })
        .unwrap_or_default();

    if ids.is_empty() {
        kind.to_string()
    } else {
        format!("{} {}", kind, ids.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_message_serialization() {
        let msg = ClientMessage::Sign {
            target: SignTarget::Protocol,
            id: Uuid::nil(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "sign");
        assert_eq!(json["target"], "protocol");
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{
            "type": "event",
            "entity_kind": "protocol",
            "event": {
                "type": "protocol_status_changed",
                "protocol_id": "00000000-0000-0000-0000-000000000000",
                "status": "ready_to_number",
                "finance_status": "not_submitted"
            }
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Event { entity_kind, event } => {
                assert_eq!(entity_kind, EntityKind::Protocol);
                let line = describe_event(&event);
                assert!(line.starts_with("protocol_status_changed"));
                assert!(line.contains("status=ready_to_number"));
            }
            _ => panic!("Expected event message"),
        }
    }

    #[test]
    fn test_signed_deserialization() {
        let json = r#"{
            "type": "signed",
            "target": "request",
            "id": "00000000-0000-0000-0000-000000000000",
            "newly_signed": false,
            "quorum_complete": true
        }"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(
            msg,
            ServerMessage::Signed {
                newly_signed: false,
                quorum_complete: true,
                ..
            }
        ));
    }
}
