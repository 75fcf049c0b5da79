//! Wire frames for the multiplexed WebSocket channel
//!
//! Every frame is a JSON object tagged by a lowercase `type` field.

use serde::{Deserialize, Serialize};

use crate::session::{ProjectGroup, SessionListing, SessionView};

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    /// Start receiving a session's output
    Subscribe { session: String },
    /// Stop receiving a session's output
    Unsubscribe { session: String },
    /// Type a line into the session
    Input { session: String, data: String },
    /// Send a tmux key sequence without Enter
    RawKeys { session: String, data: String },
    /// Request the full listing
    List,
    /// Kill one session
    Kill { session: String },
    /// Kill every stale session
    Cleanup,
}

/// Frames sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Full listing, flat and grouped
    Sessions {
        data: Vec<SessionView>,
        grouped: Vec<ProjectGroup>,
    },
    /// Full capture of a subscribed session
    Output { session: String, data: String },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
    Killed { session: String },
    Cleaned { killed: Vec<String>, count: usize },
}

impl ServerFrame {
    pub fn sessions(listing: SessionListing) -> Self {
        Self::Sessions {
            data: listing.sessions,
            grouped: listing.grouped,
        }
    }

    pub fn error(message: impl Into<String>, session: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            session: session.map(str::to_string),
        }
    }

    pub fn cleaned(killed: Vec<String>) -> Self {
        Self::Cleaned {
            count: killed.len(),
            killed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_frames() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"rawkeys","session":"s","data":"C-c"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::RawKeys {
                session: "s".into(),
                data: "C-c".into()
            }
        );

        let frame: ClientFrame = serde_json::from_str(r#"{"type":"cleanup"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Cleanup);
    }

    #[test]
    fn test_malformed_client_frames_are_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"dance"}"#).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }

    #[test]
    fn test_server_frame_shapes() {
        let value = serde_json::to_value(ServerFrame::cleaned(vec!["a".into(), "b".into()])).unwrap();
        assert_eq!(value, json!({"type": "cleaned", "killed": ["a", "b"], "count": 2}));

        let value = serde_json::to_value(ServerFrame::error("boom", None)).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "boom"}));

        let value = serde_json::to_value(ServerFrame::error("boom", Some("s"))).unwrap();
        assert_eq!(value, json!({"type": "error", "message": "boom", "session": "s"}));
    }
}
