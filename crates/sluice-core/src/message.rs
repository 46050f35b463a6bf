//! Messages exchanged with the host process, one JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    Record {
        record: RecordMessage,
    },
    State {
        state: StateMessage,
    },
    ConnectionStatus {
        #[serde(rename = "connectionStatus")]
        connection_status: ConnectionStatus,
    },
}

/// One record on a stream. `emitted_at` is milliseconds since epoch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMessage {
    pub stream: String,
    pub data: Value,
    pub emitted_at: i64,
}

/// An opaque checkpoint blob. The sink never inspects it; it only compares
/// serialized forms to suppress duplicate emissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateMessage(pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Succeeded,
    Failed,
}

/// Result of the `check` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectionStatus {
    pub fn succeeded() -> Message {
        Message::ConnectionStatus {
            connection_status: ConnectionStatus {
                status: Status::Succeeded,
                message: None,
            },
        }
    }

    pub fn failed(message: impl Into<String>) -> Message {
        Message::ConnectionStatus {
            connection_status: ConnectionStatus {
                status: Status::Failed,
                message: Some(message.into()),
            },
        }
    }
}
