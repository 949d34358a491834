use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ErrorBody;
use crate::models::{Connection, ConnectionRequest, MessageView};

/// Events pushed from the server to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Answer to a `user-online` announcement
    UserOnline { success: bool },

    /// Echo of a message the client itself sent, after it was persisted
    MessageSent { message: MessageView },

    /// A message addressed to this client
    NewMessage { message: MessageView },

    /// A `send-message` command failed; only the sender receives this
    MessageError { error: ErrorBody },

    /// Someone asked to connect with this client
    ConnectionRequest { request: ConnectionRequest },

    /// A request this client sent was accepted
    ConnectionAccepted { connection: Connection },
}

/// Commands sent FROM client TO server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Register this transport as the push target for `user_id`
    UserOnline { user_id: Uuid },

    SendMessage {
        sender_id: Uuid,
        receiver_id: Uuid,
        #[serde(default)]
        content: String,
        #[serde(default)]
        post_id: Option<Uuid>,
        #[serde(default)]
        event_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_kebab_case_tags() {
        let user_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"user-online","data":{{"user_id":"{user_id}"}}}}"#);
        match serde_json::from_str::<ClientCommand>(&raw).unwrap() {
            ClientCommand::UserOnline { user_id: parsed } => assert_eq!(parsed, user_id),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn send_message_content_defaults_to_empty() {
        let raw = format!(
            r#"{{"type":"send-message","data":{{"sender_id":"{}","receiver_id":"{}"}}}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        match serde_json::from_str::<ClientCommand>(&raw).unwrap() {
            ClientCommand::SendMessage { content, post_id, .. } => {
                assert!(content.is_empty());
                assert!(post_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ack_event_shape() {
        let json = serde_json::to_value(ServerEvent::UserOnline { success: true }).unwrap();
        assert_eq!(json["type"], "user-online");
        assert_eq!(json["data"]["success"], true);
    }
}
