use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{Conversation, ConversationId, ConversationKind, UserId, UserProfile};

/// The named event channels multiplexed over the single realtime
/// connection. Query channels (`get*`) reply on the same name they
/// were asked on; push channels (`new*`, `updateProfile`) are also
/// broadcast to every participant's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    GetConversations,
    NewConversation,
    GetMessages,
    NewMessage,
    GetContacts,
    UpdateProfile,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::GetConversations => "getConversations",
            Channel::NewConversation => "newConversation",
            Channel::GetMessages => "getMessages",
            Channel::NewMessage => "newMessage",
            Channel::GetContacts => "getContacts",
            Channel::UpdateProfile => "updateProfile",
        }
    }
}

/// Outbound frame: one variant per channel the client emits on, with
/// its typed payload. Serializes as `{"channel": ..., "payload": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "camelCase")]
pub enum ClientEmit {
    GetConversations,
    #[serde(rename_all = "camelCase")]
    NewConversation {
        #[serde(rename = "type")]
        kind: ConversationKind,
        participants: Vec<UserId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    GetMessages { conversation_id: ConversationId },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        conversation_id: ConversationId,
        sender: UserProfile,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<String>,
    },
    GetContacts,
    #[serde(rename_all = "camelCase")]
    UpdateProfile {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<String>,
    },
}

impl ClientEmit {
    pub fn channel(&self) -> Channel {
        match self {
            ClientEmit::GetConversations => Channel::GetConversations,
            ClientEmit::NewConversation { .. } => Channel::NewConversation,
            ClientEmit::GetMessages { .. } => Channel::GetMessages,
            ClientEmit::NewMessage { .. } => Channel::NewMessage,
            ClientEmit::GetContacts => Channel::GetContacts,
            ClientEmit::UpdateProfile { .. } => Channel::UpdateProfile,
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("server rejected the request: {0}")]
    Rejected(String),
    #[error("failed to decode reply payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Reply envelope shared by query replies and push events:
/// `data` is present iff `success`, `msg` is a human-readable
/// diagnostic otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl ReplyEnvelope {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            msg: None,
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            msg: Some(msg.into()),
        }
    }

    /// Typed extraction, applied at the registry boundary so nothing
    /// shapeless reaches the reconciler.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, EnvelopeError> {
        if !self.success {
            return Err(EnvelopeError::Rejected(
                self.msg.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        serde_json::from_value(self.data.unwrap_or(Value::Null)).map_err(EnvelopeError::Decode)
    }
}

/// Inbound frame: channel name plus a flattened reply envelope,
/// i.e. `{"channel": "newMessage", "success": true, "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub channel: Channel,
    #[serde(flatten)]
    pub body: ReplyEnvelope,
}

/// Payload pushed on `newConversation`. The server reuses one event
/// for both "created" and "found existing": only genuinely new
/// conversations carry `isNew`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationPush {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default, rename = "isNew")]
    pub is_new: bool,
}

/// Payload pushed on `updateProfile`: the re-issued credential for
/// the renamed identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub token: String,
}
