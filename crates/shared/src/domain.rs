use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ConversationId);
id_newtype!(MessageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Identity-like record used for participants, contacts and message
/// senders. Participant records come off the wire keyed `_id`, while
/// contacts and client-built sender records use `id`; the alias
/// accepts both and serialization always emits `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id")]
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: UserProfile,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: ConversationId,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub participants: Vec<UserProfile>,
    #[serde(default)]
    pub last_message: Option<Message>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Server-side invariants: participants are non-empty and a direct
    /// conversation has exactly two. The client does not construct
    /// conversations itself, so this is a validation helper rather
    /// than a constructor guarantee.
    pub fn participants_valid(&self) -> bool {
        match self.kind {
            ConversationKind::Direct => self.participants.len() == 2,
            ConversationKind::Group => !self.participants.is_empty(),
        }
    }

    /// Display name: a direct conversation borrows the other
    /// participant's name, a group uses its own.
    pub fn display_name(&self, viewer: &UserId) -> Option<&str> {
        match self.kind {
            ConversationKind::Direct => self
                .participants
                .iter()
                .find(|p| &p.id != viewer)
                .map(|p| p.name.as_str()),
            ConversationKind::Group => self.name.as_deref(),
        }
    }
}
