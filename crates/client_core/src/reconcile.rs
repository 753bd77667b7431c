//! Pure merge functions reconciling server-pushed events into the
//! conversation and thread lists owned by UI surfaces. All event
//! delivery is single-threaded, so none of this needs locking; every
//! function returns a fresh list instead of mutating in place.

use chrono::{DateTime, Utc};
use shared::{
    domain::{Conversation, ConversationId, ConversationKind, Message},
    protocol::ConversationPush,
};

/// Initial full fetch: the snapshot wholesale replaces whatever was
/// held before, no merging with prior state.
pub fn apply_conversation_snapshot(snapshot: Vec<Conversation>) -> Vec<Conversation> {
    snapshot
}

/// A `newConversation` push is reused for both "created" and "found
/// existing": only a push marked `isNew` by the server is appended.
/// Identity of a direct conversation is server-assigned; this
/// deliberately never infers dedup from participant sets.
pub fn apply_new_conversation(
    existing: Vec<Conversation>,
    push: ConversationPush,
) -> Vec<Conversation> {
    if !push.is_new {
        return existing;
    }
    let mut merged = existing;
    merged.push(push.conversation);
    merged
}

/// Replaces `last_message` of the conversation the message belongs
/// to; every other conversation is untouched. A message for an
/// unknown conversation leaves the list unchanged — it may still
/// reach an open thread view through its own channel.
pub fn apply_incoming_message(
    conversations: Vec<Conversation>,
    message: &Message,
) -> Vec<Conversation> {
    conversations
        .into_iter()
        .map(|mut conversation| {
            if conversation.id == message.conversation_id {
                conversation.last_message = Some(message.clone());
            }
            conversation
        })
        .collect()
}

/// Prepends the message iff it belongs to the currently open thread;
/// thread lists are maintained newest-first.
pub fn apply_incoming_message_to_thread(
    messages: Vec<Message>,
    message: &Message,
    open_thread: &ConversationId,
) -> Vec<Message> {
    if &message.conversation_id != open_thread {
        return messages;
    }
    let mut merged = Vec::with_capacity(messages.len() + 1);
    merged.push(message.clone());
    merged.extend(messages);
    merged
}

/// Display ordering key: the last message's timestamp, falling back
/// to the conversation's creation time.
pub fn recency_key(conversation: &Conversation) -> DateTime<Utc> {
    conversation
        .last_message
        .as_ref()
        .map(|message| message.created_at)
        .unwrap_or(conversation.created_at)
}

/// Most recent first; the stable sort keeps server order for ties.
pub fn sort_by_recency(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| recency_key(b).cmp(&recency_key(a)));
}

/// Read-time projection into the direct or group tab, sorted for
/// display. Partitioning is never stored state.
pub fn conversations_of_kind(
    conversations: &[Conversation],
    kind: ConversationKind,
) -> Vec<Conversation> {
    let mut selected: Vec<Conversation> = conversations
        .iter()
        .filter(|conversation| conversation.kind == kind)
        .cloned()
        .collect();
    sort_by_recency(&mut selected);
    selected
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
