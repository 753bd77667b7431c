use super::*;
use shared::domain::ConversationId;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_handler(hits: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> ChannelHandler {
    Arc::new(move |_envelope| hits.lock().unwrap().push(tag))
}

#[test]
fn publish_invokes_every_handler_in_subscription_order() {
    let registry = ChannelRegistry::new();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let first = counting_handler(Arc::clone(&hits), "first");
    let second = counting_handler(Arc::clone(&hits), "second");

    registry.subscribe(Channel::NewMessage, first);
    registry.subscribe(Channel::NewMessage, second);
    registry.publish_incoming(Channel::NewMessage, ReplyEnvelope::ok(()));

    assert_eq!(*hits.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn subscribing_the_same_handle_twice_delivers_once() {
    let registry = ChannelRegistry::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let handler: ChannelHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.subscribe(Channel::NewMessage, Arc::clone(&handler));
    registry.subscribe(Channel::NewMessage, Arc::clone(&handler));
    registry.publish_incoming(Channel::NewMessage, ReplyEnvelope::ok(()));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(registry.subscriber_count(Channel::NewMessage), 1);
}

#[test]
fn unsubscribed_handler_receives_nothing() {
    let registry = ChannelRegistry::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let handler: ChannelHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.subscribe(Channel::NewMessage, Arc::clone(&handler));
    registry.unsubscribe(Channel::NewMessage, &handler);
    registry.publish_incoming(Channel::NewMessage, ReplyEnvelope::ok(()));

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn unsubscribe_removes_only_the_exact_pair() {
    let registry = ChannelRegistry::new();
    let hits = Arc::new(Mutex::new(Vec::new()));
    let keep = counting_handler(Arc::clone(&hits), "keep");
    let drop_me = counting_handler(Arc::clone(&hits), "drop");

    registry.subscribe(Channel::NewConversation, Arc::clone(&keep));
    registry.subscribe(Channel::NewConversation, Arc::clone(&drop_me));
    // Unsubscribing from a channel the pair was never registered on
    // must be a no-op.
    registry.unsubscribe(Channel::NewMessage, &keep);
    registry.unsubscribe(Channel::NewConversation, &drop_me);
    registry.publish_incoming(Channel::NewConversation, ReplyEnvelope::ok(()));

    assert_eq!(*hits.lock().unwrap(), vec!["keep"]);
}

#[test]
fn handlers_may_unsubscribe_reentrantly_during_delivery() {
    let registry = Arc::new(ChannelRegistry::new());
    let count = Arc::new(AtomicUsize::new(0));

    let registry_inner = Arc::clone(&registry);
    let counter = Arc::clone(&count);
    let slot: Arc<Mutex<Option<ChannelHandler>>> = Arc::new(Mutex::new(None));
    let slot_inner = Arc::clone(&slot);
    let handler: ChannelHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(me) = slot_inner.lock().unwrap().take() {
            registry_inner.unsubscribe(Channel::GetContacts, &me);
        }
    });
    *slot.lock().unwrap() = Some(Arc::clone(&handler));

    registry.subscribe(Channel::GetContacts, handler);
    registry.publish_incoming(Channel::GetContacts, ReplyEnvelope::ok(()));
    registry.publish_incoming(Channel::GetContacts, ReplyEnvelope::ok(()));

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn emit_without_bound_transport_raises_not_connected() {
    let registry = ChannelRegistry::new();
    let err = registry.emit(ClientEmit::GetConversations).unwrap_err();
    assert!(matches!(err, SyncError::NotConnected));
}

#[tokio::test]
async fn emit_writes_the_serialized_frame() {
    let registry = ChannelRegistry::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    registry.bind(tx);

    registry
        .emit(ClientEmit::GetMessages {
            conversation_id: ConversationId::from("c7"),
        })
        .unwrap();

    let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["channel"], "getMessages");
    assert_eq!(frame["payload"]["conversationId"], "c7");
}

#[test]
fn clear_drops_all_subscriptions() {
    let registry = ChannelRegistry::new();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let handler: ChannelHandler = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.subscribe(Channel::NewMessage, Arc::clone(&handler));
    registry.subscribe(Channel::GetConversations, handler);
    registry.clear();
    registry.publish_incoming(Channel::NewMessage, ReplyEnvelope::ok(()));
    registry.publish_incoming(Channel::GetConversations, ReplyEnvelope::ok(()));

    assert_eq!(count.load(Ordering::SeqCst), 0);
}
