use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{EncodingKey, Header};
use shared::{
    domain::{Conversation, ConversationId, ConversationKind, Message, MessageId, UserProfile},
    protocol::{Channel, Frame, ReplyEnvelope},
};
use tokio::sync::mpsc;

use crate::{
    connection::{Transport, TransportLink},
    session::{Claims, SessionUser},
    upload::BlobUploader,
};

/// In-memory transport: captures emitted frames and lets tests feed
/// inbound ones.
pub(crate) struct FakeTransport {
    pub sent: Arc<Mutex<Vec<String>>>,
    pub inbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    pub fail_connect: bool,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            inbound: Mutex::new(None),
            fail_connect: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            inbound: Mutex::new(None),
            fail_connect: true,
        })
    }

    /// Pushes a server frame into the open connection.
    pub fn push(&self, channel: Channel, body: ReplyEnvelope) {
        let frame = serde_json::to_string(&Frame { channel, body }).unwrap();
        self.inbound
            .lock()
            .unwrap()
            .as_ref()
            .expect("transport not connected")
            .send(frame)
            .unwrap();
    }

    /// Drops the inbound sender, simulating transport loss.
    pub fn drop_connection(&self) {
        self.inbound.lock().unwrap().take();
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, _server_url: &str, _token: &str) -> Result<TransportLink> {
        if self.fail_connect {
            anyhow::bail!("transport refused the connection");
        }
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        *self.inbound.lock().unwrap() = Some(in_tx);

        let sent = Arc::clone(&self.sent);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                sent.lock().unwrap().push(frame);
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Upload stub that hands back a deterministic remote reference, or
/// fails when constructed that way.
pub(crate) struct RecordingUploader {
    pub uploads: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            fail: true,
        })
    }
}

#[async_trait]
impl BlobUploader for RecordingUploader {
    async fn upload(&self, _bytes: Vec<u8>, filename: &str, folder: &str) -> Result<String> {
        if self.fail {
            anyhow::bail!("blob store unavailable");
        }
        self.uploads
            .lock()
            .unwrap()
            .push((folder.to_string(), filename.to_string()));
        Ok(format!("https://blobs.example/{folder}/{filename}"))
    }
}

/// Mints a signed token the way the auth collaborator would.
pub(crate) fn mint_token(user_id: &str, name: &str, exp: i64) -> String {
    let claims = Claims {
        user: SessionUser {
            id: user_id.into(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            avatar: None,
        },
        exp,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap()
}

pub(crate) fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub(crate) fn profile(id: &str, name: &str) -> UserProfile {
    UserProfile {
        id: id.into(),
        name: name.to_string(),
        avatar: None,
    }
}

pub(crate) fn direct_conversation(id: &str, created_at: i64) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        kind: ConversationKind::Direct,
        name: None,
        avatar: None,
        participants: vec![profile("u1", "Ada"), profile("u2", "Grace")],
        last_message: None,
        created_at: ts(created_at),
    }
}

pub(crate) fn group_conversation(id: &str, name: &str, created_at: i64) -> Conversation {
    Conversation {
        id: ConversationId::from(id),
        kind: ConversationKind::Group,
        name: Some(name.to_string()),
        avatar: None,
        participants: vec![
            profile("u1", "Ada"),
            profile("u2", "Grace"),
            profile("u3", "Edsger"),
        ],
        last_message: None,
        created_at: ts(created_at),
    }
}

pub(crate) fn message(id: &str, conversation_id: &str, created_at: i64) -> Message {
    Message {
        id: MessageId::from(id),
        conversation_id: ConversationId::from(conversation_id),
        sender: profile("u2", "Grace"),
        content: format!("message {id}"),
        attachment: None,
        created_at: ts(created_at),
    }
}
