use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use shared::{
    domain::{Conversation, ConversationId, ConversationKind, Message, UserId, UserProfile},
    protocol::{Channel, ClientEmit, ConversationPush, ProfileUpdated},
};
use tracing::warn;

pub mod auth;
pub mod connection;
pub mod error;
pub mod reconcile;
pub mod registry;
pub mod request;
pub mod session;
pub mod upload;

use auth::AuthClient;
use connection::{ConnectionManager, Transport, WsTransport};
use error::SyncError;
use registry::{ChannelHandler, ChannelRegistry};
use request::DEFAULT_REQUEST_TIMEOUT;
use session::{CredentialStore, SessionStore, SessionUser};
use upload::{BlobUploader, MissingBlobUploader};

pub use connection::ConnectionState;
pub use session::Credential;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A file attachment picked by the UI, not yet uploaded.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Client facade for one user session: owns the session store, the
/// connection manager (and through it the channel registry), the
/// credential-issuing HTTP client and the blob-upload seam.
pub struct ChatClient {
    config: ClientConfig,
    auth: AuthClient,
    session: SessionStore,
    connection: Arc<ConnectionManager>,
    uploader: Arc<dyn BlobUploader>,
    identity: Mutex<Option<SessionUser>>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, credential_store: Box<dyn CredentialStore>) -> Arc<Self> {
        Self::new_with_dependencies(
            config,
            credential_store,
            Arc::new(WsTransport),
            Arc::new(MissingBlobUploader),
        )
    }

    pub fn new_with_dependencies(
        config: ClientConfig,
        credential_store: Box<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        uploader: Arc<dyn BlobUploader>,
    ) -> Arc<Self> {
        let auth = AuthClient::new(config.server_url.clone());
        let connection = ConnectionManager::new(config.server_url.clone(), transport);
        Arc::new(Self {
            config,
            auth,
            session: SessionStore::new(credential_store),
            connection,
            uploader,
            identity: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(self.connection.registry())
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Identity snapshot decoded from the current credential; replaced
    /// wholesale whenever the credential is.
    pub fn current_user(&self) -> Option<SessionUser> {
        self.identity.lock().unwrap().clone()
    }

    fn adopt(&self, credential: &Credential) {
        *self.identity.lock().unwrap() = Some(credential.user().clone());
    }

    fn sender_profile(&self) -> Result<UserProfile, SyncError> {
        self.current_user()
            .map(|user| user.profile())
            .ok_or(SyncError::NoCredential)
    }

    /// Resumes a persisted session. Returns false (signed out) when
    /// no credential survives the load; an expired or malformed token
    /// has already been cleared by the session store.
    pub async fn resume(self: &Arc<Self>) -> Result<bool> {
        let Some(credential) = self.session.load()? else {
            return Ok(false);
        };
        self.adopt(&credential);
        self.connection.open(Some(&credential)).await?;
        Ok(true)
    }

    pub async fn sign_in(self: &Arc<Self>, email: &str, password: &str) -> Result<UserProfile> {
        let token = self.auth.login(email, password).await?;
        self.establish(&token).await
    }

    pub async fn sign_up(
        self: &Arc<Self>,
        name: &str,
        email: &str,
        password: &str,
        avatar: Option<AttachmentUpload>,
    ) -> Result<UserProfile> {
        let avatar_ref = match avatar {
            Some(upload) => Some(
                self.uploader
                    .upload(upload.bytes, &upload.filename, "profiles")
                    .await?,
            ),
            None => None,
        };
        let token = self
            .auth
            .register(name, email, password, avatar_ref.as_deref())
            .await?;
        self.establish(&token).await
    }

    async fn establish(self: &Arc<Self>, token: &str) -> Result<UserProfile> {
        let credential = self.session.save(token)?;
        self.adopt(&credential);
        self.connection.open(Some(&credential)).await?;
        Ok(credential.user().profile())
    }

    /// Full teardown: connection closed, every channel subscription
    /// dropped, credential cleared. After this no handler can observe
    /// events meant for a later sign-in.
    pub fn sign_out(&self) -> Result<()> {
        self.connection.close();
        self.connection.registry().clear();
        *self.identity.lock().unwrap() = None;
        self.session.clear()
    }

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let conversations = request::request_decoded(
            self.connection.registry(),
            ClientEmit::GetConversations,
            self.config.request_timeout,
        )
        .await?;
        Ok(conversations)
    }

    pub async fn fetch_messages(&self, conversation_id: &ConversationId) -> Result<Vec<Message>> {
        let messages = request::request_decoded(
            self.connection.registry(),
            ClientEmit::GetMessages {
                conversation_id: conversation_id.clone(),
            },
            self.config.request_timeout,
        )
        .await?;
        Ok(messages)
    }

    pub async fn fetch_contacts(&self) -> Result<Vec<UserProfile>> {
        let contacts = request::request_decoded(
            self.connection.registry(),
            ClientEmit::GetContacts,
            self.config.request_timeout,
        )
        .await?;
        Ok(contacts)
    }

    /// Starts (or finds) the direct conversation with `other`. The
    /// server decides which: an existing pair comes back without the
    /// is-new marker.
    pub async fn start_direct_conversation(&self, other: &UserId) -> Result<ConversationPush> {
        let me = self.sender_profile()?;
        let push = request::request_decoded(
            self.connection.registry(),
            ClientEmit::NewConversation {
                kind: ConversationKind::Direct,
                participants: vec![me.id, other.clone()],
                name: None,
                avatar: None,
            },
            self.config.request_timeout,
        )
        .await?;
        Ok(push)
    }

    pub async fn create_group_conversation(
        &self,
        name: &str,
        participants: Vec<UserId>,
        avatar: Option<AttachmentUpload>,
    ) -> Result<ConversationPush> {
        let me = self.sender_profile()?;
        let avatar_ref = match avatar {
            Some(upload) => Some(
                self.uploader
                    .upload(upload.bytes, &upload.filename, "group-avatars")
                    .await?,
            ),
            None => None,
        };

        let mut all = vec![me.id];
        all.extend(participants);

        let push = request::request_decoded(
            self.connection.registry(),
            ClientEmit::NewConversation {
                kind: ConversationKind::Group,
                participants: all,
                name: Some(name.to_string()),
                avatar: avatar_ref,
            },
            self.config.request_timeout,
        )
        .await?;
        Ok(push)
    }

    /// Sends a message; the delivered copy comes back as a push on
    /// `newMessage` for every participant, including the sender. An
    /// attachment is uploaded to the blob store first and aborts the
    /// send when that fails.
    pub async fn send_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        attachment: Option<AttachmentUpload>,
    ) -> Result<()> {
        let sender = self.sender_profile()?;
        let attachment_ref = match attachment {
            Some(upload) => Some(
                self.uploader
                    .upload(upload.bytes, &upload.filename, "message-attachments")
                    .await?,
            ),
            None => None,
        };

        self.connection.registry().emit(ClientEmit::NewMessage {
            conversation_id: conversation_id.clone(),
            sender,
            content: content.trim().to_string(),
            attachment: attachment_ref,
        })?;
        Ok(())
    }

    /// Updates name/avatar; the server re-issues the credential,
    /// which replaces the stored one and the identity snapshot.
    pub async fn update_profile(
        &self,
        name: &str,
        avatar: Option<AttachmentUpload>,
    ) -> Result<UserProfile> {
        let avatar_ref = match avatar {
            Some(upload) => Some(
                self.uploader
                    .upload(upload.bytes, &upload.filename, "profiles")
                    .await?,
            ),
            None => None,
        };

        let updated: ProfileUpdated = request::request_decoded(
            self.connection.registry(),
            ClientEmit::UpdateProfile {
                name: name.to_string(),
                avatar: avatar_ref,
            },
            self.config.request_timeout,
        )
        .await?;

        let credential = self.session.save(&updated.token)?;
        self.adopt(&credential);
        Ok(credential.user().profile())
    }
}

/// Conversation-list surface: subscribes the reconciler merges onto
/// shared list state and tears them down on detach. One instance per
/// mounted list view.
pub struct ConversationListState {
    registry: Arc<ChannelRegistry>,
    conversations: Arc<Mutex<Vec<Conversation>>>,
    handlers: Vec<(Channel, ChannelHandler)>,
}

impl ConversationListState {
    pub fn attach(registry: Arc<ChannelRegistry>) -> Self {
        let conversations = Arc::new(Mutex::new(Vec::new()));

        let snapshot_state = Arc::clone(&conversations);
        let snapshot: ChannelHandler = Arc::new(move |envelope| {
            match envelope.decode::<Vec<Conversation>>() {
                Ok(list) => {
                    *snapshot_state.lock().unwrap() = reconcile::apply_conversation_snapshot(list);
                }
                Err(err) => warn!("conversation snapshot rejected: {err}"),
            }
        });

        let push_state = Arc::clone(&conversations);
        let on_new_conversation: ChannelHandler = Arc::new(move |envelope| {
            match envelope.decode::<ConversationPush>() {
                Ok(push) => {
                    let mut guard = push_state.lock().unwrap();
                    let current = std::mem::take(&mut *guard);
                    *guard = reconcile::apply_new_conversation(current, push);
                }
                Err(err) => warn!("newConversation push rejected: {err}"),
            }
        });

        let message_state = Arc::clone(&conversations);
        let on_new_message: ChannelHandler =
            Arc::new(move |envelope| match envelope.decode::<Message>() {
                Ok(message) => {
                    let mut guard = message_state.lock().unwrap();
                    let current = std::mem::take(&mut *guard);
                    *guard = reconcile::apply_incoming_message(current, &message);
                }
                Err(err) => warn!("newMessage push rejected: {err}"),
            });

        let handlers = vec![
            (Channel::GetConversations, snapshot),
            (Channel::NewConversation, on_new_conversation),
            (Channel::NewMessage, on_new_message),
        ];
        for (channel, handler) in &handlers {
            registry.subscribe(*channel, Arc::clone(handler));
        }

        Self {
            registry,
            conversations,
            handlers,
        }
    }

    /// Asks the server for the full snapshot; the reply lands in the
    /// subscription above.
    pub fn request_refresh(&self) -> Result<(), SyncError> {
        self.registry.emit(ClientEmit::GetConversations)
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.lock().unwrap().clone()
    }

    /// The direct/group tab, sorted most-recent-first.
    pub fn tab(&self, kind: ConversationKind) -> Vec<Conversation> {
        reconcile::conversations_of_kind(&self.conversations.lock().unwrap(), kind)
    }

    pub fn detach(&mut self) {
        for (channel, handler) in self.handlers.drain(..) {
            self.registry.unsubscribe(channel, &handler);
        }
    }
}

impl Drop for ConversationListState {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Open-thread surface: history snapshot plus live prepend of pushes
/// belonging to this conversation, newest-first.
pub struct ThreadState {
    registry: Arc<ChannelRegistry>,
    conversation_id: ConversationId,
    messages: Arc<Mutex<Vec<Message>>>,
    handlers: Vec<(Channel, ChannelHandler)>,
}

impl ThreadState {
    pub fn attach(registry: Arc<ChannelRegistry>, conversation_id: ConversationId) -> Self {
        let messages = Arc::new(Mutex::new(Vec::new()));

        let history_state = Arc::clone(&messages);
        let history: ChannelHandler =
            Arc::new(move |envelope| match envelope.decode::<Vec<Message>>() {
                Ok(list) => *history_state.lock().unwrap() = list,
                Err(err) => warn!("message history rejected: {err}"),
            });

        let live_state = Arc::clone(&messages);
        let thread_id = conversation_id.clone();
        let live: ChannelHandler = Arc::new(move |envelope| match envelope.decode::<Message>() {
            Ok(message) => {
                let mut guard = live_state.lock().unwrap();
                let current = std::mem::take(&mut *guard);
                *guard = reconcile::apply_incoming_message_to_thread(current, &message, &thread_id);
            }
            Err(err) => warn!("newMessage push rejected: {err}"),
        });

        let handlers = vec![(Channel::GetMessages, history), (Channel::NewMessage, live)];
        for (channel, handler) in &handlers {
            registry.subscribe(*channel, Arc::clone(handler));
        }

        Self {
            registry,
            conversation_id,
            messages,
            handlers,
        }
    }

    pub fn request_history(&self) -> Result<(), SyncError> {
        self.registry.emit(ClientEmit::GetMessages {
            conversation_id: self.conversation_id.clone(),
        })
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn detach(&mut self) {
        for (channel, handler) in self.handlers.drain(..) {
            self.registry.unsubscribe(channel, &handler);
        }
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod testsupport;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
