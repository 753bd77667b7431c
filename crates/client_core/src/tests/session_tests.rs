use super::*;
use crate::testsupport::mint_token;
use std::sync::Arc;

fn memory_session() -> (SessionStore, Arc<MemoryCredentialStore>) {
    let backing = Arc::new(MemoryCredentialStore::default());
    let session = SessionStore::new(Box::new(SharedStore(Arc::clone(&backing))));
    (session, backing)
}

// Small adapter so tests can inspect the backing store after the
// session store has consumed it.
struct SharedStore(Arc<MemoryCredentialStore>);

impl CredentialStore for SharedStore {
    fn load_token(&self) -> Result<Option<String>> {
        self.0.load_token()
    }
    fn save_token(&self, token: &str) -> Result<()> {
        self.0.save_token(token)
    }
    fn clear(&self) -> Result<()> {
        self.0.clear()
    }
}

#[test]
fn save_decodes_and_persists() {
    let (session, backing) = memory_session();
    let token = mint_token("u1", "Ada", Utc::now().timestamp() + 3600);

    let credential = session.save(&token).unwrap();

    assert_eq!(credential.user().id.as_str(), "u1");
    assert_eq!(credential.user().name, "Ada");
    assert_eq!(backing.load_token().unwrap(), Some(token));
}

#[test]
fn load_returns_a_valid_persisted_credential() {
    let (session, _) = memory_session();
    let token = mint_token("u1", "Ada", Utc::now().timestamp() + 3600);
    session.save(&token).unwrap();

    let loaded = session.load().unwrap().expect("credential should survive");
    assert_eq!(loaded.token, token);
    assert_eq!(loaded.user().email, "Ada@example.com");
}

#[test]
fn expired_credential_is_cleared_on_load() {
    let (session, backing) = memory_session();
    let token = mint_token("u1", "Ada", Utc::now().timestamp() - 1);
    backing.save_token(&token).unwrap();

    assert!(session.load().unwrap().is_none());
    assert_eq!(backing.load_token().unwrap(), None);
}

#[test]
fn malformed_credential_is_cleared_on_load() {
    let (session, backing) = memory_session();
    backing.save_token("not-a-jwt").unwrap();

    assert!(session.load().unwrap().is_none());
    assert_eq!(backing.load_token().unwrap(), None);
}

#[test]
fn save_rejects_a_malformed_token() {
    let (session, backing) = memory_session();
    let err = session.save("garbage").unwrap_err();
    assert!(err.downcast_ref::<CredentialError>().is_some());
    assert_eq!(backing.load_token().unwrap(), None);
}

#[test]
fn clear_is_idempotent() {
    let (session, _) = memory_session();
    session.clear().unwrap();
    session.clear().unwrap();
    assert!(session.load().unwrap().is_none());
}

#[test]
fn is_expired_is_a_pure_comparison() {
    let token = mint_token("u1", "Ada", 1_000);
    let credential = Credential::decode(&token).unwrap();
    assert!(!credential.is_expired(999));
    assert!(credential.is_expired(1_000));
    assert!(credential.is_expired(1_001));
}

#[test]
fn file_store_round_trips_and_clears() {
    let dir = std::env::temp_dir().join(format!("chat-session-{}", std::process::id()));
    let store = FileCredentialStore::new(&dir);

    assert_eq!(store.load_token().unwrap(), None);
    store.save_token("tok-123").unwrap();
    assert_eq!(store.load_token().unwrap(), Some("tok-123".to_string()));
    store.clear().unwrap();
    store.clear().unwrap();
    assert_eq!(store.load_token().unwrap(), None);

    let _ = std::fs::remove_dir_all(&dir);
}
