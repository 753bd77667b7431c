use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::{UserId, UserProfile};
use tracing::{info, warn};

use crate::error::CredentialError;

/// Identity payload embedded in the signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(alias = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl SessionUser {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user: SessionUser,
    pub exp: i64,
}

/// Signed token plus its decoded payload. The identity snapshot is
/// immutable; a profile update replaces the whole credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub claims: Claims,
}

impl Credential {
    /// Decodes without verifying the signature: the server signs, the
    /// client only reads back the token it was issued. Expiry is
    /// enforced locally, not by the decoder.
    pub fn decode(token: &str) -> Result<Self, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data =
            jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
                .map_err(CredentialError::Malformed)?;

        Ok(Self {
            token: token.to_string(),
            claims: data.claims,
        })
    }

    /// Pure expiry comparison: valid iff `exp` is strictly in the
    /// future of `now` (seconds since epoch).
    pub fn is_expired(&self, now: i64) -> bool {
        self.claims.exp <= now
    }

    pub fn user(&self) -> &SessionUser {
        &self.claims.user
    }
}

/// Durable home of the raw token string. One key; absence means
/// signed out.
pub trait CredentialStore: Send + Sync {
    fn load_token(&self) -> Result<Option<String>>;
    fn save_token(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Token persisted as a single file under the state directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join("credential.jwt"),
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load_token(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| {
                format!("failed to read credential file {}", self.path.display())
            }),
        }
    }

    fn save_token(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create state directory {}", parent.display())
            })?;
        }
        fs::write(&self.path, token).with_context(|| {
            format!("failed to write credential file {}", self.path.display())
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("failed to remove credential file {}", self.path.display())
            }),
        }
    }
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Result<Option<String>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn save_token(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

/// Owns the current credential: loads and validates the persisted
/// token, persists fresh ones, clears on sign-out or when a stale
/// token is found on disk.
pub struct SessionStore {
    store: Box<dyn CredentialStore>,
}

impl SessionStore {
    pub fn new(store: Box<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Loads the persisted credential. A malformed or expired token is
    /// cleared from durable storage and reported as signed out.
    pub fn load(&self) -> Result<Option<Credential>> {
        let Some(token) = self.store.load_token()? else {
            return Ok(None);
        };

        let credential = match Credential::decode(&token) {
            Ok(credential) => credential,
            Err(err) => {
                warn!("discarding persisted credential: {err}");
                self.store.clear()?;
                return Ok(None);
            }
        };

        if credential.is_expired(Utc::now().timestamp()) {
            info!(
                user_id = credential.user().id.as_str(),
                "persisted credential has expired; clearing"
            );
            self.store.clear()?;
            return Ok(None);
        }

        Ok(Some(credential))
    }

    /// Decodes and persists a freshly issued token.
    pub fn save(&self, token: &str) -> Result<Credential> {
        let credential = Credential::decode(token)?;
        self.store.save_token(token)?;
        Ok(credential)
    }

    /// Idempotent removal of the persisted credential.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
