use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::error::ApiError;
use tracing::info;

use crate::error::SyncError;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct MsgBody {
    msg: String,
}

/// Credential-issuance collaborator: the two HTTP endpoints that
/// mint signed tokens. Rejections surface the server's own message.
pub struct AuthClient {
    http: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, SyncError> {
        let response = self
            .http
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let token = Self::token_or_rejection(response, "Login failed").await?;
        info!("signed in via /auth/login");
        Ok(token)
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        avatar: Option<&str>,
    ) -> Result<String, SyncError> {
        let response = self
            .http
            .post(format!("{}/auth/register", self.base_url))
            .json(&RegisterRequest {
                email,
                password,
                name,
                avatar,
            })
            .send()
            .await?;
        let token = Self::token_or_rejection(response, "Registration failed").await?;
        info!("registered via /auth/register");
        Ok(token)
    }

    async fn token_or_rejection(
        response: reqwest::Response,
        fallback: &str,
    ) -> Result<String, SyncError> {
        if response.status().is_success() {
            let body: TokenResponse = response.json().await?;
            return Ok(body.token);
        }

        // Error bodies come as either {code, message} or a bare {msg}.
        let raw = response.text().await.unwrap_or_default();
        let msg = serde_json::from_str::<ApiError>(&raw)
            .map(|body| body.message)
            .or_else(|_| serde_json::from_str::<MsgBody>(&raw).map(|body| body.msg))
            .unwrap_or_else(|_| fallback.to_string());
        Err(SyncError::ServerRejected(msg))
    }
}
