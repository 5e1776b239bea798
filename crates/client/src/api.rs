//! HTTP client for the REST API: auth, profiles and chat history.

use std::sync::{Arc, Mutex};

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;

use anochat_shared::{
    ApiError, AuthResponse, LoginRequest, MessagesPage, RegisterRequest, UserProfile,
};

use crate::lock;

/// REST API client with bearer-token authorization.
///
/// The token is captured from login/register responses and attached to
/// every subsequent request; a 401 response drops it again so the caller
/// knows to re-authenticate.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<Mutex<Option<String>>>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.token).clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *lock(&self.token) = token;
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    async fn request<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&TReq>,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        let mut builder = self.client.request(method, &url);
        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if status == 401 {
            // The stored token is no longer valid.
            self.set_token(None);
        }
        if !(200..300).contains(&status) {
            return Err(ApiError::Http { status, body: text });
        }

        let payload = if text.is_empty() { "null" } else { &text };
        serde_json::from_str(payload).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.request::<(), TRes>(Method::GET, path, None).await
    }

    async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    // --- Auth ---

    /// Register a new account. Stores the returned token.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let auth: AuthResponse = self.post_json("/auth/register", request).await?;
        self.set_token(Some(auth.token.clone()));
        Ok(auth)
    }

    /// Log in with a telegram id. Stores the returned token.
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let auth: AuthResponse = self.post_json("/auth/login", request).await?;
        self.set_token(Some(auth.token.clone()));
        Ok(auth)
    }

    /// Invalidate the current session server-side and drop the token.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json("/auth/logout", &serde_json::json!({})).await?;
        self.set_token(None);
        Ok(())
    }

    // --- Users ---

    pub async fn get_profile(&self, telegram_id: i64) -> Result<UserProfile, ApiError> {
        self.get_json(&format!("/users/{telegram_id}")).await
    }

    // --- Chats ---

    /// Fetch one page of a chat's message history.
    pub async fn chat_messages(
        &self,
        chat_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagesPage, ApiError> {
        self.get_json(&format!("/chats/{chat_id}/messages?page={page}&limit={limit}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let api = ApiClient::new("https://anochat.app/rest_api/api/");
        assert_eq!(
            api.url("/auth/login"),
            "https://anochat.app/rest_api/api/auth/login"
        );
        assert_eq!(
            api.url("users/7"),
            "https://anochat.app/rest_api/api/users/7"
        );
    }

    #[test]
    fn token_is_shared_across_clones() {
        let api = ApiClient::new("http://localhost");
        let clone = api.clone();
        api.set_token(Some("t1".to_string()));
        assert_eq!(clone.token().as_deref(), Some("t1"));
    }
}
