//! Notification dispatcher: resolves a recipient's delivery token and issues
//! a single push-provider send. Invalid tokens are evicted from the cache so
//! subsequent dispatches short-circuit.

use super::token_cache::TokenStore;
use super::types::NotificationRequest;
use crate::app_config::PushConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Outcome of a single provider send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Accepted; carries the provider message identifier.
    Delivered(String),
    /// The token is invalid or no longer registered with the provider.
    Unregistered,
}

/// Dispatch failure classification.
///
/// `Unregistered` means the cached token was evicted and the caller should
/// not retry with it. Everything else is `Provider` and leaves the token in
/// place, since transient failures must not evict a potentially-valid token.
#[derive(Debug, derive_more::Display)]
pub enum DispatchError {
    #[display(fmt = "delivery token is no longer registered")]
    Unregistered,
    #[display(fmt = "push provider failure: {}", _0)]
    Provider(String),
}

impl std::error::Error for DispatchError {}

/// Outbound push delivery seam.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(&self, payload: &Value) -> Result<ProviderResponse, anyhow::Error>;
}

/// FCM legacy HTTP provider.
pub struct FcmHttpProvider {
    http: reqwest::Client,
    api_url: String,
    server_key: String,
}

impl FcmHttpProvider {
    pub fn new(config: &PushConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            server_key: config.server_key.clone(),
        }
    }
}

#[async_trait]
impl PushProvider for FcmHttpProvider {
    async fn send(&self, payload: &Value) -> Result<ProviderResponse, anyhow::Error> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            anyhow::bail!("provider returned {}: {}", status, body);
        }

        // Legacy send responses carry per-token results.
        let result = body
            .get("results")
            .and_then(|r| r.get(0))
            .cloned()
            .unwrap_or_default();

        if let Some(error) = result.get("error").and_then(Value::as_str) {
            if error == "NotRegistered" || error == "InvalidRegistration" {
                return Ok(ProviderResponse::Unregistered);
            }
            anyhow::bail!("provider error: {}", error);
        }

        let message_id = result
            .get("message_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(ProviderResponse::Delivered(message_id))
    }
}

pub struct Dispatcher {
    tokens: Arc<dyn TokenStore>,
    provider: Arc<dyn PushProvider>,
    push: PushConfig,
}

impl Dispatcher {
    pub fn new(tokens: Arc<dyn TokenStore>, provider: Arc<dyn PushProvider>) -> Self {
        Self {
            tokens,
            provider,
            push: crate::app_config::push(),
        }
    }

    /// Dispatch one notification request.
    ///
    /// Returns `Ok(None)` when the recipient has no cached token (logged,
    /// not an error), `Ok(Some(id))` on a successful send, and an error
    /// otherwise. There is no retry on the request itself.
    pub async fn dispatch(
        &self,
        request: &NotificationRequest,
    ) -> Result<Option<String>, DispatchError> {
        let token = self
            .tokens
            .get_token(&request.user_id)
            .await
            .map_err(|e| DispatchError::Provider(format!("token lookup failed: {}", e)))?;

        let token = match token {
            Some(token) => token,
            None => {
                log::info!(
                    "No delivery token for user {}, skipping notification",
                    request.user_id
                );
                return Ok(None);
            }
        };

        let payload = build_payload(request, &token, &self.push);

        match self.provider.send(&payload).await {
            Ok(ProviderResponse::Delivered(message_id)) => {
                log::debug!(
                    "Push delivered to user {} (provider id {})",
                    request.user_id,
                    message_id
                );
                Ok(Some(message_id))
            }
            Ok(ProviderResponse::Unregistered) => {
                log::info!(
                    "Provider reports unregistered token for user {}, evicting",
                    request.user_id
                );
                if let Err(e) = self.tokens.delete_token(&request.user_id).await {
                    log::warn!("Failed to evict token for user {}: {}", request.user_id, e);
                }
                Err(DispatchError::Unregistered)
            }
            Err(e) => Err(DispatchError::Provider(e.to_string())),
        }
    }
}

/// Build the provider payload for one request.
///
/// The provider requires homogeneous data types, so every data field is
/// coerced to a string; numbers and objects are stringified.
pub fn build_payload(request: &NotificationRequest, token: &str, push: &PushConfig) -> Value {
    let mut data = serde_json::Map::new();
    for (key, value) in &request.data {
        data.insert(key.clone(), Value::String(stringify(value)));
    }
    // Correlation fields are always present, even when the caller omits them.
    for (key, default) in [("chatId", ""), ("messageId", ""), ("type", "message")] {
        data.entry(key.to_string())
            .or_insert_with(|| Value::String(default.to_string()));
    }

    let chat_id = data["chatId"].as_str().unwrap_or_default().to_string();
    let click_action = if chat_id.is_empty() {
        "/".to_string()
    } else {
        format!("/chat/{}", chat_id)
    };

    json!({
        "to": token,
        "notification": {
            "title": request.title,
            "body": request.body,
        },
        "data": data,
        "webpush": {
            "headers": { "Urgency": "high" },
            "notification": {
                "title": request.title,
                "body": request.body,
                "icon": push.icon,
                "badge": push.badge,
                "vibrate": [200, 100, 200],
                "requireInteraction": true,
            },
            "fcm_options": { "link": click_action },
        },
        "android": { "priority": "high" },
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
