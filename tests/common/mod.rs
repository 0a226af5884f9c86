//! Shared test doubles for the notification pipeline
#![allow(dead_code)]

use async_trait::async_trait;
use huddle::notifications::{ProviderResponse, PushProvider, TokenStore};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory token store standing in for Redis.
pub struct MemoryTokenStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_token(user_id: &str, token: &str) -> Self {
        let store = Self::new();
        store
            .map
            .lock()
            .unwrap()
            .insert(user_id.to_string(), token.to_string());
        store
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_token(&self, user_id: &str, token: &str) -> anyhow::Result<()> {
        self.map
            .lock()
            .unwrap()
            .insert(user_id.to_string(), token.to_string());
        Ok(())
    }

    async fn get_token(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(user_id).cloned())
    }

    async fn delete_token(&self, user_id: &str) -> anyhow::Result<()> {
        self.map.lock().unwrap().remove(user_id);
        Ok(())
    }
}

/// Scripted provider behavior.
pub enum PushBehavior {
    Deliver,
    Unregistered,
    Fail,
}

/// Push provider double that records every payload it is asked to send.
pub struct MockProvider {
    pub behavior: PushBehavior,
    pub sent: Mutex<Vec<Value>>,
}

impl MockProvider {
    pub fn new(behavior: PushBehavior) -> Self {
        Self {
            behavior,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushProvider for MockProvider {
    async fn send(&self, payload: &Value) -> Result<ProviderResponse, anyhow::Error> {
        self.sent.lock().unwrap().push(payload.clone());
        match self.behavior {
            PushBehavior::Deliver => Ok(ProviderResponse::Delivered("pid-1".to_string())),
            PushBehavior::Unregistered => Ok(ProviderResponse::Unregistered),
            PushBehavior::Fail => Err(anyhow::anyhow!("provider offline")),
        }
    }
}
