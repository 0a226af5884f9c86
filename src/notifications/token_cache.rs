//! Delivery token cache backed by Redis.
//!
//! Maps a user identity to their current push delivery token. At most one
//! token per user; last write wins. Multi-device fan-out is not supported.

use async_trait::async_trait;

/// Storage seam for delivery tokens.
///
/// Absence of a token is an explicit `None`, never an error. Callers must
/// treat absence as "cannot notify this user" and skip silently.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn set_token(&self, user_id: &str, token: &str) -> anyhow::Result<()>;
    async fn get_token(&self, user_id: &str) -> anyhow::Result<Option<String>>;
    /// Invoked only by the dispatcher on provider-reported invalidation.
    async fn delete_token(&self, user_id: &str) -> anyhow::Result<()>;
}

fn token_key(user_id: &str) -> String {
    format!("user:{}:push_token", user_id)
}

/// Production token store over a shared Redis instance. No expiry is set;
/// tokens persist until explicitly replaced or deleted.
pub struct RedisTokenStore {
    client: redis::Client,
}

impl RedisTokenStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn set_token(&self, user_id: &str, token: &str) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.set(token_key(user_id), token).await?;
        Ok(())
    }

    async fn get_token(&self, user_id: &str) -> anyhow::Result<Option<String>> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_async_connection().await?;
        let token: Option<String> = conn.get(token_key(user_id)).await?;
        Ok(token)
    }

    async fn delete_token(&self, user_id: &str) -> anyhow::Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.del(token_key(user_id)).await?;
        Ok(())
    }
}
