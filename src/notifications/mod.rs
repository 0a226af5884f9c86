//! Push notification pipeline: token cache, dispatcher, and queue bridge.
//!
//! The realtime relay in [`crate::web::chat`] is the low-latency path for
//! currently-connected clients; this pipeline guarantees eventual delivery
//! via push even when the recipient has no open connection. The two paths
//! share no delivery-confirmation state; the message identifier is the
//! client-side de-duplication key.

pub mod dispatcher;
pub mod queue;
pub mod token_cache;
pub mod types;

pub use dispatcher::{DispatchError, Dispatcher, FcmHttpProvider, ProviderResponse, PushProvider};
pub use queue::NotificationQueue;
pub use token_cache::{RedisTokenStore, TokenStore};
pub use types::{NotificationKind, NotificationRequest};
