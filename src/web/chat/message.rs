//! Actor and wire message types for the realtime session hub.
//!
//! Wire events travel as JSON text frames shaped `{"event": ..., "data": ...}`.
//! Event names are part of the client contract and mix conventions
//! (`join chat` vs `location-update`); the serde renames pin them exactly.

use actix::prelude::*;
use serde::{Deserialize, Serialize};

/// A user reference as the client presents it at `setup` and inside
/// message payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Chat object embedded in a relayed message. `users` is optional so a
/// malformed payload deserializes and can be rejected with a log line
/// instead of dropping the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub users: Option<Vec<UserRef>>,
}

/// Fully-populated message object, relayed verbatim to participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: UserRef,
    pub chat: ChatRef,
}

/// Raw geolocation sample as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPing {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: f64,
}

/// Current location of one user. One sample per user identity; overwritten
/// on every update, no history retained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSample {
    pub user_id: String,
    pub user_name: String,
    pub lat: f64,
    pub lng: f64,
    pub accuracy: f64,
    /// Server-side timestamp, milliseconds.
    pub timestamp: i64,
    /// Connection that produced the sample. Internal bookkeeping for the
    /// disconnect grace period; not part of the wire payload.
    #[serde(skip, default)]
    pub connection_id: usize,
}

/// Client -> server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "setup")]
    Setup(UserRef),
    #[serde(rename = "join chat")]
    JoinChat(String),
    #[serde(rename = "typing")]
    Typing(String),
    #[serde(rename = "stop typing")]
    StopTyping(String),
    #[serde(rename = "new message")]
    NewMessage(ChatMessage),
    #[serde(rename = "location-update")]
    LocationUpdate(LocationPing),
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "typing")]
    Typing(String),
    #[serde(rename = "stop typing")]
    StopTyping(String),
    #[serde(rename = "message received")]
    MessageReceived(ChatMessage),
    #[serde(rename = "location-update")]
    LocationUpdate(PresenceSample),
    #[serde(rename = "initial-locations")]
    InitialLocations(Vec<PresenceSample>),
    #[serde(rename = "user-disconnected")]
    UserDisconnected(String),
}

// -- Actor messages ---------------------------------------------------------

/// Pre-serialized server event pushed out to one connection.
#[derive(Debug, Clone)]
pub struct Reply(pub String);

impl Message for Reply {
    type Result = ();
}

/// New connection registering with the hub.
pub struct Connect {
    pub addr: Recipient<Reply>,
}

impl Message for Connect {
    /// Returns the connection id.
    type Result = usize;
}

/// Transport-level disconnect.
pub struct Disconnect {
    pub id: usize,
}

impl Message for Disconnect {
    type Result = ();
}

/// Associate a connection with a user identity and join its user room.
pub struct Setup {
    pub id: usize,
    pub user: UserRef,
}

impl Message for Setup {
    type Result = ();
}

/// Join a chat room. Authorization happened at the HTTP layer when the chat
/// was fetched; the hub does not re-check membership.
pub struct JoinChat {
    pub id: usize,
    pub chat_id: String,
}

impl Message for JoinChat {
    type Result = ();
}

/// Typing indicator relay. `started` distinguishes typing from stop-typing.
pub struct Typing {
    pub id: usize,
    pub chat_id: String,
    pub started: bool,
}

impl Message for Typing {
    type Result = ();
}

/// Relay a freshly-sent message to every participant's user room except the
/// sender's.
pub struct RelayMessage {
    pub id: usize,
    pub message: ChatMessage,
}

impl Message for RelayMessage {
    type Result = ();
}

/// Location sample from a connection.
pub struct LocationUpdate {
    pub id: usize,
    pub ping: LocationPing,
}

impl Message for LocationUpdate {
    type Result = ();
}
