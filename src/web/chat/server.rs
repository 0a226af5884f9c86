//! `ChatServer` manages rooms and coordinates realtime sessions: user rooms
//! (named by user identity, one per authenticated user, holding all of that
//! user's active connections), chat rooms (named by chat identifier), typing
//! relay, message fan-out, and live-location presence.
//!
//! All state lives in this actor; mailbox serialization makes broadcast order
//! per-room deterministic without locks. There is no ordering guarantee
//! across rooms, nor between this relay and the push notification path for
//! the same message.

use super::message::{self, PresenceSample, ServerEvent};
use crate::app_config::ChatConfig;
use actix::prelude::*;
use rand::{self, rngs::ThreadRng, Rng};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A registered connection. Identity is set once `setup` arrives.
pub struct Connection {
    pub recipient: Recipient<message::Reply>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
}

pub struct ChatServer {
    rng: ThreadRng,
    config: ChatConfig,

    /// Random Id -> Recipient Addr
    connections: HashMap<usize, Connection>,
    /// Room name -> Conn Ids. Rooms are ephemeral: created on first join,
    /// pruned when empty.
    rooms: HashMap<String, HashSet<usize>>,
    /// User Id -> last-known location sample
    presence: HashMap<String, PresenceSample>,
}

impl ChatServer {
    pub fn new(config: ChatConfig) -> Self {
        log::info!("Chat actor starting up.");

        Self {
            rng: rand::thread_rng(),
            config,
            connections: HashMap::new(),
            rooms: HashMap::new(),
            presence: HashMap::new(),
        }
    }

    fn join_room(&mut self, room: &str, id: usize) {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(HashSet::new)
            .insert(id);
    }

    fn leave_room(&mut self, room: &str, id: usize) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    /// Send an event to a specific connection.
    fn send_to_conn(&self, recipient: usize, event: &ServerEvent) {
        if let Some(conn) = self.connections.get(&recipient) {
            conn.recipient.do_send(message::Reply(
                serde_json::to_string(event).expect("ServerEvent serialize failure"),
            ));
        }
    }

    /// Send an event to all members of a room, optionally excluding one
    /// connection (the emitter of a relayed event).
    fn send_to_room(&self, room: &str, event: &ServerEvent, except: Option<usize>) {
        if let Some(members) = self.rooms.get(room) {
            let body = serde_json::to_string(event).expect("ServerEvent serialize failure");
            for id in members {
                if Some(*id) == except {
                    continue;
                }
                if let Some(conn) = self.connections.get(id) {
                    conn.recipient.do_send(message::Reply(body.to_owned()));
                }
            }
        }
    }

    /// Send an event to every connection, optionally excluding the origin.
    fn broadcast(&self, event: &ServerEvent, except: Option<usize>) {
        let body = serde_json::to_string(event).expect("ServerEvent serialize failure");
        for (id, conn) in &self.connections {
            if Some(*id) == except {
                continue;
            }
            conn.recipient.do_send(message::Reply(body.to_owned()));
        }
    }

    /// Grace timer fired. If the user room has members again the user
    /// reconnected and the pending eviction is stale; otherwise drop the
    /// sample and announce the departure.
    fn evict_if_absent(&mut self, user_id: &str) {
        if self.rooms.get(user_id).map_or(false, |r| !r.is_empty()) {
            log::debug!("User {} rejoined within grace period, keeping presence", user_id);
            return;
        }

        if self.presence.remove(user_id).is_some() {
            log::debug!("Presence evicted for user {}", user_id);
            self.broadcast(&ServerEvent::UserDisconnected(user_id.to_string()), None);
        }
    }
}

/// Make actor from `ChatServer`
impl Actor for ChatServer {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(32);
    }
}

/// Handler for Connect message.
///
/// Register new session and assign unique id to this session
impl Handler<message::Connect> for ChatServer {
    type Result = usize;

    fn handle(&mut self, msg: message::Connect, _: &mut Context<Self>) -> Self::Result {
        let id = self.rng.gen::<usize>();
        self.connections.insert(
            id,
            Connection {
                recipient: msg.addr,
                user_id: None,
                user_name: None,
            },
        );
        id
    }
}

/// Handler for Setup: join the user room, record identity, acknowledge, and
/// hand the new session the current presence snapshot.
impl Handler<message::Setup> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::Setup, _: &mut Context<Self>) {
        let message::Setup { id, user } = msg;

        // Last setup wins: a re-association leaves the prior user room so no
        // stale membership lingers.
        if let Some(prev) = self.connections.get(&id).and_then(|c| c.user_id.clone()) {
            if prev != user.id {
                self.leave_room(&prev, id);
            }
        }

        match self.connections.get_mut(&id) {
            Some(conn) => {
                conn.user_id = Some(user.id.clone());
                conn.user_name = Some(user.name.clone());
            }
            None => return,
        }

        self.join_room(&user.id, id);
        log::debug!("Connection {} set up as user {}", id, user.id);

        // A sample retained across a grace-window rejoin is adopted by the
        // new connection; otherwise a later disconnect would never schedule
        // its eviction.
        if let Some(sample) = self.presence.get_mut(&user.id) {
            sample.connection_id = id;
        }

        self.send_to_conn(id, &ServerEvent::Connected);

        let samples: Vec<PresenceSample> = self.presence.values().cloned().collect();
        self.send_to_conn(id, &ServerEvent::InitialLocations(samples));
    }
}

/// Handler for JoinChat. Membership is a set, so repeated joins are no-ops.
impl Handler<message::JoinChat> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::JoinChat, _: &mut Context<Self>) {
        self.join_room(&msg.chat_id, msg.id);
    }
}

/// Typing indicators are relay-only: every other member of the chat room
/// hears them, the emitter does not. No state retained.
impl Handler<message::Typing> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::Typing, _: &mut Context<Self>) {
        let event = if msg.started {
            ServerEvent::Typing(msg.chat_id.clone())
        } else {
            ServerEvent::StopTyping(msg.chat_id.clone())
        };
        self.send_to_room(&msg.chat_id, &event, Some(msg.id));
    }
}

/// Best-effort, at-most-once fan-out of a new message to each participant's
/// user room, skipping the sender. Redundant with the push pipeline by
/// design; this is the low-latency path for connected clients.
impl Handler<message::RelayMessage> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::RelayMessage, _: &mut Context<Self>) {
        let users = match &msg.message.chat.users {
            Some(users) => users.clone(),
            None => {
                log::warn!(
                    "Message {} in chat {} has no participant list, relay skipped",
                    msg.message.id,
                    msg.message.chat.id
                );
                return;
            }
        };

        for user in users {
            if user.id == msg.message.sender.id {
                continue;
            }
            self.send_to_room(
                &user.id,
                &ServerEvent::MessageReceived(msg.message.clone()),
                None,
            );
        }
    }
}

/// Handler for LocationUpdate: overwrite the user's sample with a
/// server-side timestamp and rebroadcast to everyone but the origin.
impl Handler<message::LocationUpdate> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::LocationUpdate, _: &mut Context<Self>) {
        let (user_id, user_name) = match self.connections.get(&msg.id) {
            Some(conn) => match &conn.user_id {
                Some(user_id) => (
                    user_id.clone(),
                    conn.user_name.clone().unwrap_or_default(),
                ),
                None => {
                    log::warn!("Location update from connection {} before setup, ignored", msg.id);
                    return;
                }
            },
            None => return,
        };

        let sample = PresenceSample {
            user_id: user_id.clone(),
            user_name,
            lat: msg.ping.lat,
            lng: msg.ping.lng,
            accuracy: msg.ping.accuracy,
            timestamp: chrono::Utc::now().timestamp_millis(),
            connection_id: msg.id,
        };

        self.presence.insert(user_id, sample.clone());
        self.broadcast(&ServerEvent::LocationUpdate(sample), Some(msg.id));
    }
}

/// Handler for Disconnect message.
///
/// Removes the connection from every room. If it owned a presence sample,
/// eviction is deferred by the grace period to absorb transient drops; the
/// timer re-checks user-room membership instead of holding a cancel handle.
impl Handler<message::Disconnect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: message::Disconnect, ctx: &mut Context<Self>) {
        let user_id = self
            .connections
            .get(&msg.id)
            .and_then(|c| c.user_id.clone());

        self.rooms.retain(|_, members| {
            members.remove(&msg.id);
            !members.is_empty()
        });
        self.connections.remove(&msg.id);

        if let Some(user_id) = user_id {
            let owns_sample = self
                .presence
                .get(&user_id)
                .map_or(false, |s| s.connection_id == msg.id);
            if owns_sample {
                let grace = Duration::from_millis(self.config.presence_grace_ms);
                ctx.run_later(grace, move |actor, _ctx| actor.evict_if_absent(&user_id));
            }
        }
    }
}

impl Supervised for ChatServer {
    fn restarting(&mut self, _: &mut Context<ChatServer>) {
        log::warn!("Restarting the ChatServer.");
    }
}
