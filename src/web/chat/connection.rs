//! WebSocket connection actor for realtime chat clients

use super::message::{self, ClientEvent};
use super::server::ChatServer;
use super::{CLIENT_TIMEOUT, HEARTBEAT_INTERVAL};
use actix::*;
use actix_web_actors::ws;
use std::time::Instant;

/// Represents a single WebSocket connection to the session hub
pub struct Connection {
    /// Connection ID (assigned by the hub)
    pub id: usize,
    /// Last heartbeat timestamp
    pub hb: Instant,
    /// Address of the session hub
    pub server: Addr<ChatServer>,
}

impl Connection {
    pub fn new(server: Addr<ChatServer>) -> Self {
        Self {
            id: 0,
            hb: Instant::now(),
            server,
        }
    }

    /// Start heartbeat process
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::debug!("Chat connection {} timed out", act.id);
                act.server.do_send(message::Disconnect { id: act.id });
                ctx.stop();
                return;
            }

            ctx.ping(b"");
        });
    }

    /// Register with the hub and start heartbeat
    fn start_connection(&self, ctx: &mut ws::WebsocketContext<Self>) {
        self.hb(ctx);

        self.server
            .send(message::Connect {
                addr: ctx.address().recipient(),
            })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(id) => {
                        act.id = id;
                        log::debug!("Chat connection established: id={}", id);
                    }
                    Err(err) => {
                        log::warn!("Failed to register chat connection: {:?}", err);
                        ctx.stop();
                    }
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    /// Route one parsed client event to the hub.
    fn dispatch_event(&self, event: ClientEvent) {
        let id = self.id;
        match event {
            ClientEvent::Setup(user) => self.server.do_send(message::Setup { id, user }),
            ClientEvent::JoinChat(chat_id) => {
                self.server.do_send(message::JoinChat { id, chat_id })
            }
            ClientEvent::Typing(chat_id) => self.server.do_send(message::Typing {
                id,
                chat_id,
                started: true,
            }),
            ClientEvent::StopTyping(chat_id) => self.server.do_send(message::Typing {
                id,
                chat_id,
                started: false,
            }),
            ClientEvent::NewMessage(msg) => {
                self.server.do_send(message::RelayMessage { id, message: msg })
            }
            ClientEvent::LocationUpdate(ping) => {
                self.server.do_send(message::LocationUpdate { id, ping })
            }
        }
    }
}

impl Actor for Connection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_connection(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.server.do_send(message::Disconnect { id: self.id });
        Running::Stop
    }
}

/// Handle events pushed from the hub
impl Handler<message::Reply> for Connection {
    type Result = ();

    fn handle(&mut self, msg: message::Reply, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

/// Handle incoming WebSocket frames
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for Connection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        let msg = match msg {
            Err(_) => {
                ctx.stop();
                return;
            }
            Ok(msg) => msg,
        };

        match msg {
            ws::Message::Ping(data) => {
                self.hb = Instant::now();
                ctx.pong(&data);
            }
            ws::Message::Pong(_) => {
                self.hb = Instant::now();
            }
            ws::Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => self.dispatch_event(event),
                Err(err) => {
                    // Malformed payloads are dropped; the connection stays open.
                    log::debug!("Unparseable chat frame from {}: {}", self.id, err);
                }
            },
            ws::Message::Binary(_) => {
                // Ignore binary messages
            }
            ws::Message::Close(reason) => {
                log::debug!("Chat client disconnecting: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Continuation(_) => {
                ctx.stop();
            }
            ws::Message::Nop => (),
        }
    }
}
