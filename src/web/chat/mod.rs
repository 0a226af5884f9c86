pub mod connection;
pub mod message;
pub mod server;

use crate::middleware::Identity;
use actix::Addr;
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Duration;

/// How often heartbeat pings are sent
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// How long before lack of client response causes a timeout
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_chat_socket);
}

/// Entry point for our websocket route.
///
/// The session hub does not authorize chat membership; identity is required
/// here and the client declares it again in its `setup` event.
#[get("/chat.ws")]
pub async fn view_chat_socket(
    identity: Identity,
    req: HttpRequest,
    stream: web::Payload,
) -> Result<HttpResponse, Error> {
    identity.require_login()?;

    let addr = req
        .app_data::<Addr<server::ChatServer>>()
        .expect("No chat server.")
        .clone();

    ws::start(connection::Connection::new(addr), &req, stream)
}
