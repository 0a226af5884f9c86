use actix::Actor;
use actix_session::{config::PersistentSession, storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::{Key, SameSite};
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use env_logger::Env;
use huddle::notifications::{
    Dispatcher, FcmHttpProvider, NotificationQueue, PushProvider, RedisTokenStore, TokenStore,
};
use huddle::web::chat::server::ChatServer;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_lib_mods();
    huddle::app_config::init();

    let config = huddle::app_config::get_config();

    let redis_client =
        redis::Client::open(config.redis.url.as_str()).expect("Invalid redis.url in configuration.");

    let tokens: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::new(redis_client.clone()));
    let provider: Arc<dyn PushProvider> = Arc::new(FcmHttpProvider::new(&config.push));
    let dispatcher = Arc::new(Dispatcher::new(tokens.clone(), provider));
    let queue = Arc::new(NotificationQueue::new(
        redis_client,
        dispatcher,
        config.queue.clone(),
    ));

    // Drain the notification topic for the life of the process. The consumer
    // logs and continues on per-message failures; it never exits.
    actix_web::rt::spawn(queue.clone().run_consumer());

    let chat = ChatServer::new(config.chat.clone()).start();

    let secret_key = match std::env::var("SECRET_KEY") {
        Ok(key) => Key::from(key.as_bytes()),
        Err(err) => {
            let random_string: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(128)
                .map(char::from)
                .collect();
            log::warn!("SECRET_KEY was invalid. Reason: {:?}\r\nThis means the key used for signing session cookies will invalidate every time the application is restarted. A secret key must be at least 64 bytes to be accepted.\r\n\r\nNeed a key? How about:\r\n{}", err, random_string);
            Key::from(random_string.as_bytes())
        }
    };

    HttpServer::new(move || {
        // Order of middleware IS IMPORTANT and is in REVERSE EXECUTION ORDER.
        App::new()
            .app_data(Data::new(tokens.clone()))
            .app_data(Data::new(queue.clone()))
            .app_data(chat.clone())
            // Security headers - applied to all responses
            .wrap(
                DefaultHeaders::new()
                    .add((header::X_FRAME_OPTIONS, "DENY"))
                    .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
                    .add(("Referrer-Policy", "strict-origin-when-cross-origin")),
            )
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_same_site(SameSite::Lax)
                    .cookie_secure(false) // Allow HTTP for development
                    .session_lifecycle(PersistentSession::default())
                    .build(),
            )
            .wrap(Logger::new("%a %{User-Agent}i"))
            .configure(huddle::web::configure)
    })
    .bind(&huddle::app_config::server().bind)?
    .run()
    .await
}

/// Initialize third party crates we rely on but don't have control over.
fn init_lib_mods() {
    // This should be calls to crates without any transformative work applied.
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
}
