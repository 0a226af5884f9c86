//! HTTP surface for the notification pipeline: delivery-token registration
//! and notification enqueue on behalf of the authenticated caller.

use crate::middleware::Identity;
use crate::notifications::{NotificationQueue, NotificationRequest, TokenStore};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(put_token)
        .service(post_notification)
        .service(view_health);
}

#[derive(Deserialize)]
pub struct TokenForm {
    pub token: String,
}

/// Register (or replace) the caller's push delivery token.
#[post("/notifications/token")]
pub async fn put_token(
    identity: Identity,
    tokens: web::Data<Arc<dyn TokenStore>>,
    form: web::Json<TokenForm>,
) -> Result<HttpResponse, Error> {
    let user_id = identity.require_login()?;

    tokens
        .set_token(&user_id, &form.token)
        .await
        .map_err(error::ErrorInternalServerError)?;

    Ok(HttpResponse::Ok().json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
pub struct NotificationForm {
    /// Defaults to the caller when absent.
    pub recipient_user_id: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Enqueue a notification. Pipeline failures past the enqueue point are
/// invisible to the caller by design; the queue falls back to direct
/// dispatch on broker trouble and logs the rest.
#[post("/notifications")]
pub async fn post_notification(
    identity: Identity,
    queue: web::Data<Arc<NotificationQueue>>,
    form: web::Json<NotificationForm>,
) -> Result<HttpResponse, Error> {
    let caller = identity.require_login()?;
    let form = form.into_inner();

    let request = NotificationRequest {
        user_id: form.recipient_user_id.unwrap_or(caller),
        title: form.title,
        body: form.body,
        data: form.data,
    };
    queue.enqueue(request).await;

    Ok(HttpResponse::Ok().json(json!({ "status": "queued" })))
}

#[get("/health")]
pub async fn view_health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
