use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::{require_admin, AuthService};
use crate::error::ApiError;
use crate::messages::MessageService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/admin/chat", web::get().to(list))
        .route("/admin/chat", web::post().to(send));
}

#[derive(Debug, Deserialize)]
struct NewMessage {
    #[serde(default)]
    content: String,
}

async fn list(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    messages: web::Data<MessageService>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(messages.list().await?))
}

async fn send(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    messages: web::Data<MessageService>,
    body: web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    let admin = require_admin(&req, &auth_service).await?;
    let message = messages.send(&admin, &body.content).await?;
    Ok(HttpResponse::Ok().json(message))
}
