use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use crate::auth::{extract_user, AuthService};
use crate::error::ApiError;
use crate::push::{PushService, SubscribeRequest};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .route("/vapid-public-key", web::get().to(public_key))
            .route("/subscribe", web::post().to(subscribe))
            .route("/unsubscribe", web::post().to(unsubscribe)),
    );
}

async fn public_key(push: web::Data<PushService>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "publicKey": push.public_key() }))
}

async fn subscribe(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    push: web::Data<PushService>,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = extract_user(&req, &auth_service).await?;
    let body = body.into_inner();
    let subscription = body
        .subscription
        .ok_or_else(|| ApiError::bad_request("Subscription is required"))?;

    push.subscribe(user.id, subscription, body.barber_id).await?;
    Ok(HttpResponse::Ok().finish())
}

/// The body is the bare endpoint URL, optionally JSON-quoted.
async fn unsubscribe(push: web::Data<PushService>, body: String) -> Result<HttpResponse, ApiError> {
    let endpoint = serde_json::from_str::<String>(&body).unwrap_or(body);
    if endpoint.trim().is_empty() {
        return Err(ApiError::bad_request("Endpoint is required"));
    }
    push.unsubscribe(&endpoint).await?;
    Ok(HttpResponse::Ok().finish())
}
