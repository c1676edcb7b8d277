use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{require_admin, AuthService};
use crate::blocked_slots::BlockedSlotService;
use crate::error::ApiError;
use crate::models::BlockedSlotInput;

/// Mounted under `/appointments`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/blocked", web::get().to(list))
        .route("/blocked", web::post().to(create))
        .route("/blocked/{id}", web::delete().to(delete));
}

async fn list(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    blocked: web::Data<BlockedSlotService>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(blocked.list().await?))
}

async fn create(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    blocked: web::Data<BlockedSlotService>,
    body: web::Json<BlockedSlotInput>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(blocked.create(body.into_inner()).await?))
}

async fn delete(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    blocked: web::Data<BlockedSlotService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    blocked.delete(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
