use actix_web::{web, HttpRequest, HttpResponse};
use log::{error, info};
use serde_json::json;

use crate::auth::{extract_user, optional_user, AuthService};
use crate::error::ApiError;
use crate::models::{LoginCredentials, Role, SignupRequest};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/signin", web::post().to(signin))
            .route("/signup", web::post().to(signup))
            .route("/me", web::get().to(me)),
    );
}

async fn signin(
    auth_service: web::Data<AuthService>,
    credentials: web::Json<LoginCredentials>,
) -> Result<HttpResponse, ApiError> {
    info!("Received login request for: {}", credentials.username);
    let response = auth_service.signin(credentials.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn signup(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    body: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller_is_admin = optional_user(&req, &auth_service)
        .await
        .is_some_and(|u| u.role == Role::Admin);

    match auth_service.signup(body.into_inner(), caller_is_admin).await {
        Ok(user) => Ok(HttpResponse::Ok().json(json!({
            "message": "User registered successfully!",
            "user": user
        }))),
        Err(e) => {
            error!("Registration failed: {:#}", e);
            Err(e.into())
        }
    }
}

async fn me(req: HttpRequest, auth_service: web::Data<AuthService>) -> Result<HttpResponse, ApiError> {
    let user = extract_user(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(user))
}
