use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{AuthResponse, LoginCredentials, Role, SignupRequest, User};
use actix_web::{web, HttpRequest};
use anyhow::{anyhow, Result};
use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

pub const USER_COLUMNS: &str = "id, name, first_name, phone, email, username, password, role, \
     total_appointments, available_rewards, used_rewards";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i64,  // user id
    role: Role,
    exp: i64,  // expiration timestamp
}

pub struct AuthService {
    pool: SqlitePool,
    secret: String,
    ttl_hours: i64,
    hash_cost: u32,
}

impl AuthService {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        Self {
            pool,
            secret: config.jwt_secret.clone(),
            ttl_hours: config.jwt_ttl_hours,
            hash_cost: config.bcrypt_cost,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        Ok(hash(password.as_bytes(), self.hash_cost)?)
    }

    /// Creates an account. Only an admin caller may create another admin.
    pub async fn signup(&self, req: SignupRequest, caller_is_admin: bool) -> Result<User> {
        let username = req.username.trim();
        if username.is_empty() || req.password.is_empty() || req.name.trim().is_empty() {
            return Err(ApiError::bad_request("Username, password and name are required").into());
        }

        if self.find_by_username(username).await?.is_some() {
            error!("Username {} already taken", username);
            return Err(ApiError::bad_request("Error: Username is already taken!").into());
        }

        let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        if let Some(email) = email {
            let taken = sqlx::query_as::<_, (i64,)>("SELECT id FROM users WHERE email = ? LIMIT 1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            if taken.is_some() {
                return Err(ApiError::bad_request("Error: Email is already in use!").into());
            }
        }

        let wants_admin = req.role.iter().any(|r| r.eq_ignore_ascii_case("admin"));
        let role = if wants_admin && caller_is_admin {
            Role::Admin
        } else {
            Role::Client
        };

        let hashed_password = self.hash_password(&req.password)?;

        info!("Creating new {:?} account: {}", role, username);
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, phone, email, username, password, role)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(req.name.trim())
        .bind(req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .bind(email)
        .bind(username)
        .bind(hashed_password)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn signin(&self, creds: LoginCredentials) -> Result<AuthResponse> {
        info!("Attempting login for user: {}", creds.username);

        let user = self
            .find_by_username(creds.username.trim())
            .await?
            .ok_or_else(|| {
                error!("User not found: {}", creds.username);
                ApiError::unauthorized("Invalid username or password")
            })?;

        let Some(stored) = user.password.as_deref() else {
            error!("User {} has no password (guest account)", creds.username);
            return Err(ApiError::unauthorized("Invalid username or password").into());
        };

        if !verify(creds.password.as_bytes(), stored)? {
            error!("Invalid password for user: {}", creds.username);
            return Err(ApiError::unauthorized("Invalid username or password").into());
        }

        let token = self.create_token(&user)?;
        info!("User logged in successfully: {}", creds.username);
        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            id: user.id,
            username: user.username.clone().unwrap_or_default(),
            email: user.email.clone(),
            roles: vec![role_authority(user.role)],
            name: user.name,
            available_rewards: user.available_rewards,
        })
    }

    pub async fn validate_token(&self, token: &str) -> Result<User> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )?
        .claims;

        let user = self
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| anyhow!("User not found"))?;

        // A demoted account must not keep its old privileges.
        if user.role != claims.role {
            return Err(anyhow!("Token invalid: role has changed"));
        }

        Ok(user)
    }

    pub fn create_token(&self, user: &User) -> Result<String> {
        let expiration = Utc::now()
            .checked_add_signed(Duration::hours(self.ttl_hours))
            .ok_or_else(|| anyhow!("token expiry out of range"))?
            .timestamp();

        let claims = Claims {
            sub: user.id,
            role: user.role,
            exp: expiration,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

pub fn role_authority(role: Role) -> String {
    match role {
        Role::Admin => "ROLE_ADMIN".to_string(),
        Role::Client => "ROLE_CLIENT".to_string(),
    }
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the Authorization header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// `?token=` for EventSource clients, which cannot set headers. Only the
/// event stream accepts it.
fn query_token(req: &HttpRequest) -> Option<String> {
    web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().token)
        .filter(|t| !t.is_empty())
}

async fn user_from_token(token: Option<String>, auth_service: &AuthService) -> Result<User, ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("No authorization token provided"))?;

    auth_service
        .validate_token(&token)
        .await
        .map_err(|e| ApiError::unauthorized(e.to_string()))
}

fn ensure_admin(user: User) -> Result<User, ApiError> {
    if user.role != Role::Admin {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(user)
}

pub async fn extract_user(req: &HttpRequest, auth_service: &AuthService) -> Result<User, ApiError> {
    user_from_token(bearer_token(req), auth_service).await
}

/// The caller if a valid token was sent; guests and stale tokens yield `None`.
pub async fn optional_user(req: &HttpRequest, auth_service: &AuthService) -> Option<User> {
    let token = bearer_token(req)?;
    match auth_service.validate_token(&token).await {
        Ok(user) => Some(user),
        Err(e) => {
            debug!("Ignoring invalid token on public route: {}", e);
            None
        }
    }
}

pub async fn require_admin(req: &HttpRequest, auth_service: &AuthService) -> Result<User, ApiError> {
    ensure_admin(extract_user(req, auth_service).await?)
}

/// Admin check for the event stream, where the token may come as `?token=`.
pub async fn require_stream_admin(req: &HttpRequest, auth_service: &AuthService) -> Result<User, ApiError> {
    let token = bearer_token(req).or_else(|| query_token(req));
    ensure_admin(user_from_token(token, auth_service).await?)
}
