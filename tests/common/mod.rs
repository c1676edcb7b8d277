#![allow(dead_code)]

use std::path::PathBuf;
use std::str::FromStr;

use barbershop_backend::config::AppConfig;
use barbershop_backend::models::{Barber, LoginCredentials, Service, SignupRequest, User};
use barbershop_backend::{db, seed, AppServices};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub const ADMIN_PASSWORD: &str = "test-admin-password";
/// Lowest cost bcrypt accepts; keeps hashing fast in tests.
pub const TEST_BCRYPT_COST: u32 = 4;

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        bcrypt_cost: TEST_BCRYPT_COST,
        admin_password: ADMIN_PASSWORD.to_string(),
        ..AppConfig::default()
    }
}

/// In-memory database shared through a single connection.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub async fn setup() -> (AppServices, AppConfig) {
    let config = test_config();
    let pool = test_pool().await;
    seed::run(&pool, &config).await.unwrap();
    (AppServices::new(pool, &config), config)
}

/// Like `setup`, but on a database file with a multi-connection pool, so
/// requests really run side by side. Returns the file to clean up.
pub async fn setup_file(name: &str) -> (AppServices, AppConfig, PathBuf) {
    let path = std::env::temp_dir().join(format!("barbershop-{}-{}.db", name, std::process::id()));
    let _ = std::fs::remove_file(&path);

    let config = AppConfig {
        database_url: format!("sqlite://{}", path.display()),
        ..test_config()
    };
    let pool = db::connect(&config.database_url).await.unwrap();
    seed::run(&pool, &config).await.unwrap();
    (AppServices::new(pool, &config), config, path)
}

pub async fn admin_token(services: &AppServices, config: &AppConfig) -> String {
    services
        .auth
        .signin(LoginCredentials {
            username: config.admin_username.clone(),
            password: ADMIN_PASSWORD.to_string(),
        })
        .await
        .unwrap()
        .token
}

/// Registers a client account and signs it in.
pub async fn client(services: &AppServices, username: &str, phone: &str) -> (User, String) {
    let user = services
        .auth
        .signup(
            SignupRequest {
                username: username.to_string(),
                password: "password123".to_string(),
                name: format!("Client {}", username),
                email: Some(format!("{}@example.com", username)),
                phone: Some(phone.to_string()),
                role: vec!["user".to_string()],
            },
            false,
        )
        .await
        .unwrap();
    let token = services
        .auth
        .signin(LoginCredentials {
            username: username.to_string(),
            password: "password123".to_string(),
        })
        .await
        .unwrap()
        .token;
    (user, token)
}

pub async fn barber(services: &AppServices, name: &str) -> Barber {
    services
        .catalog
        .barbers()
        .await
        .unwrap()
        .into_iter()
        .find(|b| b.name == name)
        .unwrap()
}

pub async fn service(services: &AppServices, name: &str) -> Service {
    services
        .catalog
        .services()
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}
