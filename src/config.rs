use std::env;

use anyhow::{Context, Result};
use log::warn;

use crate::loyalty::DEFAULT_REWARD_THRESHOLD;
use crate::schedule::{NameRule, ScheduleTable};

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

/// Process configuration, read once from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub admin_username: String,
    pub admin_password: String,
    pub push: PushConfig,
    pub barber_name_rules: Vec<NameRule>,
    pub reward_threshold: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key: String,
    pub subject: String,
}

impl PushConfig {
    pub fn enabled(&self) -> bool {
        !(self.public_key.trim().is_empty() || self.private_key.trim().is_empty())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/barbershop.db".to_string(),
            bind_addr: "127.0.0.1:8081".to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_ttl_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_username: "superadmin".to_string(),
            admin_password: "admin".to_string(),
            push: PushConfig::default(),
            barber_name_rules: ScheduleTable::default().name_rules,
            reward_threshold: DEFAULT_REWARD_THRESHOLD,
        }
    }
}

fn var_or(name: &str, fallback: &str) -> String {
    env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn parsed_or<T: std::str::FromStr>(name: &str, fallback: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .ok()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(fallback),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let jwt_secret = var_or("JWT_SECRET", &defaults.jwt_secret);
        if jwt_secret == DEFAULT_JWT_SECRET {
            warn!("JWT_SECRET not set. Using the built-in secret; set JWT_SECRET in production.");
        }

        let barber_name_rules = match env::var("BARBER_NAME_START_HOURS") {
            Ok(raw) => ScheduleTable::parse_name_rules(&raw)?,
            Err(_) => defaults.barber_name_rules,
        };

        Ok(Self {
            database_url: var_or("DATABASE_URL", &defaults.database_url),
            bind_addr: var_or("BIND_ADDR", &defaults.bind_addr),
            jwt_secret,
            jwt_ttl_hours: parsed_or("JWT_TTL_HOURS", defaults.jwt_ttl_hours)?,
            bcrypt_cost: parsed_or("BCRYPT_COST", defaults.bcrypt_cost)?,
            admin_username: var_or("ADMIN_USERNAME", &defaults.admin_username),
            admin_password: var_or("ADMIN_PASSWORD", &defaults.admin_password),
            push: PushConfig {
                public_key: var_or("VAPID_PUBLIC_KEY", ""),
                private_key: var_or("VAPID_PRIVATE_KEY", ""),
                subject: var_or("VAPID_SUBJECT", "mailto:admin@barbershop.local"),
            },
            barber_name_rules,
            reward_threshold: parsed_or("REWARD_THRESHOLD", defaults.reward_threshold)?,
        })
    }

    pub fn schedule(&self) -> ScheduleTable {
        ScheduleTable::with_name_rules(self.barber_name_rules.clone())
    }
}
