//! Replays the loyalty scenario (ten completed visits earn a reward, the
//! reward pays for a "coupe + barbe" package, cancelling refunds it) against
//! a scratch database and reports each step.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveTime};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use barbershop_backend::config::{AppConfig, PushConfig};
use barbershop_backend::loyalty::is_reward_eligible;
use barbershop_backend::models::{AppointmentStatus, BookingRequest, SignupRequest};
use barbershop_backend::{db, seed, AppServices};

/// Lowest cost bcrypt accepts; the scratch accounts need no real hashing.
const SCRATCH_BCRYPT_COST: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let database_url =
        std::env::var("VERIFY_DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    info!("Verifying loyalty rules against {}", database_url);

    // One connection keeps an in-memory database alive for the whole run.
    let options = SqliteConnectOptions::from_str(&database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    db::run_migrations(&pool).await?;

    // Push delivery needs the actix runtime; this run never notifies anyone.
    let config = AppConfig {
        bcrypt_cost: SCRATCH_BCRYPT_COST,
        push: PushConfig::default(),
        ..AppConfig::from_env()?
    };
    seed::run(&pool, &config).await?;
    let services = AppServices::new(pool, &config);

    let client = services
        .auth
        .signup(
            SignupRequest {
                username: format!("loyalty-{}", Local::now().timestamp()),
                password: "password123".to_string(),
                name: "Loyalty Check".to_string(),
                email: None,
                phone: None,
                role: vec!["user".to_string()],
            },
            false,
        )
        .await?;
    info!("Created client {}", client.id);

    let package = services
        .catalog
        .services()
        .await?
        .into_iter()
        .find(is_reward_eligible)
        .context("no 'coupe + barbe' service in the catalog")?;
    let barber = services
        .catalog
        .barbers()
        .await?
        .into_iter()
        .next()
        .context("no barber in the catalog")?;

    let at_two = NaiveTime::from_hms_opt(14, 0, 0).context("invalid time")?;
    let first_day = Local::now().date_naive() + Duration::days(1);
    let request = |offset: i64, use_reward: bool| BookingRequest {
        barber_id: barber.id,
        service_ids: vec![package.id],
        date: first_day + Duration::days(offset),
        start_time: at_two,
        user_name: None,
        user_first_name: None,
        user_phone: None,
        user_email: None,
        use_reward,
    };

    let threshold = config.reward_threshold;
    for visit in 0..threshold {
        let booked = services.appointments.book(request(visit, false), Some(&client)).await?;
        services
            .appointments
            .update_status(booked.id, AppointmentStatus::Done)
            .await?;
    }

    let after_visits = services.auth.find_user(client.id).await?.context("client vanished")?;
    info!(
        "After {} completed visits: total={}, available={}",
        threshold, after_visits.total_appointments, after_visits.available_rewards
    );
    if after_visits.available_rewards != 1 {
        bail!("expected one reward, found {}", after_visits.available_rewards);
    }

    let rewarded = services
        .appointments
        .book(request(threshold, true), Some(&after_visits))
        .await?;
    if !rewarded.reward_applied || rewarded.total_price > 0.0 {
        bail!(
            "reward not applied (applied={}, total={:.2})",
            rewarded.reward_applied,
            rewarded.total_price
        );
    }
    info!("Reward booking {} costs {:.2}", rewarded.id, rewarded.total_price);

    services.appointments.cancel(rewarded.id, Some(&after_visits)).await?;
    let refunded = services.auth.find_user(client.id).await?.context("client vanished")?;
    if refunded.available_rewards != 1 || refunded.used_rewards != 0 {
        bail!(
            "cancellation did not refund the reward (available={}, used={})",
            refunded.available_rewards,
            refunded.used_rewards
        );
    }

    info!("Loyalty rules verified");
    Ok(())
}
