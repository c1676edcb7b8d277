pub mod appointments;
pub mod auth;
pub mod availability;
pub mod blocked_slots;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod loyalty;
pub mod messages;
pub mod models;
pub mod push;
pub mod revenue;
pub mod routes;
pub mod schedule;
pub mod seed;

use actix_web::web;
use sqlx::SqlitePool;

use crate::appointments::AppointmentService;
use crate::auth::AuthService;
use crate::blocked_slots::BlockedSlotService;
use crate::catalog::CatalogService;
use crate::config::AppConfig;
use crate::events::EventHub;
use crate::loyalty::LoyaltyPolicy;
use crate::messages::MessageService;
use crate::push::PushService;

/// Every service the handlers pull out of `web::Data`. Built once and
/// cloned into each worker.
#[derive(Clone)]
pub struct AppServices {
    pub auth: web::Data<AuthService>,
    pub appointments: web::Data<AppointmentService>,
    pub catalog: web::Data<CatalogService>,
    pub blocked: web::Data<BlockedSlotService>,
    pub messages: web::Data<MessageService>,
    pub push: web::Data<PushService>,
    pub events: web::Data<EventHub>,
}

impl AppServices {
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Self {
        let events = EventHub::default();
        let push = PushService::new(pool.clone(), config.push.clone());
        let appointments = AppointmentService::new(
            pool.clone(),
            config.schedule(),
            LoyaltyPolicy::new(config.reward_threshold),
            events.clone(),
            push.clone(),
        );

        Self {
            auth: web::Data::new(AuthService::new(pool.clone(), config)),
            appointments: web::Data::new(appointments),
            catalog: web::Data::new(CatalogService::new(pool.clone())),
            blocked: web::Data::new(BlockedSlotService::new(pool.clone())),
            messages: web::Data::new(MessageService::new(pool)),
            push: web::Data::new(push),
            events: web::Data::new(events),
        }
    }

    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.auth.clone())
            .app_data(self.appointments.clone())
            .app_data(self.catalog.clone())
            .app_data(self.blocked.clone())
            .app_data(self.messages.clone())
            .app_data(self.push.clone())
            .app_data(self.events.clone());
    }
}
