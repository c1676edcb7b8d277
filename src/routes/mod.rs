pub mod appointment_routes;
pub mod auth_routes;
pub mod blocked_routes;
pub mod catalog_routes;
pub mod event_routes;
pub mod message_routes;
pub mod notification_routes;

use actix_web::web;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(auth_routes::config)
            .configure(catalog_routes::config)
            .configure(appointment_routes::config)
            .configure(notification_routes::config)
            .configure(message_routes::config),
    );
}
