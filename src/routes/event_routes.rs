use actix_web::{http::header, web, HttpRequest, HttpResponse};
use log::{debug, info};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::auth::{require_stream_admin, AuthService};
use crate::error::ApiError;
use crate::events::{event_to_bytes, retry_frame, EventHub};

/// Mounted under `/appointments`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/stream", web::get().to(stream));
}

async fn stream(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    events: web::Data<EventHub>,
) -> Result<HttpResponse, ApiError> {
    let admin = require_stream_admin(&req, &auth_service).await?;
    info!("Admin {} opened the appointment stream", admin.id);

    let rx = events.subscribe();
    let updates = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<web::Bytes, actix_web::Error>(event_to_bytes(&event))),
        Err(lagged) => {
            debug!("Appointment stream dropped events: {}", lagged);
            None
        }
    });
    let first = tokio_stream::once(Ok::<web::Bytes, actix_web::Error>(retry_frame()));

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(first.chain(updates)))
}
