use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;

use crate::appointments::AppointmentService;
use crate::auth::{extract_user, optional_user, require_admin, AuthService};
use crate::error::ApiError;
use crate::models::{
    hhmm, AppointmentFilter, BookingRequest, LockRequest, ModifyRequest, StatusRequest,
};
use crate::routes::{blocked_routes, event_routes};
use crate::schedule::GridOptions;

pub fn config(cfg: &mut web::ServiceConfig) {
    // Fixed paths first so "/lock" and "/stream" are not taken for an id.
    cfg.service(
        web::scope("/appointments")
            .configure(blocked_routes::config)
            .configure(event_routes::config)
            .route("", web::get().to(list_all))
            .route("/available", web::get().to(available))
            .route("/slots", web::get().to(slots))
            .route("/book", web::post().to(book))
            .route("/my-appointments", web::get().to(my_appointments))
            .route("/by-contact", web::get().to(by_contact))
            .route("/filter", web::get().to(filter))
            .route("/new-count", web::get().to(new_count))
            .route("/lock", web::post().to(lock))
            .route("/lock", web::delete().to(unlock))
            .route("/revenue-report/{barber_id}", web::get().to(revenue_report))
            .route("/{id}/cancel", web::put().to(cancel))
            .route("/{id}/modify", web::put().to(modify))
            .route("/{id}/status", web::put().to(update_status))
            .route("/{id}/view", web::put().to(mark_viewed))
            .route("/{id}", web::delete().to(delete)),
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DayQuery {
    barber_id: i64,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotsQuery {
    barber_id: i64,
    date: NaiveDate,
    /// Comma-separated service ids, e.g. `1,4`.
    service_ids: Option<String>,
    /// Appointment being moved; its own time is offered as free.
    exclude_appointment_id: Option<i64>,
    #[serde(default)]
    include_past: bool,
}

#[derive(Debug, Deserialize)]
struct ContactQuery {
    email: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockQuery {
    barber_id: i64,
    date: NaiveDate,
    #[serde(with = "hhmm")]
    start_time: NaiveTime,
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    date: Option<NaiveDate>,
}

fn parse_ids(raw: Option<&str>) -> Result<Vec<i64>, ApiError> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| ApiError::bad_request(format!("Invalid service id '{}'", part)))
        })
        .collect()
}

async fn available(
    appointments: web::Data<AppointmentService>,
    query: web::Query<DayQuery>,
) -> Result<HttpResponse, ApiError> {
    let free = appointments.available(query.barber_id, query.date).await?;
    let times: Vec<String> = free.iter().map(|t| t.format("%H:%M").to_string()).collect();
    Ok(HttpResponse::Ok().json(times))
}

async fn slots(
    appointments: web::Data<AppointmentService>,
    query: web::Query<SlotsQuery>,
) -> Result<HttpResponse, ApiError> {
    let service_ids = parse_ids(query.service_ids.as_deref())?;
    let options = GridOptions {
        keep_past: query.include_past,
    };
    let grid = appointments
        .slots(
            query.barber_id,
            query.date,
            &service_ids,
            query.exclude_appointment_id,
            Local::now().naive_local(),
            options,
        )
        .await?;
    Ok(HttpResponse::Ok().json(grid))
}

async fn book(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    body: web::Json<BookingRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = optional_user(&req, &auth_service).await;
    let appointment = appointments.book(body.into_inner(), caller.as_ref()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn my_appointments(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
) -> Result<HttpResponse, ApiError> {
    let user = extract_user(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.for_user(user.id).await?))
}

async fn by_contact(
    appointments: web::Data<AppointmentService>,
    query: web::Query<ContactQuery>,
) -> Result<HttpResponse, ApiError> {
    let found = appointments
        .by_contact(query.email.as_deref(), query.phone.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(found))
}

async fn cancel(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let caller = optional_user(&req, &auth_service).await;
    let appointment = appointments.cancel(path.into_inner(), caller.as_ref()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn modify(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
    body: web::Json<ModifyRequest>,
) -> Result<HttpResponse, ApiError> {
    let caller = optional_user(&req, &auth_service).await;
    let appointment = appointments
        .modify(path.into_inner(), body.into_inner(), caller.as_ref())
        .await?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn list_all(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.list_all().await?))
}

async fn filter(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    query: web::Query<AppointmentFilter>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.filter(query.into_inner()).await?))
}

async fn new_count(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.new_count().await?))
}

async fn update_status(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
    body: web::Json<StatusRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let appointment = appointments
        .update_status(path.into_inner(), body.status)
        .await?;
    Ok(HttpResponse::Ok().json(appointment))
}

async fn mark_viewed(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.mark_viewed(path.into_inner()).await?))
}

async fn delete(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    appointments.delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Appointment deleted" })))
}

async fn lock(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    query: web::Query<LockRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    Ok(HttpResponse::Ok().json(appointments.lock(query.into_inner()).await?))
}

async fn unlock(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    query: web::Query<UnlockQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let released = appointments
        .unlock(query.barber_id, query.date, query.start_time)
        .await?;
    Ok(HttpResponse::Ok().json(released))
}

async fn revenue_report(
    req: HttpRequest,
    auth_service: web::Data<AuthService>,
    appointments: web::Data<AppointmentService>,
    path: web::Path<i64>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &auth_service).await?;
    let reference = query.date.unwrap_or_else(|| Local::now().date_naive());
    let report = appointments
        .revenue_report(path.into_inner(), reference)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}
