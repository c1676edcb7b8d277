use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, info, warn};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::auth::USER_COLUMNS;
use crate::availability::{DayOccupancy, Interval, Occupant};
use crate::error::{is_lock_contention, ApiError};
use crate::events::{ChangeKind, EventHub};
use crate::loyalty::{reward_discount, LoyaltyCounters, LoyaltyPolicy};
use crate::models::{
    AppointmentFilter, AppointmentRow, AppointmentStatus, AppointmentView, Barber, BlockedSlot,
    BookingRequest, LockRequest, ModifyRequest, Role, Service, User,
};
use crate::push::PushService;
use crate::revenue::{self, RevenueReport};
use crate::schedule::{
    build_slot_grid_with, minutes_of, time_of, GridOptions, ScheduleTable, Slot,
    DEFAULT_DURATION_MINUTES,
};

const APPOINTMENT_SELECT: &str = r#"
    SELECT a.id, a.date, a.start_time, a.end_time, a.status, a.user_id, a.barber_id,
           a.total_price, a.reward_applied, a.admin_viewed,
           u.name AS user_name, u.first_name AS user_first_name,
           u.phone AS user_phone, u.email AS user_email,
           b.name AS barber_name, b.speciality AS barber_speciality, b.photo AS barber_photo
    FROM appointments a
    LEFT JOIN users u ON u.id = a.user_id
    LEFT JOIN barbers b ON b.id = a.barber_id
"#;

const DEFAULT_SORT: &str = "a.date, a.start_time";
const MINUTES_PER_DAY: u32 = 24 * 60;
/// Bound parameters per hydration query.
const HYDRATE_CHUNK: usize = 500;
/// Tries for a write that loses the SQLite lock to a concurrent one.
const WRITE_ATTEMPTS: u32 = 5;

#[derive(Debug, sqlx::FromRow)]
struct LinkedService {
    appointment_id: i64,
    id: i64,
    name: String,
    description: String,
    price: f64,
    duration: i64,
}

impl From<LinkedService> for Service {
    fn from(linked: LinkedService) -> Self {
        Service {
            id: linked.id,
            name: linked.name,
            description: linked.description,
            price: linked.price,
            duration: linked.duration,
        }
    }
}

/// Contact details used to find or create the client behind a booking.
struct Contact<'a> {
    name: Option<&'a str>,
    first_name: Option<&'a str>,
    phone: Option<&'a str>,
    email: Option<&'a str>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Maps the comma-separated sort keys accepted by the filter endpoint to
/// columns. Unknown keys are dropped.
pub fn sort_clause(raw: Option<&str>) -> String {
    let columns: Vec<&str> = raw
        .unwrap_or_default()
        .split(',')
        .filter_map(|key| match key.trim() {
            "barber" => Some("b.name"),
            "date" => Some("a.date"),
            "startTime" => Some("a.start_time"),
            "status" => Some("a.status"),
            _ => None,
        })
        .collect();

    if columns.is_empty() {
        DEFAULT_SORT.to_string()
    } else {
        columns.join(", ")
    }
}

pub struct AppointmentService {
    pool: SqlitePool,
    schedule: ScheduleTable,
    loyalty: LoyaltyPolicy,
    events: EventHub,
    push: PushService,
}

impl AppointmentService {
    pub fn new(
        pool: SqlitePool,
        schedule: ScheduleTable,
        loyalty: LoyaltyPolicy,
        events: EventHub,
        push: PushService,
    ) -> Self {
        Self {
            pool,
            schedule,
            loyalty,
            events,
            push,
        }
    }

    /// Quarter-hour starts in the barber's window that nothing occupies.
    pub async fn available(&self, barber_id: i64, date: NaiveDate) -> Result<Vec<NaiveTime>> {
        let mut conn = self.pool.acquire().await?;
        let barber = fetch_barber(&mut conn, barber_id).await?;
        let occupancy = day_occupancy(&mut conn, barber_id, date, None).await?;
        let window = self.schedule.window_for(&barber, date);
        Ok(occupancy.free_starts(window).into_iter().collect())
    }

    /// The bookable grid for a barber's day and a selection of services.
    /// When rescheduling, `rescheduling` names the appointment being moved so
    /// its own time counts as free.
    pub async fn slots(
        &self,
        barber_id: i64,
        date: NaiveDate,
        service_ids: &[i64],
        rescheduling: Option<i64>,
        now: NaiveDateTime,
        options: GridOptions,
    ) -> Result<Vec<Slot>> {
        let mut conn = self.pool.acquire().await?;
        let barber = fetch_barber(&mut conn, barber_id).await?;
        let services = fetch_services(&mut conn, service_ids).await?;
        let occupancy = day_occupancy(&mut conn, barber_id, date, rescheduling).await?;

        let window = self.schedule.window_for(&barber, date);
        let free: BTreeSet<NaiveTime> = occupancy.free_starts(window);
        let required = services
            .iter()
            .map(|s| u32::try_from(s.duration).unwrap_or(0))
            .sum();

        Ok(build_slot_grid_with(window, required, &free, date, now, options))
    }

    pub async fn book(&self, req: BookingRequest, caller: Option<&User>) -> Result<AppointmentView> {
        retry_on_contention("book", move || self.book_once(req.clone(), caller)).await
    }

    async fn book_once(&self, req: BookingRequest, caller: Option<&User>) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;

        let barber = fetch_barber(&mut tx, req.barber_id).await?;
        let services = fetch_services(&mut tx, &req.service_ids).await?;
        if services.is_empty() {
            return Err(ApiError::not_found("No services selected").into());
        }

        let user = match caller {
            Some(user) if user.role == Role::Client => fetch_user(&mut tx, user.id).await?,
            _ => {
                let contact = Contact {
                    name: non_blank(req.user_name.as_ref()),
                    first_name: non_blank(req.user_first_name.as_ref()),
                    phone: non_blank(req.user_phone.as_ref()),
                    email: non_blank(req.user_email.as_ref()),
                };
                if contact.name.is_none() || contact.phone.is_none() {
                    return Err(ApiError::bad_request("Name and phone are required").into());
                }
                find_or_create_client(&mut tx, &contact).await?
            }
        };

        let duration: i64 = services.iter().map(|s| s.duration).sum();
        let interval = appointment_interval(req.start_time, duration)?;
        ensure_free(&mut tx, barber.id, req.date, interval).await?;

        let mut total: f64 = services.iter().map(|s| s.price).sum();
        let mut reward_applied = false;
        if req.use_reward {
            match (reward_discount(&services), LoyaltyCounters::from(&user).redeem()) {
                (Some(discount), Some(counters)) => {
                    total = (total - discount).max(0.0);
                    save_counters(&mut tx, user.id, counters).await?;
                    reward_applied = true;
                    info!("Reward applied for user {}. New total: {:.2}", user.name, total);
                }
                (None, _) => warn!("User {} asked for a reward without an eligible service", user.id),
                (_, None) => warn!("User {} asked for a reward with none available", user.id),
            }
        }

        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"INSERT INTO appointments
               (date, start_time, end_time, status, user_id, barber_id, total_price, reward_applied, admin_viewed)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
               RETURNING id"#,
        )
        .bind(req.date)
        .bind(time_of(interval.start))
        .bind(time_of(interval.end))
        .bind(AppointmentStatus::Booked)
        .bind(user.id)
        .bind(barber.id)
        .bind(total)
        .bind(reward_applied)
        .fetch_one(&mut *tx)
        .await?;

        link_services(&mut tx, id, &services).await?;
        let view = load_view(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            "Appointment {} booked for {} with {} on {} at {}",
            id,
            user.name,
            barber.name,
            req.date,
            req.start_time.format("%H:%M")
        );
        self.events.publish(ChangeKind::Created, view.clone());
        self.push.notify_admins_in_background(
            "New appointment".to_string(),
            format!(
                "{} booked {} (total {:.2}) with {} on {} at {}",
                user.name,
                service_names(&view.services),
                total,
                barber.name,
                req.date,
                req.start_time.format("%H:%M")
            ),
        );

        Ok(view)
    }

    /// Cancels an appointment and gives back a reward spent on it. Signed-in
    /// clients may only cancel their own.
    pub async fn cancel(&self, id: i64, caller: Option<&User>) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;
        let row = fetch_row(&mut tx, id).await?;
        ensure_can_manage(caller, &row)?;

        if row.status == AppointmentStatus::Cancelled {
            return load_view(&mut tx, id).await;
        }

        if row.reward_applied {
            if let Some(user_id) = row.user_id {
                let user = fetch_user(&mut tx, user_id).await?;
                save_counters(&mut tx, user_id, LoyaltyCounters::from(&user).refund()).await?;
                info!("Reward refunded to user {} after cancelling appointment {}", user.name, id);
            }
        }

        set_status(&mut tx, id, AppointmentStatus::Cancelled).await?;
        let view = load_view(&mut tx, id).await?;
        tx.commit().await?;

        info!("Appointment {} cancelled", id);
        self.events.publish(ChangeKind::Cancelled, view.clone());
        Ok(view)
    }

    /// Moves an appointment: the old one is cancelled and a MODIFIED copy is
    /// created at the new time. A conflict leaves the old one in place.
    pub async fn modify(
        &self,
        id: i64,
        req: ModifyRequest,
        caller: Option<&User>,
    ) -> Result<AppointmentView> {
        retry_on_contention("modify", move || self.modify_once(id, req.clone(), caller)).await
    }

    async fn modify_once(
        &self,
        id: i64,
        req: ModifyRequest,
        caller: Option<&User>,
    ) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;
        let old = fetch_row(&mut tx, id).await?;
        ensure_can_manage(caller, &old)?;

        if !matches!(old.status, AppointmentStatus::Booked | AppointmentStatus::Modified) {
            return Err(ApiError::bad_request(format!(
                "Only booked appointments can be modified (status is {})",
                old.status.as_str()
            ))
            .into());
        }
        let barber_id = old
            .barber_id
            .ok_or_else(|| ApiError::bad_request("Appointment has no barber"))?;

        set_status(&mut tx, id, AppointmentStatus::Cancelled).await?;

        let duration = i64::from(minutes_of(old.end_time).saturating_sub(minutes_of(old.start_time)));
        let interval = appointment_interval(req.start_time, duration)?;
        ensure_free(&mut tx, barber_id, req.date, interval).await?;

        let (new_id,) = sqlx::query_as::<_, (i64,)>(
            r#"INSERT INTO appointments
               (date, start_time, end_time, status, user_id, barber_id, total_price, reward_applied, admin_viewed)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
               RETURNING id"#,
        )
        .bind(req.date)
        .bind(time_of(interval.start))
        .bind(time_of(interval.end))
        .bind(AppointmentStatus::Modified)
        .bind(old.user_id)
        .bind(barber_id)
        .bind(old.total_price)
        .bind(old.reward_applied)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO appointment_services (appointment_id, service_id, position)
               SELECT ?, service_id, position FROM appointment_services WHERE appointment_id = ?"#,
        )
        .bind(new_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let cancelled = load_view(&mut tx, id).await?;
        let view = load_view(&mut tx, new_id).await?;
        tx.commit().await?;

        info!("Appointment {} moved to {} ({} at {})", id, new_id, req.date, req.start_time.format("%H:%M"));
        self.events.publish(ChangeKind::Cancelled, cancelled);
        self.events.publish(ChangeKind::Modified, view.clone());

        let client = view.user.as_ref().map_or("A client", |u| u.name.as_str());
        self.push.notify_admins_in_background(
            "Appointment modified".to_string(),
            format!(
                "{} moved their appointment for {}. New date: {} at {}",
                client,
                service_names(&view.services),
                req.date,
                req.start_time.format("%H:%M")
            ),
        );

        Ok(view)
    }

    /// Admin status change, with the loyalty counters following along.
    pub async fn update_status(&self, id: i64, status: AppointmentStatus) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;
        let row = fetch_row(&mut tx, id).await?;

        if let Some(user_id) = row.user_id {
            let user = fetch_user(&mut tx, user_id).await?;
            let before = LoyaltyCounters::from(&user);
            let after = self
                .loyalty
                .on_status_change(before, row.status, status, row.reward_applied);
            if after != before {
                save_counters(&mut tx, user_id, after).await?;
                info!(
                    "Loyalty for user {}: total {} -> {}, available {} -> {}",
                    user.name,
                    before.total_appointments,
                    after.total_appointments,
                    before.available_rewards,
                    after.available_rewards
                );
            }
        }

        set_status(&mut tx, id, status).await?;
        let view = load_view(&mut tx, id).await?;
        tx.commit().await?;

        info!("Appointment {} status {} -> {}", id, row.status.as_str(), status.as_str());
        let kind = if status == AppointmentStatus::Cancelled {
            ChangeKind::Cancelled
        } else {
            ChangeKind::Updated
        };
        self.events.publish(kind, view.clone());
        Ok(view)
    }

    pub async fn mark_viewed(&self, id: i64) -> Result<AppointmentView> {
        let result = sqlx::query("UPDATE appointments SET admin_viewed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Appointment not found").into());
        }

        let view = self.view(id).await?;
        self.events.publish(ChangeKind::Updated, view.clone());
        Ok(view)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let view = load_view(&mut tx, id).await?;

        // A cancelled appointment already gave its reward back.
        let refundable = !matches!(view.status, AppointmentStatus::Done | AppointmentStatus::Cancelled);
        if view.reward_applied && refundable {
            if let Some(summary) = &view.user {
                let user = fetch_user(&mut tx, summary.id).await?;
                save_counters(&mut tx, user.id, LoyaltyCounters::from(&user).refund()).await?;
                info!("Reward refunded to user {} after deleting appointment {}", user.name, id);
            }
        }

        sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Appointment {} deleted", id);
        self.events.publish(ChangeKind::Deleted, view);
        Ok(())
    }

    /// Holds a slot from the admin dashboard. With a name and phone the slot
    /// is booked for that client; otherwise it is a bare BLOCKED placeholder.
    pub async fn lock(&self, req: LockRequest) -> Result<AppointmentView> {
        retry_on_contention("lock", move || self.lock_once(req.clone())).await
    }

    async fn lock_once(&self, req: LockRequest) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;
        let barber = fetch_barber(&mut tx, req.barber_id).await?;

        let interval = appointment_interval(req.start_time, 0)?;
        ensure_free(&mut tx, barber.id, req.date, interval).await?;

        let contact = Contact {
            name: non_blank(req.name.as_ref()),
            first_name: None,
            phone: non_blank(req.phone.as_ref()),
            email: None,
        };
        let (user_id, status, admin_viewed) = match (contact.name, contact.phone) {
            (Some(_), Some(_)) => {
                let user = find_or_create_client(&mut tx, &contact).await?;
                (Some(user.id), AppointmentStatus::Booked, false)
            }
            _ => (None, AppointmentStatus::Blocked, true),
        };

        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"INSERT INTO appointments
               (date, start_time, end_time, status, user_id, barber_id, total_price, reward_applied, admin_viewed)
               VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?)
               RETURNING id"#,
        )
        .bind(req.date)
        .bind(time_of(interval.start))
        .bind(time_of(interval.end))
        .bind(status)
        .bind(user_id)
        .bind(barber.id)
        .bind(admin_viewed)
        .fetch_one(&mut *tx)
        .await?;

        let view = load_view(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            "Slot {} {} locked for barber {} ({})",
            req.date,
            req.start_time.format("%H:%M"),
            barber.name,
            status.as_str()
        );
        self.events.publish(ChangeKind::Locked, view.clone());
        Ok(view)
    }

    pub async fn unlock(&self, barber_id: i64, date: NaiveDate, start_time: NaiveTime) -> Result<AppointmentView> {
        let mut tx = self.pool.begin().await?;
        let found = sqlx::query_as::<_, (i64,)>(
            r#"SELECT id FROM appointments
               WHERE barber_id = ? AND date = ? AND start_time = ? AND status = ?
               LIMIT 1"#,
        )
        .bind(barber_id)
        .bind(date)
        .bind(start_time)
        .bind(AppointmentStatus::Blocked)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = found else {
            return Err(ApiError::not_found("Blocked slot not found").into());
        };

        let view = load_view(&mut tx, id).await?;
        sqlx::query("DELETE FROM appointments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("Slot {} {} unlocked for barber {}", date, start_time.format("%H:%M"), barber_id);
        self.events.publish(ChangeKind::Unlocked, view.clone());
        Ok(view)
    }

    pub async fn view(&self, id: i64) -> Result<AppointmentView> {
        let mut conn = self.pool.acquire().await?;
        load_view(&mut conn, id).await
    }

    pub async fn list_all(&self) -> Result<Vec<AppointmentView>> {
        self.filter(AppointmentFilter::default()).await
    }

    pub async fn filter(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentView>> {
        let mut qb = QueryBuilder::<Sqlite>::new(APPOINTMENT_SELECT);
        qb.push(" WHERE 1 = 1");

        if let Some(barber_id) = filter.barber_id {
            qb.push(" AND a.barber_id = ").push_bind(barber_id);
        }
        if let Some(date) = filter.date {
            qb.push(" AND a.date = ").push_bind(date);
        }
        if let Some(status) = filter.status {
            qb.push(" AND a.status = ").push_bind(status);
        }
        if let Some(q) = non_blank(filter.q.as_ref()) {
            let pattern = format!("%{}%", q.to_lowercase());
            qb.push(" AND (LOWER(u.name) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(COALESCE(u.phone, '')) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY ").push(sort_clause(filter.sort.as_deref()));

        let mut conn = self.pool.acquire().await?;
        let rows = qb
            .build_query_as::<AppointmentRow>()
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    pub async fn for_user(&self, user_id: i64) -> Result<Vec<AppointmentView>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{APPOINTMENT_SELECT} WHERE a.user_id = ? ORDER BY a.date DESC, a.start_time DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        hydrate(&mut conn, rows).await
    }

    /// Guest lookup: appointments whose client matches the email
    /// (case-insensitive) or the phone.
    pub async fn by_contact(&self, email: Option<&str>, phone: Option<&str>) -> Result<Vec<AppointmentView>> {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let phone = phone.map(str::trim).filter(|p| !p.is_empty());
        if email.is_none() && phone.is_none() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(APPOINTMENT_SELECT);
        qb.push(" WHERE 0 = 1");
        if let Some(email) = email {
            qb.push(" OR LOWER(u.email) = ").push_bind(email.to_lowercase());
        }
        if let Some(phone) = phone {
            qb.push(" OR LOWER(u.phone) = ").push_bind(phone.to_lowercase());
        }
        qb.push(" ORDER BY a.date DESC, a.start_time DESC");

        let mut conn = self.pool.acquire().await?;
        let rows = qb
            .build_query_as::<AppointmentRow>()
            .fetch_all(&mut *conn)
            .await?;
        hydrate(&mut conn, rows).await
    }

    /// Bookings the admin has not opened yet.
    pub async fn new_count(&self) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM appointments WHERE status = ? AND admin_viewed = 0",
        )
        .bind(AppointmentStatus::Booked)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn revenue_report(&self, barber_id: i64, reference: NaiveDate) -> Result<RevenueReport> {
        let mut conn = self.pool.acquire().await?;
        let barber = fetch_barber(&mut conn, barber_id).await?;
        let (week_start, week_end) = revenue::week_bounds(reference);

        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "{APPOINTMENT_SELECT} WHERE a.barber_id = ? AND a.status = ? AND a.date BETWEEN ? AND ? \
             ORDER BY a.date, a.start_time"
        ))
        .bind(barber_id)
        .bind(AppointmentStatus::Done)
        .bind(week_start)
        .bind(week_end)
        .fetch_all(&mut *conn)
        .await?;
        let views = hydrate(&mut conn, rows).await?;

        info!("Revenue report for barber {} week of {}: {} appointments", barber.name, week_start, views.len());
        Ok(revenue::build_report(barber.id, &barber.name, reference, &views))
    }
}

/// Runs a check-then-write transaction again when SQLite reports that a
/// concurrent writer got the lock first. The rerun sees the winner's rows, so
/// a lost race ends as a normal conflict.
async fn retry_on_contention<T, F, Fut>(operation: &str, mut attempt_once: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_once().await {
            Err(err) if attempt < WRITE_ATTEMPTS && is_lock_contention(&err) => {
                debug!("{} lost the database lock (attempt {}), retrying", operation, attempt);
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

fn ensure_can_manage(caller: Option<&User>, row: &AppointmentRow) -> Result<()> {
    match caller {
        Some(user) if user.role == Role::Client && row.user_id != Some(user.id) => {
            Err(ApiError::forbidden("You can only manage your own appointments").into())
        }
        _ => Ok(()),
    }
}

/// `[start, start + duration)`, with a missing duration counted as the
/// default half hour. Appointments may not run past midnight.
fn appointment_interval(start: NaiveTime, duration_minutes: i64) -> Result<Interval> {
    let duration = match u32::try_from(duration_minutes) {
        Ok(0) | Err(_) => DEFAULT_DURATION_MINUTES,
        Ok(minutes) => minutes,
    };
    let start = minutes_of(start);
    let end = start + duration;
    if end >= MINUTES_PER_DAY {
        return Err(ApiError::bad_request("Appointment must end before midnight").into());
    }
    Ok(Interval::new(start, end))
}

fn service_names(services: &[Service]) -> String {
    services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn ensure_free(
    conn: &mut SqliteConnection,
    barber_id: i64,
    date: NaiveDate,
    wanted: Interval,
) -> Result<()> {
    let occupancy = day_occupancy(conn, barber_id, date, None).await?;
    match occupancy.conflict(wanted) {
        Some(conflict) => Err(ApiError::conflict(conflict.message()).into()),
        None => Ok(()),
    }
}

/// Occupancy of a barber's day, leaving out the `skip` appointment if given.
async fn day_occupancy(
    conn: &mut SqliteConnection,
    barber_id: i64,
    date: NaiveDate,
    skip: Option<i64>,
) -> Result<DayOccupancy> {
    let occupants = sqlx::query_as::<_, Occupant>(
        r#"SELECT status, start_time, end_time FROM appointments
           WHERE barber_id = ? AND date = ? AND (? IS NULL OR id <> ?)"#,
    )
    .bind(barber_id)
    .bind(date)
    .bind(skip)
    .bind(skip)
    .fetch_all(&mut *conn)
    .await?;

    let blocks = sqlx::query_as::<_, BlockedSlot>(
        "SELECT id, date, start_time, end_time, barber_id, reason FROM blocked_slots WHERE date = ?",
    )
    .bind(date)
    .fetch_all(&mut *conn)
    .await?;

    Ok(DayOccupancy::new(barber_id, &occupants, &blocks))
}

async fn fetch_barber(conn: &mut SqliteConnection, id: i64) -> Result<Barber> {
    sqlx::query_as::<_, Barber>(
        "SELECT id, name, speciality, photo, description, start_hour FROM barbers WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Barber not found").into())
}

/// Known services among `ids`, in the order requested. Unknown ids and
/// repeats are skipped.
async fn fetch_services(conn: &mut SqliteConnection, ids: &[i64]) -> Result<Vec<Service>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, name, description, price, duration FROM services WHERE id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let found = qb.build_query_as::<Service>().fetch_all(&mut *conn).await?;
    let mut by_id: HashMap<i64, Service> = found.into_iter().map(|s| (s.id, s)).collect();
    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

async fn fetch_user(conn: &mut SqliteConnection, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found").into())
}

/// Looks the client up by phone, then email; creates a CLIENT account
/// without a password when neither matches.
async fn find_or_create_client(conn: &mut SqliteConnection, contact: &Contact<'_>) -> Result<User> {
    if let Some(phone) = contact.phone {
        let found = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = ? ORDER BY id LIMIT 1"
        ))
        .bind(phone)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(user) = found {
            return Ok(user);
        }
    }

    if let Some(email) = contact.email {
        let found = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER(?) ORDER BY id LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(user) = found {
            return Ok(user);
        }
    }

    let name = contact
        .name
        .ok_or_else(|| ApiError::bad_request("Name is required"))?;
    let username = contact.email.or(contact.phone);

    info!("Creating client account for {}", name);
    let user = sqlx::query_as::<_, User>(&format!(
        r#"INSERT INTO users (name, first_name, phone, email, username, role)
           VALUES (?, ?, ?, ?, ?, ?)
           RETURNING {USER_COLUMNS}"#
    ))
    .bind(name)
    .bind(contact.first_name)
    .bind(contact.phone)
    .bind(contact.email)
    .bind(username)
    .bind(Role::Client)
    .fetch_one(&mut *conn)
    .await?;
    Ok(user)
}

async fn save_counters(conn: &mut SqliteConnection, user_id: i64, counters: LoyaltyCounters) -> Result<()> {
    sqlx::query(
        r#"UPDATE users
           SET total_appointments = ?, available_rewards = ?, used_rewards = ?
           WHERE id = ?"#,
    )
    .bind(counters.total_appointments)
    .bind(counters.available_rewards)
    .bind(counters.used_rewards)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn set_status(conn: &mut SqliteConnection, id: i64, status: AppointmentStatus) -> Result<()> {
    sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn link_services(conn: &mut SqliteConnection, appointment_id: i64, services: &[Service]) -> Result<()> {
    for (position, service) in services.iter().enumerate() {
        sqlx::query(
            "INSERT INTO appointment_services (appointment_id, service_id, position) VALUES (?, ?, ?)",
        )
        .bind(appointment_id)
        .bind(service.id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn fetch_row(conn: &mut SqliteConnection, id: i64) -> Result<AppointmentRow> {
    sqlx::query_as::<_, AppointmentRow>(&format!("{APPOINTMENT_SELECT} WHERE a.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Appointment not found").into())
}

async fn load_view(conn: &mut SqliteConnection, id: i64) -> Result<AppointmentView> {
    let row = fetch_row(conn, id).await?;
    let mut views = hydrate(conn, vec![row]).await?;
    views
        .pop()
        .ok_or_else(|| ApiError::not_found("Appointment not found").into())
}

/// Attaches each appointment's services, keeping the booking order.
async fn hydrate(conn: &mut SqliteConnection, rows: Vec<AppointmentRow>) -> Result<Vec<AppointmentView>> {
    let mut by_appointment: HashMap<i64, Vec<Service>> = HashMap::new();

    for chunk in rows.chunks(HYDRATE_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT aps.appointment_id, s.id, s.name, s.description, s.price, s.duration
               FROM appointment_services aps
               JOIN services s ON s.id = aps.service_id
               WHERE aps.appointment_id IN ("#,
        );
        let mut separated = qb.separated(", ");
        for row in chunk {
            separated.push_bind(row.id);
        }
        separated.push_unseparated(") ORDER BY aps.appointment_id, aps.position");

        let linked = qb.build_query_as::<LinkedService>().fetch_all(&mut *conn).await?;
        for service in linked {
            by_appointment
                .entry(service.appointment_id)
                .or_default()
                .push(service.into());
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let services = by_appointment.remove(&row.id).unwrap_or_default();
            AppointmentView::from_row(row, services)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_keys_map_to_columns() {
        assert_eq!(sort_clause(None), "a.date, a.start_time");
        assert_eq!(sort_clause(Some("barber,startTime")), "b.name, a.start_time");
        assert_eq!(sort_clause(Some("status, nope")), "a.status");
        assert_eq!(sort_clause(Some("drop table;")), "a.date, a.start_time");
    }

    #[test]
    fn interval_uses_default_duration_when_empty() {
        let start = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert_eq!(appointment_interval(start, 0).unwrap(), Interval::new(600, 630));
        assert_eq!(appointment_interval(start, 45).unwrap(), Interval::new(600, 645));
    }

    #[test]
    fn interval_rejects_running_past_midnight() {
        let late = NaiveTime::from_hms_opt(23, 45, 0).unwrap();
        assert!(appointment_interval(late, 30).is_err());
    }
}
