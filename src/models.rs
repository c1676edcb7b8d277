use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
    Done,
    Blocked,
    Modified,
}

impl AppointmentStatus {
    /// Statuses that keep the barber's time taken.
    pub fn occupies_slot(self) -> bool {
        matches!(self, Self::Booked | Self::Blocked | Self::Modified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booked => "BOOKED",
            Self::Cancelled => "CANCELLED",
            Self::Done => "DONE",
            Self::Blocked => "BLOCKED",
            Self::Modified => "MODIFIED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub role: Role,
    pub total_appointments: i64,
    pub available_rewards: i64,
    pub used_rewards: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Barber {
    pub id: i64,
    pub name: String,
    pub speciality: String,
    pub photo: String,
    pub description: Option<String>,
    pub start_hour: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSlot {
    pub id: i64,
    pub date: NaiveDate,
    /// "HH:MM"; none blocks the whole day.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub barber_id: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AdminMessage {
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub sender_name: String,
    pub timestamp: NaiveDateTime,
}

/// Flat appointment row joined with its user and barber.
#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub user_id: Option<i64>,
    pub barber_id: Option<i64>,
    pub total_price: f64,
    pub reward_applied: bool,
    pub admin_viewed: bool,
    pub user_name: Option<String>,
    pub user_first_name: Option<String>,
    pub user_phone: Option<String>,
    pub user_email: Option<String>,
    pub barber_name: Option<String>,
    pub barber_speciality: Option<String>,
    pub barber_photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub first_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarberSummary {
    pub id: i64,
    pub name: String,
    pub speciality: String,
    pub photo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: i64,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub user: Option<UserSummary>,
    pub barber: Option<BarberSummary>,
    pub services: Vec<Service>,
    pub total_price: f64,
    pub reward_applied: bool,
    pub admin_viewed: bool,
}

impl AppointmentView {
    pub fn from_row(row: AppointmentRow, services: Vec<Service>) -> Self {
        let user = row.user_id.map(|id| UserSummary {
            id,
            name: row.user_name.unwrap_or_default(),
            first_name: row.user_first_name,
            phone: row.user_phone,
            email: row.user_email,
        });
        let barber = row.barber_id.map(|id| BarberSummary {
            id,
            name: row.barber_name.unwrap_or_default(),
            speciality: row.barber_speciality.unwrap_or_default(),
            photo: row.barber_photo.unwrap_or_default(),
        });

        Self {
            id: row.id,
            date: row.date,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status,
            user,
            barber,
            services,
            total_price: row.total_price,
            reward_applied: row.reward_applied,
            admin_viewed: row.admin_viewed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub barber_id: i64,
    #[serde(default)]
    pub service_ids: Vec<i64>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub user_name: Option<String>,
    pub user_first_name: Option<String>,
    pub user_phone: Option<String>,
    pub user_email: Option<String>,
    #[serde(default)]
    pub use_reward: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyRequest {
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFilter {
    pub barber_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub q: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub barber_id: i64,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSlotInput {
    pub date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub barber_id: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub duration: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarberInput {
    pub name: String,
    #[serde(default)]
    pub speciality: String,
    #[serde(default)]
    pub photo: String,
    pub description: Option<String>,
    pub start_hour: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub name: String,
    pub available_rewards: i64,
}

/// Wall-clock times on the wire as "HH:MM"; "HH:MM:SS" is accepted on input.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
    }
}
