use anyhow::Result;
use log::info;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{hhmm, BlockedSlot, BlockedSlotInput};

const COLUMNS: &str = "id, date, start_time, end_time, barber_id, reason";

pub struct BlockedSlotService {
    pool: SqlitePool,
}

/// Normalises an optional "HH:MM" field. Blank means absent.
fn normalise_time(raw: Option<&str>, field: &str) -> Result<Option<String>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => hhmm::parse(raw)
            .map(|t| Some(t.format("%H:%M").to_string()))
            .map_err(|_| ApiError::bad_request(format!("{} must be HH:MM, got '{}'", field, raw)).into()),
    }
}

impl BlockedSlotService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<BlockedSlot>> {
        let slots = sqlx::query_as::<_, BlockedSlot>(&format!(
            "SELECT {COLUMNS} FROM blocked_slots ORDER BY date, start_time"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(slots)
    }

    /// A block without a start covers the whole day; without an end it
    /// covers half an hour.
    pub async fn create(&self, input: BlockedSlotInput) -> Result<BlockedSlot> {
        let start_time = normalise_time(input.start_time.as_deref(), "startTime")?;
        let end_time = normalise_time(input.end_time.as_deref(), "endTime")?;

        match (&start_time, &end_time) {
            (None, Some(_)) => {
                return Err(ApiError::bad_request("endTime requires a startTime").into());
            }
            (Some(start), Some(end)) if end <= start => {
                return Err(ApiError::bad_request("endTime must be after startTime").into());
            }
            _ => {}
        }

        if let Some(barber_id) = input.barber_id {
            let exists = sqlx::query_as::<_, (i64,)>("SELECT id FROM barbers WHERE id = ?")
                .bind(barber_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(ApiError::not_found("Barber not found").into());
            }
        }

        let slot = sqlx::query_as::<_, BlockedSlot>(&format!(
            "INSERT INTO blocked_slots (date, start_time, end_time, barber_id, reason) \
             VALUES (?, ?, ?, ?, ?) RETURNING {COLUMNS}"
        ))
        .bind(input.date)
        .bind(start_time)
        .bind(end_time)
        .bind(input.barber_id)
        .bind(input.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()))
        .fetch_one(&self.pool)
        .await?;

        info!(
            "Blocked {} {}-{} for {}",
            slot.date,
            slot.start_time.as_deref().unwrap_or("all day"),
            slot.end_time.as_deref().unwrap_or(""),
            slot.barber_id
                .map_or_else(|| "all barbers".to_string(), |id| format!("barber {}", id))
        );
        Ok(slot)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM blocked_slots WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Blocked slot not found").into());
        }
        info!("Blocked slot {} removed", id);
        Ok(())
    }
}
