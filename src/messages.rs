use anyhow::Result;
use chrono::Local;
use log::info;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::{AdminMessage, User};

const MAX_MESSAGES: i64 = 200;

/// Staff chat board shown on the admin dashboard.
pub struct MessageService {
    pool: SqlitePool,
}

impl MessageService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent messages, oldest first.
    pub async fn list(&self) -> Result<Vec<AdminMessage>> {
        let messages = sqlx::query_as::<_, AdminMessage>(
            r#"SELECT id, content, sender_id, sender_name, timestamp FROM (
                   SELECT id, content, sender_id, sender_name, timestamp
                   FROM admin_messages ORDER BY timestamp DESC, id DESC LIMIT ?
               ) ORDER BY timestamp, id"#,
        )
        .bind(MAX_MESSAGES)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    pub async fn send(&self, sender: &User, content: &str) -> Result<AdminMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::bad_request("Message content is required").into());
        }

        let sender_name = sender.username.clone().unwrap_or_else(|| sender.name.clone());
        let message = sqlx::query_as::<_, AdminMessage>(
            r#"INSERT INTO admin_messages (content, sender_id, sender_name, timestamp)
               VALUES (?, ?, ?, ?)
               RETURNING id, content, sender_id, sender_name, timestamp"#,
        )
        .bind(content)
        .bind(sender.id)
        .bind(&sender_name)
        .bind(Local::now().naive_local())
        .fetch_one(&self.pool)
        .await?;

        info!("Chat message {} from {}", message.id, sender_name);
        Ok(message)
    }
}
