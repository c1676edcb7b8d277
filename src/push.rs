use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::config::PushConfig;
use crate::error::ApiError;
use crate::models::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscriptionInput {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub subscription: Option<PushSubscriptionInput>,
    pub barber_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct PushSubscriptionRow {
    id: i64,
    endpoint: String,
    p256dh: String,
    auth: String,
}

#[derive(Clone)]
pub struct PushService {
    pool: SqlitePool,
    config: PushConfig,
}

impl PushService {
    pub fn new(pool: SqlitePool, config: PushConfig) -> Self {
        Self { pool, config }
    }

    pub fn public_key(&self) -> &str {
        &self.config.public_key
    }

    /// Stores the browser subscription for `user_id`. A known endpoint moves
    /// to the new user with refreshed keys.
    pub async fn subscribe(
        &self,
        user_id: i64,
        subscription: PushSubscriptionInput,
        barber_id: Option<i64>,
    ) -> Result<()> {
        if subscription.endpoint.trim().is_empty() {
            return Err(ApiError::bad_request("Subscription endpoint is required").into());
        }

        sqlx::query(
            r#"INSERT INTO push_subscriptions (endpoint, p256dh, auth, user_id, barber_id)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(endpoint) DO UPDATE SET
                 p256dh = excluded.p256dh,
                 auth = excluded.auth,
                 user_id = excluded.user_id,
                 barber_id = excluded.barber_id"#,
        )
        .bind(&subscription.endpoint)
        .bind(&subscription.keys.p256dh)
        .bind(&subscription.keys.auth)
        .bind(user_id)
        .bind(barber_id)
        .execute(&self.pool)
        .await?;

        info!("Push subscription stored for user {}", user_id);
        Ok(())
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ?")
            .bind(endpoint.trim())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fire-and-forget delivery so request handlers never wait on push services.
    pub fn notify_admins_in_background(&self, title: String, body: String) {
        if !self.config.enabled() {
            return;
        }
        let service = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(err) = service.notify_admins(&title, &body).await {
                warn!("Admin push notification failed: {:#}", err);
            }
        });
    }

    pub async fn notify_admins(&self, title: &str, body: &str) -> Result<()> {
        if !self.config.enabled() {
            return Ok(());
        }

        let rows = sqlx::query_as::<_, PushSubscriptionRow>(
            r#"SELECT s.id, s.endpoint, s.p256dh, s.auth
               FROM push_subscriptions s
               JOIN users u ON u.id = s.user_id
               WHERE u.role = ?"#,
        )
        .bind(Role::Admin)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(());
        }

        let payload = serde_json::json!({
            "notification": {
                "title": title,
                "body": body,
                "icon": "/assets/logo.png"
            }
        })
        .to_string();

        info!("Sending push notification to {} admin subscriptions", rows.len());
        for row in rows {
            let id = row.id;
            if let Err(err) = send_push(&self.config, row, &payload).await {
                warn!("Push send failed: {err}");
                if is_gone(&err) {
                    sqlx::query("DELETE FROM push_subscriptions WHERE id = ?")
                        .bind(id)
                        .execute(&self.pool)
                        .await?;
                    info!("Removed expired push subscription {}", id);
                }
            }
        }

        Ok(())
    }
}

/// The push service answered 404 or 410: the subscription no longer exists.
fn is_gone(err: &WebPushError) -> bool {
    matches!(err, WebPushError::EndpointNotValid | WebPushError::EndpointNotFound)
}

async fn send_push(
    config: &PushConfig,
    row: PushSubscriptionRow,
    payload: &str,
) -> Result<(), WebPushError> {
    let subscription = SubscriptionInfo::new(row.endpoint, row.p256dh, row.auth);
    let mut builder = WebPushMessageBuilder::new(&subscription);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());

    let mut vapid_builder =
        VapidSignatureBuilder::from_base64(&config.private_key, URL_SAFE_NO_PAD, &subscription)?;
    vapid_builder.add_claim("sub", config.subject.clone());

    builder.set_vapid_signature(vapid_builder.build()?);

    let client = IsahcWebPushClient::new()?;
    client.send(builder.build()?).await?;
    Ok(())
}
