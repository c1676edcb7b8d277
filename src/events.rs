use actix_web::web::Bytes;
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::AppointmentView;

/// Reconnect delay advertised to EventSource clients.
pub const RETRY_MILLIS: u64 = 5000;
const CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Cancelled,
    Modified,
    Deleted,
    Locked,
    Unlocked,
}

/// One appointment change. Deleted and unlocked events carry the last
/// known state of the removed appointment.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentEvent {
    pub kind: ChangeKind,
    pub appointment: AppointmentView,
}

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<AppointmentEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, kind: ChangeKind, appointment: AppointmentView) {
        let id = appointment.id;
        match self.sender.send(AppointmentEvent { kind, appointment }) {
            Ok(listeners) => debug!("Appointment {} {:?} sent to {} listeners", id, kind, listeners),
            Err(_) => debug!("Appointment {} {:?} had no listeners", id, kind),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppointmentEvent> {
        self.sender.subscribe()
    }
}

pub fn retry_frame() -> Bytes {
    Bytes::from(format!("retry: {}\n\n", RETRY_MILLIS))
}

pub fn event_to_bytes(event: &AppointmentEvent) -> Bytes {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("event: appointment\ndata: {}\n\n", payload))
}
