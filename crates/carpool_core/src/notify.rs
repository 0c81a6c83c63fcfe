//! Outbound notification facade and two in-process implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotifyError;
use crate::model::{Ride, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RideOrganized,
    RideReminder,
}

/// A message for one participant of one ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub role: Role,
    pub ride_id: String,
}

impl Notification {
    /// One notification per participant, driver first.
    pub fn for_both(ride: &Ride, kind: NotificationKind) -> [Notification; 2] {
        [
            Notification {
                kind,
                recipient: ride.driver_user.clone(),
                role: Role::Driver,
                ride_id: ride.id.clone(),
            },
            Notification {
                kind,
                recipient: ride.passenger_user.clone(),
                role: Role::Passenger,
                ride_id: ride.id.clone(),
            },
        ]
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_now(&self, notification: Notification) -> Result<(), NotifyError>;

    async fn send_scheduled(
        &self,
        notification: Notification,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;
}

/// Logs every notification instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_now(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            ride_id = %notification.ride_id,
            "notification sent"
        );
        Ok(())
    }

    async fn send_scheduled(
        &self,
        notification: Notification,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            ride_id = %notification.ride_id,
            %at,
            "notification scheduled"
        );
        Ok(())
    }
}

/// Keeps sent and scheduled notifications in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    scheduled: Mutex<Vec<(Notification, DateTime<Utc>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn scheduled(&self) -> Vec<(Notification, DateTime<Utc>)> {
        self.scheduled.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_now(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Delivery("outbox lock poisoned".into()))?
            .push(notification);
        Ok(())
    }

    async fn send_scheduled(
        &self,
        notification: Notification,
        at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        self.scheduled
            .lock()
            .map_err(|_| NotifyError::Delivery("outbox lock poisoned".into()))?
            .push((notification, at));
        Ok(())
    }
}
