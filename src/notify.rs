//! Uploader notifications.
//!
//! The workflow hands a [`Notification`] to a [`Notifier`] after a transition
//! commits. Delivery (chat message, email) belongs to whatever drains the
//! notifier; a failed send is logged by the caller and never undoes the
//! transition.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum notifications held before the oldest are dropped.
const OUTBOX_CAPACITY: usize = 500;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notifier lock poisoned")]
    LockPoisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DocumentApproved,
    DocumentRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Uploader identifier (user id or channel sender id).
    pub recipient: String,
    pub document_id: Uuid,
    pub document_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn approved(
        recipient: &str,
        document_id: Uuid,
        document_name: &str,
        folder: Option<&str>,
    ) -> Self {
        let message = match folder {
            Some(folder) => format!("'{document_name}' was approved and filed to {folder}"),
            None => format!("'{document_name}' was approved"),
        };
        Self::build(
            NotificationKind::DocumentApproved,
            recipient,
            document_id,
            document_name,
            message,
        )
    }

    pub fn rejected(recipient: &str, document_id: Uuid, document_name: &str, reason: &str) -> Self {
        Self::build(
            NotificationKind::DocumentRejected,
            recipient,
            document_id,
            document_name,
            format!("'{document_name}' was rejected: {reason}"),
        )
    }

    fn build(
        kind: NotificationKind,
        recipient: &str,
        document_id: Uuid,
        document_name: &str,
        message: String,
    ) -> Self {
        Self {
            kind,
            recipient: recipient.to_string(),
            document_id,
            document_name: document_name.to_string(),
            message,
            created_at: Utc::now(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            document_id = %notification.document_id,
            "{}",
            notification.message
        );
        Ok(())
    }
}

/// Buffers notifications for a dispatcher to drain.
pub struct OutboxNotifier {
    buffer: Mutex<Vec<Notification>>,
}

impl OutboxNotifier {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of buffered notifications.
    pub fn entries(&self) -> Vec<Notification> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Take every buffered notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OutboxNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for OutboxNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut buf = self.buffer.lock().map_err(|_| NotifyError::LockPoisoned)?;
        if buf.len() >= OUTBOX_CAPACITY {
            buf.remove(0);
            tracing::warn!(capacity = OUTBOX_CAPACITY, "Notification outbox full, dropping oldest");
        }
        buf.push(notification.clone());
        Ok(())
    }
}
