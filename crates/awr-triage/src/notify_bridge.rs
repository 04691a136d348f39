//! Notification transports implementing [`Notifier`].
//!
//! `WebhookNotifier` POSTs a JSON message to a relay (mail gateway, chat
//! webhook). `LogNotifier` only logs, for runs without a relay configured.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use triage_core::{Notification, NotificationError, Notifier};

#[derive(Debug, Serialize)]
pub struct WebhookMessage<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
}

impl<'a> WebhookMessage<'a> {
    pub fn new(sender: &'a str, notification: &'a Notification) -> Self {
        Self {
            from: sender,
            to: &notification.recipient,
            subject: &notification.subject,
            body: &notification.body,
        }
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    sender: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotificationError::MissingRecipient);
        }
        debug!(to = %notification.recipient, subject = %notification.subject, "Sending notification");
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookMessage::new(&self.sender, notification))
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(NotificationError::Transport(format!("HTTP {status}: {text}")));
        }
        info!(to = %notification.recipient, subject = %notification.subject, "Notification sent");
        Ok(())
    }
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        info!(
            to = %notification.recipient,
            subject = %notification.subject,
            body = %notification.body,
            "Notification (no webhook configured)"
        );
        Ok(())
    }
}
