//! # Operator Alerts
//!
//! Free-text notifications for circuit openings and error spikes. Delivery
//! (a moderator channel, a webhook, a pager) belongs to the host application;
//! [`ChannelAlertSink`] hands messages over through a tokio channel.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert receiver dropped")]
    ReceiverDropped,

    #[error("Alert delivery failed: {0}")]
    DeliveryFailed(String),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str) -> Result<(), AlertError>;
}

/// Emits alerts as error-level log events
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn alert(&self, message: &str) -> Result<(), AlertError> {
        error!(alert = %message, "Operator alert");
        Ok(())
    }
}

/// Forwards alerts to a receiver owned by the messaging collaborator
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelAlertSink {
    /// Create the sink and the receiver alerts are delivered to
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    async fn alert(&self, message: &str) -> Result<(), AlertError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| AlertError::ReceiverDropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelAlertSink::new();
        sink.alert("circuit opened for ban_command").await.unwrap();
        assert_eq!(
            rx.recv().await.as_deref(),
            Some("circuit opened for ban_command")
        );
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (sink, rx) = ChannelAlertSink::new();
        drop(rx);
        assert!(matches!(
            sink.alert("lost").await,
            Err(AlertError::ReceiverDropped)
        ));
    }
}
