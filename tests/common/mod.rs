//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use resilience_core::config::ExecutorConfig;
use resilience_core::resilience::{
    AuditEntry, AuditError, AuditSink, ChannelAlertSink, ResilientExecutor,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Audit sink that keeps every row in memory
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

pub struct TestExecutor {
    pub executor: ResilientExecutor,
    pub audit: Arc<RecordingAuditSink>,
    pub alerts: UnboundedReceiver<String>,
}

pub fn test_executor(config: ExecutorConfig) -> TestExecutor {
    let audit = Arc::new(RecordingAuditSink::default());
    let (alert_sink, alerts) = ChannelAlertSink::new();
    let executor = ResilientExecutor::new(config, audit.clone(), Arc::new(alert_sink));
    TestExecutor {
        executor,
        audit,
        alerts,
    }
}
