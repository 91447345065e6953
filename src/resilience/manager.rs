//! # Circuit Breaker Registry
//!
//! Owns one [`CircuitBreaker`] per label. Breakers are created lazily the
//! first time a label fails and live for the lifetime of the registry.

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Existing breaker for a label, without creating one
    pub fn get(&self, label: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(label).map(|entry| Arc::clone(entry.value()))
    }

    /// Get or create the breaker for a label
    pub fn get_or_create(&self, label: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(label) {
            return existing;
        }

        let entry = self.breakers.entry(label.to_string()).or_insert_with(|| {
            info!(component = label, "Created new circuit breaker");
            Arc::new(CircuitBreaker::new(label, self.config.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Labels with a breaker
    pub fn labels(&self) -> Vec<String> {
        self.breakers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Labels whose breaker is currently open
    pub fn open_labels(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        open.sort();
        open
    }

    /// Metrics snapshot for every breaker
    pub fn metrics(&self) -> HashMap<String, CircuitBreakerMetrics> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect()
    }

    /// Remove the breaker for a label; returns true when one existed
    pub fn remove(&self, label: &str) -> bool {
        self.breakers.remove(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
