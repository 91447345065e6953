//! Resilient executor behaviour across circuit-breaker, recovery and
//! message-classification paths

mod common;

use common::test_executor;
use proptest::prelude::*;
use resilience_core::config::ExecutorConfig;
use resilience_core::resilience::{
    CircuitState, ExecutorError, OperationError, CIRCUIT_OPEN_MESSAGE, STORAGE_BUSY_MESSAGE,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fail_always(message: &'static str) -> impl Fn() -> std::future::Ready<Result<(), OperationError>> {
    move || std::future::ready(Err(OperationError::from(message)))
}

#[tokio::test(start_paused = true)]
async fn test_ban_command_opens_then_probes_after_reset_timeout() {
    let harness = test_executor(ExecutorConfig::default());
    let executor = &harness.executor;

    for attempt in 1..=5 {
        assert!(!executor.is_circuit_broken("ban_command"), "open before failure {attempt}");
        let outcome = executor
            .wrap("ban_command", fail_always("upstream exploded"), None)
            .await;
        assert!(!outcome.is_success());
    }
    assert!(executor.is_circuit_broken("ban_command"));

    // Before the reset timeout: fail fast without invoking the unit of work
    tokio::time::advance(Duration::from_secs(30)).await;
    let calls = AtomicUsize::new(0);
    let outcome = executor
        .wrap(
            "ban_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>("banned") }
            },
            None,
        )
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        outcome.error(),
        Some(ExecutorError::CircuitOpen { label, .. }) if label == "ban_command"
    ));
    assert_eq!(outcome.user_message.as_deref(), Some(CIRCUIT_OPEN_MESSAGE));

    // Past the reset timeout: the half-open probe runs and closes the circuit
    tokio::time::advance(Duration::from_secs(30) + Duration::from_millis(1)).await;
    let outcome = executor
        .wrap(
            "ban_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>("banned") }
            },
            None,
        )
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.value(), Some(&"banned"));
    assert_eq!(executor.circuit_state("ban_command"), Some(CircuitState::Closed));
    assert!(!executor.is_circuit_broken("ban_command"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_reopens_circuit() {
    let harness = test_executor(ExecutorConfig::default());
    let executor = &harness.executor;

    for _ in 0..5 {
        executor.wrap("kick_command", fail_always("boom"), None).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    let outcome = executor.wrap("kick_command", fail_always("boom"), None).await;
    assert!(matches!(outcome.error(), Some(ExecutorError::Operation(_))));
    assert!(executor.is_circuit_broken("kick_command"));

    // The reopened circuit measures its timeout from the probe failure
    tokio::time::advance(Duration::from_secs(59)).await;
    let outcome = executor.wrap("kick_command", fail_always("boom"), None).await;
    assert!(outcome.error().is_some_and(ExecutorError::is_circuit_open));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_probe_does_not_wedge_circuit() {
    let harness = test_executor(ExecutorConfig::default());
    let executor = &harness.executor;

    for _ in 0..5 {
        executor.wrap("ban_command", fail_always("boom"), None).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    // The caller gives up on a probe that never completes
    let calls = AtomicUsize::new(0);
    let timed_out = tokio::time::timeout(
        Duration::from_secs(1),
        executor.wrap(
            "ban_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<(), OperationError>>()
            },
            None,
        ),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Abandoning the probe reopens the circuit from that moment
    assert!(executor.is_circuit_broken("ban_command"));
    assert_eq!(executor.circuit_state("ban_command"), Some(CircuitState::Open));

    tokio::time::advance(Duration::from_secs(3600)).await;
    let outcome = executor
        .wrap(
            "ban_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>("banned") }
            },
            None,
        )
        .await;
    assert_eq!(outcome.value(), Some(&"banned"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(executor.circuit_state("ban_command"), Some(CircuitState::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_hung_probe_is_superseded_after_reset_timeout() {
    let harness = test_executor(ExecutorConfig::default());
    let executor = &harness.executor;

    for _ in 0..5 {
        executor.wrap("kick_command", fail_always("boom"), None).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    let mut hung = Box::pin(executor.wrap(
        "kick_command",
        || std::future::pending::<Result<(), OperationError>>(),
        None,
    ));
    assert!(futures::poll!(hung.as_mut()).is_pending());
    assert_eq!(executor.circuit_state("kick_command"), Some(CircuitState::HalfOpen));

    // Other callers fail fast while the probe is young
    let outcome = executor
        .wrap("kick_command", || async { Ok::<_, OperationError>(()) }, None)
        .await;
    assert!(outcome.error().is_some_and(ExecutorError::is_circuit_open));

    // A full reset timeout later a new probe is let through
    tokio::time::advance(Duration::from_secs(60)).await;
    let outcome = executor
        .wrap("kick_command", || async { Ok::<_, OperationError>(()) }, None)
        .await;
    assert!(outcome.is_success());
    assert_eq!(executor.circuit_state("kick_command"), Some(CircuitState::Closed));

    // The stale probe no longer owns the slot
    drop(hung);
    assert_eq!(executor.circuit_state("kick_command"), Some(CircuitState::Closed));
}

#[tokio::test]
async fn test_database_errors_are_not_retried() {
    let harness = test_executor(ExecutorConfig {
        storage_busy_retry_delay_ms: 10,
        ..ExecutorConfig::default()
    });
    let calls = AtomicUsize::new(0);

    let outcome = harness
        .executor
        .wrap(
            "warn_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(OperationError::from(
                        "UNIQUE constraint failed: database warnings.id",
                    ))
                }
            },
            None,
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!outcome.recovered);
    assert_eq!(outcome.user_message.as_deref(), Some(STORAGE_BUSY_MESSAGE));
    assert!(!harness.audit.entries()[0].recovery_attempted);
}

#[tokio::test]
async fn test_busy_marker_retries_even_when_message_mentions_timeout() {
    let harness = test_executor(ExecutorConfig {
        storage_busy_retry_delay_ms: 10,
        ..ExecutorConfig::default()
    });
    let calls = AtomicUsize::new(0);

    let outcome = harness
        .executor
        .wrap(
            "warn_command",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OperationError::from("SQLITE_BUSY: query timed out"))
                    } else {
                        Ok("warned")
                    }
                }
            },
            None,
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(outcome.recovered);
    assert_eq!(outcome.value(), Some(&"warned"));
}

#[tokio::test]
async fn test_storage_busy_recovers_with_exactly_one_retry() {
    let harness = test_executor(ExecutorConfig {
        storage_busy_retry_delay_ms: 10,
        ..ExecutorConfig::default()
    });
    let calls = AtomicUsize::new(0);

    let outcome = harness
        .executor
        .wrap(
            "warn_command",
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OperationError::from("SQLITE_BUSY: database is locked"))
                    } else {
                        Ok(n)
                    }
                }
            },
            Some(serde_json::json!({"guild_id": "42", "user_id": "7"})),
        )
        .await;

    assert!(outcome.is_success());
    assert!(outcome.recovered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let entries = harness.audit.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].recovery_attempted);
    assert_eq!(entries[0].label, "warn_command");
    assert_eq!(
        entries[0].context_json,
        Some(serde_json::json!({"guild_id": "42", "user_id": "7"}))
    );
}

#[tokio::test]
async fn test_missing_permission_maps_to_permission_message() {
    let harness = test_executor(ExecutorConfig::default());
    let calls = AtomicUsize::new(0);

    let outcome = harness
        .executor
        .wrap(
            "ban_command",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(OperationError::from("Missing permission: BAN_MEMBERS")) }
            },
            None,
        )
        .await;

    assert!(!outcome.is_success());
    assert!(outcome
        .user_message
        .as_deref()
        .is_some_and(|m| m.to_lowercase().contains("permission")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_keyword_taxonomy_without_strategies() {
    let harness = test_executor(ExecutorConfig {
        register_default_strategies: false,
        ..ExecutorConfig::default()
    });

    let cases = [
        ("Request timed out after 3000ms", "too long"),
        ("Unknown Message", "couldn't find"),
        ("You are being rate limited", "rate limited"),
        ("database connection pool exhausted", "database is busy"),
        ("something unexpected", "went wrong"),
    ];

    for (message, expected) in cases {
        let outcome = harness
            .executor
            .wrap("lookup", fail_always(message), None)
            .await;
        let user_message = outcome.user_message.unwrap_or_default().to_lowercase();
        assert!(
            user_message.contains(expected),
            "{message:?} produced {user_message:?}"
        );
    }
}

#[tokio::test]
async fn test_raw_errors_never_reach_user_message() {
    let harness = test_executor(ExecutorConfig::default());
    let err = anyhow::anyhow!("pool timed out").context("loading guild config");

    let outcome = harness
        .executor
        .wrap(
            "config_command",
            || {
                let err = OperationError::from(anyhow::anyhow!("{err:#}"));
                async move { Err::<(), _>(err) }
            },
            None,
        )
        .await;

    let user_message = outcome.user_message.unwrap_or_default();
    assert!(!user_message.contains("loading guild config"));
    assert!(harness.audit.entries()[0]
        .error_message
        .contains("loading guild config"));
}

#[tokio::test]
async fn test_stats_track_executions_and_open_circuits() {
    let mut harness = test_executor(ExecutorConfig {
        failure_threshold: 2,
        ..ExecutorConfig::default()
    });

    harness
        .executor
        .wrap("ping", || async { Ok::<_, OperationError>(()) }, None)
        .await;
    for _ in 0..3 {
        harness.executor.wrap("mute_command", fail_always("boom"), None).await;
    }

    let stats = harness.executor.stats();
    assert_eq!(stats.total_executions, 4);
    assert_eq!(stats.total_failures, 3);
    assert_eq!(stats.open_circuits, vec!["mute_command".to_string()]);
    assert_eq!(stats.recent_errors, 2);
    assert_eq!(stats.circuit_breakers["mute_command"].rejected_count, 1);

    let alert = harness.alerts.recv().await.expect("circuit alert");
    assert!(alert.contains("mute_command"));
    assert!(alert.contains("State: Failing"), "{alert}");
}

proptest! {
    /// Property: the circuit opens exactly at the configured threshold
    #[test]
    fn circuit_opens_exactly_at_threshold(threshold in 1u32..12) {
        tokio_test::block_on(async {
            let harness = test_executor(ExecutorConfig {
                failure_threshold: threshold,
                ..ExecutorConfig::default()
            });

            for _ in 0..threshold - 1 {
                harness.executor.wrap("label", fail_always("boom"), None).await;
            }
            prop_assert!(!harness.executor.is_circuit_broken("label"));

            harness.executor.wrap("label", fail_always("boom"), None).await;
            prop_assert!(harness.executor.is_circuit_broken("label"));
            Ok(())
        })?;
    }

    /// Property: a success before the threshold resets the failure count
    #[test]
    fn success_resets_failure_count(before in 1u32..5, after in 1u32..5) {
        tokio_test::block_on(async {
            let harness = test_executor(ExecutorConfig::default());

            for _ in 0..before {
                harness.executor.wrap("label", fail_always("boom"), None).await;
            }
            harness
                .executor
                .wrap("label", || async { Ok::<_, OperationError>(()) }, None)
                .await;
            for _ in 0..after {
                harness.executor.wrap("label", fail_always("boom"), None).await;
            }

            // At most 4 consecutive failures after the reset, below the default threshold of 5
            prop_assert!(!harness.executor.is_circuit_broken("label"));
            prop_assert_eq!(
                harness.executor.stats().circuit_breakers["label"].consecutive_failures,
                after
            );
            Ok(())
        })?;
    }
}
