//! Outbound rate governor timing against the wall clock

use resilience_core::outbound::{OutboundError, RateGovernor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_rate_limited_call_waits_hint_and_succeeds() {
    let governor = RateGovernor::default();
    let calls = AtomicUsize::new(0);
    let start = Instant::now();

    let result = governor
        .execute("POST /channels/9/messages", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(OutboundError::too_many_requests(Some(Duration::from_millis(200))))
                } else {
                    Ok("message sent")
                }
            }
        })
        .await;

    assert_eq!(result, Ok("message sent"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_concurrent_callers_share_the_window() {
    let governor = Arc::new(RateGovernor::default());
    let first_call = Arc::new(AtomicUsize::new(0));

    let limited = {
        let governor = Arc::clone(&governor);
        let first_call = Arc::clone(&first_call);
        tokio::spawn(async move {
            governor
                .execute("PATCH /guilds/1", || {
                    let n = first_call.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            Err(OutboundError::too_many_requests(Some(Duration::from_millis(300))))
                        } else {
                            Ok(())
                        }
                    }
                })
                .await
        })
    };

    // Give the first caller time to record the window
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(governor.is_blocked("PATCH /guilds/1"));

    let start = Instant::now();
    let second = governor
        .execute("PATCH /guilds/1", || async { Ok::<_, OutboundError>(()) })
        .await;
    assert!(second.is_ok());
    assert!(start.elapsed() >= Duration::from_millis(200));

    assert!(limited.await.unwrap().is_ok());
    assert_eq!(governor.active_windows(), 0);
}
