use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Default deadline for a poll, matching the usual assertion-library default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between poll attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout and cadence for a single poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Repeatedly invoke `fetch` until `predicate` holds for the produced value,
/// or `options.timeout` elapses.
///
/// A fetch error propagates immediately and terminates the poll — permanent
/// failures (element gone, session dead) are not "failed attempts". Each
/// fetched value is held in an explicit present/absent slot, so values that
/// merely look empty (`""`, `0`, `false`) are still tested against the
/// predicate rather than treated as "nothing produced".
///
/// Dropping the returned future cancels the poll at its next suspension
/// point; an abandoned poll never outlives its caller.
pub async fn poll_until<T, F, Fut, P>(
    condition: &str,
    fetch: F,
    predicate: P,
    options: &PollOptions,
) -> Result<T>
where
    T: fmt::Debug,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let mut last_seen: Option<T> = None;

    loop {
        let sample = fetch().await?;
        if predicate(&sample) {
            return Ok(sample);
        }
        last_seen = Some(sample);

        if start.elapsed() >= options.timeout {
            return Err(Error::PollTimeout {
                condition: condition.to_string(),
                timeout: options.timeout,
                last_value: last_seen.map(|v| format!("{v:?}")),
            });
        }
        tokio::time::sleep(options.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast() -> PollOptions {
        PollOptions::new()
            .with_timeout(Duration::from_millis(200))
            .with_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn resolves_once_predicate_holds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = poll_until(
            "counter reaches 3",
            move || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst)) }
            },
            |v| *v == 3,
            &fast(),
        )
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn falsy_values_are_still_present() {
        // "" first, then a real value; the empty string must be evaluated,
        // not mistaken for absence, and must not satisfy the predicate.
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = poll_until(
            "text becomes non-empty",
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Ok(if n == 0 { String::new() } else { "nonempty".to_string() })
                }
            },
            |v: &String| !v.is_empty(),
            &fast(),
        )
        .await
        .unwrap();
        assert_eq!(value, "nonempty");
    }

    #[tokio::test]
    async fn waiting_for_a_falsy_target_succeeds() {
        let value = poll_until(
            "count drops to zero",
            || async { Ok(0_u32) },
            |v| *v == 0,
            &fast(),
        )
        .await
        .unwrap();
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn timeout_names_the_condition_and_last_value() {
        let err = poll_until(
            "flag becomes true",
            || async { Ok(false) },
            |v| *v,
            &PollOptions::new()
                .with_timeout(Duration::from_millis(30))
                .with_interval(Duration::from_millis(5)),
        )
        .await
        .unwrap_err();
        match err {
            Error::PollTimeout {
                condition,
                timeout,
                last_value,
            } => {
                assert_eq!(condition, "flag becomes true");
                assert_eq!(timeout, Duration::from_millis(30));
                assert_eq!(last_value.as_deref(), Some("false"));
            }
            other => panic!("expected PollTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_error_terminates_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let err = poll_until(
            "never gets a chance",
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<bool, _>(Error::Configuration("boom".into()))
                }
            },
            |v| *v,
            &fast(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // No retries after the failure.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
