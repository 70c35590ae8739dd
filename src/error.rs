use std::time::Duration;

use thiserror::Error;

/// Result type for all stakeout operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An element lookup exceeded its timeout without any match. Distinct
    /// from a transport failure: the page was reachable, the node was not.
    #[error("no element matching {selector:?} after {timeout:?}")]
    NotFound { selector: String, timeout: Duration },

    /// A poll loop's predicate never held before the deadline.
    #[error("condition {condition:?} not met within {timeout:?} (last value: {last_value:?})")]
    PollTimeout {
        condition: String,
        timeout: Duration,
        last_value: Option<String>,
    },

    /// A retrying expectation's matcher never passed before the deadline.
    /// Carries the last observed mismatch so the failure is diagnosable
    /// without re-running.
    #[error("expectation {expectation:?} not satisfied within {elapsed:?} (last mismatch: {last_mismatch:?})")]
    AssertionTimeout {
        expectation: String,
        last_mismatch: Option<String>,
        elapsed: Duration,
    },

    /// A one-shot (non-polling) assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// `wait_until` was called on a value with no re-fetch capability.
    #[error("{description:?} is not retryable; await it once instead of waiting on it")]
    NotRetryable { description: String },

    /// The matcher cannot be expressed as a poll predicate. Fails
    /// immediately, never after a timeout.
    #[error("matcher `{matcher}` is not supported on retryable values; await the value first, then assert on the resolved result")]
    UnsupportedMatcher { matcher: &'static str },

    /// Window resize verification failed after border compensation.
    #[error("window content size is {actual_width}x{actual_height} after resize, wanted {width}x{height}")]
    WindowSize {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Any failure surfaced by the CDP transport itself. Never retried.
    #[error("transport error: {0}")]
    Transport(#[from] chromiumoxide::error::CdpError),

    /// A remote value could not be decoded into the requested type.
    #[error("could not decode remote value: {0}")]
    Decode(#[from] serde_json::Error),

    /// Programmer error at setup time (bad preset, double configure).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that mean "keep waiting" inside a lookup poll, as
    /// opposed to structural failures that must abort it.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::PollTimeout { .. } | Error::AssertionTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_selector() {
        let err = Error::NotFound {
            selector: "#missing".into(),
            timeout: Duration::from_millis(50),
        };
        let msg = err.to_string();
        assert!(msg.contains("#missing"));
        assert!(msg.contains("50ms"));
        assert!(err.is_timeout());
    }

    #[test]
    fn unsupported_matcher_instructs_to_await() {
        let err = Error::UnsupportedMatcher { matcher: "throw" };
        let msg = err.to_string();
        assert!(msg.contains("`throw`"));
        assert!(msg.contains("await the value first"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn window_size_reports_both_sizes() {
        let err = Error::WindowSize {
            width: 800,
            height: 600,
            actual_width: 780,
            actual_height: 580,
        };
        let msg = err.to_string();
        assert!(msg.contains("780x580"));
        assert!(msg.contains("800x600"));
    }
}
