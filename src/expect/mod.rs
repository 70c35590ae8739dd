//! Retrying expectations.
//!
//! `expect(value).to_equal(x).await` — when the subject is a live
//! [`Retryable`], the matcher's check becomes the predicate of a poll loop
//! and the expression resolves once the condition holds against freshly
//! fetched data (or times out). Settled subjects are awaited once and
//! checked once. Matchers whose semantics need pre/post mutation state are
//! refused up front — see [`matchers`] for the full table.

pub mod matchers;

use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};
use crate::retry::{PollOptions, Retryable};

/// Owns the "last observed mismatch" slot.
///
/// When a retrying expectation times out — or the surrounding test
/// framework's own deadline fires first — the most recent expected-vs-actual
/// mismatch is available here for the failure report. The slot is explicit
/// state with an accessor/clear pair so harnesses can reset it
/// deterministically.
#[derive(Debug, Default)]
pub struct ExpectHandler {
    last_mismatch: Mutex<Option<String>>,
}

impl ExpectHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an expectation over `subject`.
    pub fn expect<T: Send + 'static>(&self, subject: Retryable<T>) -> Expectation<'_, T> {
        Expectation {
            subject,
            handler: self,
            options: PollOptions::default(),
            negate: false,
        }
    }

    /// The most recent mismatch recorded by a failing poll attempt, if any.
    pub fn last_mismatch(&self) -> Option<String> {
        self.slot().clone()
    }

    pub fn clear_last_mismatch(&self) {
        *self.slot() = None;
    }

    fn record(&self, mismatch: String) {
        *self.slot() = Some(mismatch);
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.last_mismatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

static DEFAULT_HANDLER: OnceLock<ExpectHandler> = OnceLock::new();

/// The process-wide handler backing [`expect`].
pub fn default_handler() -> &'static ExpectHandler {
    DEFAULT_HANDLER.get_or_init(ExpectHandler::new)
}

/// Begin an expectation on the process-wide handler.
pub fn expect<T: Send + 'static>(subject: Retryable<T>) -> Expectation<'static, T> {
    default_handler().expect(subject)
}

/// A pending assertion over a [`Retryable`] subject.
///
/// Builder calls (`not`, `with_timeout`, `with_poll_interval`) are language
/// only; evaluation happens solely in the terminal matcher methods.
pub struct Expectation<'h, T> {
    subject: Retryable<T>,
    handler: &'h ExpectHandler,
    options: PollOptions,
    negate: bool,
}

impl<'h, T: Send + 'static> Expectation<'h, T> {
    /// Negate the assertion.
    #[allow(clippy::should_implement_trait)]
    pub fn not(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_timeout(timeout);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_interval(interval);
        self
    }

    /// The single evaluation engine behind every supported matcher.
    ///
    /// Retryable subject: the matcher check becomes the poll predicate;
    /// every failing attempt records the mismatch, success clears it, and a
    /// poll timeout surfaces as [`Error::AssertionTimeout`]. Settled
    /// subject: await once, check once.
    async fn verify<P>(self, description: String, predicate: P) -> Result<T>
    where
        T: fmt::Debug,
        P: Fn(&T) -> bool,
    {
        let Expectation {
            subject,
            handler,
            options,
            negate,
        } = self;
        let expectation = if negate {
            format!("not {description}")
        } else {
            description
        };
        let subject_desc = subject.description().to_string();

        if subject.is_retryable() {
            let outcome = subject
                .wait_until(
                    &expectation,
                    |value| {
                        let pass = predicate(value) != negate;
                        if pass {
                            handler.clear_last_mismatch();
                        } else {
                            handler.record(format!(
                                "expected {subject_desc} to {expectation}, last value: {value:?}"
                            ));
                        }
                        pass
                    },
                    &options,
                )
                .await;
            match outcome {
                Ok(value) => Ok(value),
                Err(Error::PollTimeout { timeout, .. }) => Err(Error::AssertionTimeout {
                    expectation: format!("{subject_desc} to {expectation}"),
                    last_mismatch: handler.last_mismatch(),
                    elapsed: timeout,
                }),
                Err(other) => Err(other),
            }
        } else {
            let value = subject.await?;
            if predicate(&value) != negate {
                handler.clear_last_mismatch();
                Ok(value)
            } else {
                let mismatch =
                    format!("expected {subject_desc} to {expectation}, got {value:?}");
                handler.record(mismatch.clone());
                Err(Error::Assertion(mismatch))
            }
        }
    }

    fn refuse(matcher: &'static str) -> Error {
        debug_assert!(!matchers::is_retry_supported(matcher));
        Error::UnsupportedMatcher { matcher }
    }

    // ── generic terminal matchers ──────────────────────────────────────

    pub async fn to_equal(self, expected: T) -> Result<T>
    where
        T: PartialEq + fmt::Debug,
    {
        let description = format!("equal {expected:?}");
        self.verify(description, move |v| *v == expected).await
    }

    pub async fn to_be_above(self, bound: T) -> Result<T>
    where
        T: PartialOrd + fmt::Debug,
    {
        let description = format!("be above {bound:?}");
        self.verify(description, move |v| *v > bound).await
    }

    pub async fn to_be_at_least(self, bound: T) -> Result<T>
    where
        T: PartialOrd + fmt::Debug,
    {
        let description = format!("be at least {bound:?}");
        self.verify(description, move |v| *v >= bound).await
    }

    pub async fn to_be_below(self, bound: T) -> Result<T>
    where
        T: PartialOrd + fmt::Debug,
    {
        let description = format!("be below {bound:?}");
        self.verify(description, move |v| *v < bound).await
    }

    pub async fn to_be_at_most(self, bound: T) -> Result<T>
    where
        T: PartialOrd + fmt::Debug,
    {
        let description = format!("be at most {bound:?}");
        self.verify(description, move |v| *v <= bound).await
    }

    pub async fn to_be_within(self, min: T, max: T) -> Result<T>
    where
        T: PartialOrd + fmt::Debug,
    {
        let description = format!("be within {min:?}..={max:?}");
        self.verify(description, move |v| *v >= min && *v <= max)
            .await
    }

    pub async fn to_be_one_of(self, choices: Vec<T>) -> Result<T>
    where
        T: PartialEq + fmt::Debug,
    {
        let description = format!("be one of {choices:?}");
        self.verify(description, move |v| choices.contains(v)).await
    }

    /// Generic escape hatch: assert an arbitrary named predicate.
    pub async fn to_satisfy<P>(self, description: impl Into<String>, predicate: P) -> Result<T>
    where
        T: fmt::Debug,
        P: Fn(&T) -> bool,
    {
        self.verify(description.into(), predicate).await
    }

    // ── matchers that cannot poll ──────────────────────────────────────
    //
    // These need pre/post mutation state a poll predicate cannot observe.
    // They refuse immediately rather than burning the timeout.

    pub fn to_throw(self) -> Result<T> {
        Err(Self::refuse("throw"))
    }

    pub fn to_respond_to(self, _method: &str) -> Result<T> {
        Err(Self::refuse("respondTo"))
    }

    pub fn to_change(self) -> Result<T> {
        Err(Self::refuse("change"))
    }

    pub fn to_increase(self) -> Result<T> {
        Err(Self::refuse("increase"))
    }

    pub fn to_decrease(self) -> Result<T> {
        Err(Self::refuse("decrease"))
    }

    pub fn by(self, _delta: f64) -> Result<T> {
        Err(Self::refuse("by"))
    }
}

// ── string matchers ────────────────────────────────────────────────────

impl<'h> Expectation<'h, String> {
    pub async fn to_contain(self, needle: impl Into<String>) -> Result<String> {
        let needle = needle.into();
        let description = format!("contain {needle:?}");
        self.verify(description, move |v| v.contains(&needle)).await
    }

    pub async fn to_start_with(self, prefix: impl Into<String>) -> Result<String> {
        let prefix = prefix.into();
        let description = format!("start with {prefix:?}");
        self.verify(description, move |v| v.starts_with(&prefix))
            .await
    }

    pub async fn to_end_with(self, suffix: impl Into<String>) -> Result<String> {
        let suffix = suffix.into();
        let description = format!("end with {suffix:?}");
        self.verify(description, move |v| v.ends_with(&suffix)).await
    }

    pub async fn to_match(self, pattern: Regex) -> Result<String> {
        let description = format!("match /{}/", pattern.as_str());
        self.verify(description, move |v| pattern.is_match(v)).await
    }

    pub async fn to_have_length(self, len: usize) -> Result<String> {
        let description = format!("have length {len}");
        self.verify(description, move |v| v.chars().count() == len)
            .await
    }

    pub async fn to_be_empty(self) -> Result<String> {
        self.verify("be empty".to_string(), |v| v.is_empty()).await
    }
}

// ── boolean matchers ───────────────────────────────────────────────────

impl<'h> Expectation<'h, bool> {
    pub async fn to_be_true(self) -> Result<bool> {
        self.verify("be true".to_string(), |v| *v).await
    }

    pub async fn to_be_false(self) -> Result<bool> {
        self.verify("be false".to_string(), |v| !*v).await
    }
}

// ── numeric matchers ───────────────────────────────────────────────────

impl<'h> Expectation<'h, f64> {
    pub async fn to_be_close_to(self, target: f64, delta: f64) -> Result<f64> {
        let description = format!("be within {delta} of {target}");
        self.verify(description, move |v| (v - target).abs() <= delta)
            .await
    }

    pub async fn to_be_finite(self) -> Result<f64> {
        self.verify("be finite".to_string(), |v| v.is_finite()).await
    }
}

// ── vector matchers ────────────────────────────────────────────────────

impl<'h, U> Expectation<'h, Vec<U>>
where
    U: PartialEq + fmt::Debug + Send + 'static,
{
    pub async fn to_include(self, member: U) -> Result<Vec<U>> {
        let description = format!("include {member:?}");
        self.verify(description, move |v| v.contains(&member)).await
    }

    pub async fn to_have_length(self, len: usize) -> Result<Vec<U>> {
        let description = format!("have length {len}");
        self.verify(description, move |v| v.len() == len).await
    }

    pub async fn to_be_empty(self) -> Result<Vec<U>> {
        self.verify("be empty".to_string(), |v| v.is_empty()).await
    }
}

// ── JSON value matchers ────────────────────────────────────────────────

impl<'h> Expectation<'h, serde_json::Value> {
    pub async fn to_have_key(self, key: impl Into<String>) -> Result<serde_json::Value> {
        let key = key.into();
        let description = format!("have key {key:?}");
        self.verify(description, move |v| {
            v.as_object().is_some_and(|o| o.contains_key(&key))
        })
        .await
    }

    pub async fn to_be_null(self) -> Result<serde_json::Value> {
        self.verify("be null".to_string(), |v| v.is_null()).await
    }

    pub async fn to_exist(self) -> Result<serde_json::Value> {
        self.verify("exist".to_string(), |v| !v.is_null()).await
    }
}

// ── option matchers ────────────────────────────────────────────────────

impl<'h, U> Expectation<'h, Option<U>>
where
    U: fmt::Debug + Send + 'static,
{
    pub async fn to_exist(self) -> Result<Option<U>> {
        self.verify("exist".to_string(), |v| v.is_some()).await
    }

    pub async fn to_be_none(self) -> Result<Option<U>> {
        self.verify("be absent".to_string(), |v| v.is_none()).await
    }
}
