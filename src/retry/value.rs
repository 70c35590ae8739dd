use std::fmt;
use std::future::{Future, IntoFuture};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::retry::poll::{poll_until, PollOptions};

/// A re-invokable fetch producing a fresh value on every call.
type Refetch<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

enum Source<T> {
    /// A one-shot value. Awaitable exactly once, no re-fetch capability.
    Settled(BoxFuture<'static, Result<T>>),
    /// A live read whose closure can be re-invoked to observe fresh state.
    Live(Refetch<T>),
}

/// An awaitable eventual value with an optional re-fetch capability.
///
/// Values read from a live data source (element text, attributes, page
/// title) are constructed with [`Retryable::live`]: every transform chained
/// through [`map`](Retryable::map) is composed *into the fetch closure*, so
/// a later [`wait_until`](Retryable::wait_until) re-applies the whole chain
/// to each freshly fetched raw value — never to a stale cached result.
///
/// Plain values and already-running futures are wrapped with
/// [`Retryable::settled`] / [`Retryable::from_future`]; these resolve once
/// and refuse to poll.
pub struct Retryable<T> {
    source: Source<T>,
    description: String,
}

impl<T: Send + 'static> Retryable<T> {
    /// Wrap an already-known value. Not retryable.
    pub fn settled(value: T) -> Self {
        Self {
            source: Source::Settled(Box::pin(async move { Ok(value) })),
            description: "settled value".to_string(),
        }
    }

    /// Wrap an already-known failure. Not retryable; awaiting it yields the
    /// error.
    pub fn settled_err(err: Error) -> Self {
        Self {
            source: Source::Settled(Box::pin(async move { Err(err) })),
            description: "settled error".to_string(),
        }
    }

    /// Wrap an in-flight future. Not retryable.
    pub fn from_future<F>(description: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            source: Source::Settled(Box::pin(fut)),
            description: description.into(),
        }
    }

    /// Wrap a live read. `fetch` is re-invoked on every poll attempt.
    pub fn live<F, Fut>(description: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let refetch: Refetch<T> = Arc::new(move || Box::pin(fetch()));
        Self {
            source: Source::Live(refetch),
            description: description.into(),
        }
    }

    /// Whether this value can be polled for fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self.source, Source::Live(_))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Transform the eventual value. On a live source the transform becomes
    /// part of every future re-fetch; on a settled source it wraps the inner
    /// future and the (absent) wait capability stays absent.
    pub fn map<U, F>(self, f: F) -> Retryable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let description = self.description;
        match self.source {
            Source::Settled(fut) => Retryable {
                source: Source::Settled(Box::pin(async move { fut.await.map(f) })),
                description,
            },
            Source::Live(fetch) => {
                let f = Arc::new(f);
                let refetch: Refetch<U> = Arc::new(move || {
                    let fut = fetch();
                    let f = Arc::clone(&f);
                    Box::pin(async move { fut.await.map(|v| f(v)) })
                });
                Retryable {
                    source: Source::Live(refetch),
                    description,
                }
            }
        }
    }

    /// Like [`map`](Retryable::map) but the transform is fallible. An `Err`
    /// from `f` terminates any poll immediately.
    pub fn and_then<U, F>(self, f: F) -> Retryable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let description = self.description;
        match self.source {
            Source::Settled(fut) => Retryable {
                source: Source::Settled(Box::pin(async move { fut.await.and_then(f) })),
                description,
            },
            Source::Live(fetch) => {
                let f = Arc::new(f);
                let refetch: Refetch<U> = Arc::new(move || {
                    let fut = fetch();
                    let f = Arc::clone(&f);
                    Box::pin(async move { fut.await.and_then(|v| f(v)) })
                });
                Retryable {
                    source: Source::Live(refetch),
                    description,
                }
            }
        }
    }

    /// Transform the failure, leaving the success shape — and therefore the
    /// wait capability — untouched.
    pub fn map_err<F>(self, f: F) -> Retryable<T>
    where
        F: Fn(Error) -> Error + Send + Sync + 'static,
    {
        let description = self.description;
        match self.source {
            Source::Settled(fut) => Retryable {
                source: Source::Settled(Box::pin(async move { fut.await.map_err(f) })),
                description,
            },
            Source::Live(fetch) => {
                let f = Arc::new(f);
                let refetch: Refetch<T> = Arc::new(move || {
                    let fut = fetch();
                    let f = Arc::clone(&f);
                    Box::pin(async move { fut.await.map_err(|e| f(e)) })
                });
                Retryable {
                    source: Source::Live(refetch),
                    description,
                }
            }
        }
    }

    /// Rename the value for diagnostics.
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Poll the composed fetch until `predicate` holds, resolving with the
    /// first satisfying value, or time out.
    ///
    /// Fails with [`Error::NotRetryable`] on a settled source — a value with
    /// no re-fetch capability never silently "passes" by resolving once.
    pub async fn wait_until<P>(
        self,
        condition: &str,
        predicate: P,
        options: &PollOptions,
    ) -> Result<T>
    where
        T: fmt::Debug,
        P: Fn(&T) -> bool,
    {
        match self.source {
            Source::Settled(_) => Err(Error::NotRetryable {
                description: self.description,
            }),
            Source::Live(fetch) => poll_until(condition, || fetch(), predicate, options).await,
        }
    }
}

impl<T: Send + 'static> IntoFuture for Retryable<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    /// Resolve exactly once: a settled source awaits its inner future, a
    /// live source issues a single fetch.
    fn into_future(self) -> Self::IntoFuture {
        match self.source {
            Source::Settled(fut) => fut,
            Source::Live(fetch) => fetch(),
        }
    }
}

impl<T> fmt::Debug for Retryable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retryable")
            .field("description", &self.description)
            .field("retryable", &matches!(self.source, Source::Live(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn fast() -> PollOptions {
        PollOptions::new()
            .with_timeout(Duration::from_millis(200))
            .with_interval(Duration::from_millis(2))
    }

    /// A live source yielding 0, 1, 2, ... on successive fetches.
    fn counter_source() -> (Retryable<u32>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = Retryable::live("counter", move || {
            let c = c.clone();
            async move { Ok(c.fetch_add(1, Ordering::SeqCst) as u32) }
        });
        (value, calls)
    }

    #[tokio::test]
    async fn settled_value_awaits_to_itself() {
        let p = Retryable::settled(42_u32);
        assert!(!p.is_retryable());
        assert_eq!(p.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn settled_error_propagates() {
        let p = Retryable::<u32>::settled_err(Error::Configuration("nope".into()));
        assert!(matches!(p.await, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn map_behaves_like_a_plain_continuation() {
        let p = Retryable::settled(20_u32).map(|v| v * 2 + 2);
        assert_eq!(p.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn live_source_awaits_with_a_single_fetch() {
        let (value, calls) = counter_source();
        assert!(value.is_retryable());
        assert_eq!(value.await.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chained_transforms_reapply_to_every_fresh_fetch() {
        // Producer yields 0,1,2,3...; f = +1, g = *2. Waiting for 8 must
        // see (3+1)*2, i.e. both transforms applied to the raw value of
        // each attempt.
        let (value, _) = counter_source();
        let composed = value.map(|x| x + 1).map(|x| x * 2);
        let got = composed
            .wait_until("value reaches 8", |v| *v == 8, &fast())
            .await
            .unwrap();
        assert_eq!(got, 8);
    }

    #[tokio::test]
    async fn fallible_transform_fails_the_poll_fast() {
        let (value, calls) = counter_source();
        let composed = value.and_then(|x| {
            if x == 0 {
                Ok(x)
            } else {
                Err(Error::Configuration("collapsed".into()))
            }
        });
        let err = composed
            .wait_until("never satisfied", |v| *v == 99, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // First attempt saw 0 (pred false), second attempt errored; no
        // further attempts after the failure.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_fresh_source_independently_reattempts_after_failure() {
        // Terminality is per poll: rebuilding the read gives a clean slate.
        let (value, _) = counter_source();
        let err = value
            .and_then(|_| Err::<u32, _>(Error::Configuration("dead".into())))
            .wait_until("anything", |_| true, &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let (fresh, _) = counter_source();
        let got = fresh.wait_until("reaches 2", |v| *v == 2, &fast()).await;
        assert_eq!(got.unwrap(), 2);
    }

    #[tokio::test]
    async fn wait_until_on_settled_value_is_refused() {
        let p = Retryable::settled("done".to_string()).described("static text");
        let err = p
            .wait_until("text changes", |_| true, &fast())
            .await
            .unwrap_err();
        match err {
            Error::NotRetryable { description } => assert_eq!(description, "static text"),
            other => panic!("expected NotRetryable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn falsy_intermediate_values_do_not_stop_the_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let value = Retryable::live("text", move || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(if n == 0 { String::new() } else { "nonempty".to_string() })
            }
        });
        let got = value
            .wait_until("text non-empty", |v: &String| !v.is_empty(), &fast())
            .await
            .unwrap();
        assert_eq!(got, "nonempty");
    }

    #[tokio::test]
    async fn map_err_keeps_the_wait_capability() {
        let (value, _) = counter_source();
        let renamed = value.map_err(|e| Error::Configuration(format!("wrapped: {e}")));
        assert!(renamed.is_retryable());
        let got = renamed
            .wait_until("reaches 2", |v| *v == 2, &fast())
            .await
            .unwrap();
        assert_eq!(got, 2);
    }

    #[tokio::test]
    async fn map_err_rewrites_failures() {
        let p = Retryable::<u32>::settled_err(Error::Configuration("inner".into()))
            .map_err(|e| Error::Assertion(format!("outer: {e}")));
        match p.await {
            Err(Error::Assertion(msg)) => assert!(msg.contains("inner")),
            other => panic!("expected rewritten error, got {other:?}"),
        }
    }

    #[test]
    fn debug_shows_retryability() {
        let p = Retryable::settled(1_u8);
        let s = format!("{p:?}");
        assert!(s.contains("retryable: false"));
    }
}
