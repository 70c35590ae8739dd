//! Network activity log.
//!
//! Subscribes to the transport's `Network.requestWillBeSent` event stream
//! and keeps a bounded buffer of normalized entries. Queries are snapshots:
//! reading never drains the buffer, so repeated queries are idempotent over
//! already-collected entries.

use std::sync::Arc;

use chromiumoxide::cdp::browser_protocol::network::{EnableParams, EventRequestWillBeSent};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::retry::Retryable;

/// CDP method name carried by request entries.
pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";

/// Buffer cap; oldest entries are dropped first.
const MAX_ENTRIES: usize = 500;

/// A normalized `{method, params}` record from the performance log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLogEntry {
    pub method: String,
    pub params: RequestParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    pub request_id: String,
    pub request: RequestInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
}

impl NetworkLogEntry {
    pub fn sent_request(request_id: impl Into<String>, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            method: REQUEST_WILL_BE_SENT.to_string(),
            params: RequestParams {
                request_id: request_id.into(),
                request: RequestInfo {
                    url: url.into(),
                    method: method.into(),
                },
            },
        }
    }

    fn from_event(event: &EventRequestWillBeSent) -> Self {
        Self::sent_request(
            event.request_id.inner().to_string(),
            event.request.url.clone(),
            event.request.method.clone(),
        )
    }
}

/// Shared, bounded log of network events.
#[derive(Debug, Clone, Default)]
pub struct NetworkLog {
    entries: Arc<Mutex<Vec<NetworkLogEntry>>>,
}

impl NetworkLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the Network domain on `page` and start collecting its
    /// request events into this log.
    pub async fn attach(page: &Page) -> Result<Self> {
        page.execute(EnableParams::default()).await?;
        let mut events = page.event_listener::<EventRequestWillBeSent>().await?;

        let log = Self::new();
        let sink = log.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                sink.record(NetworkLogEntry::from_event(&event)).await;
            }
            tracing::debug!("network event stream closed");
        });
        Ok(log)
    }

    /// Append an entry, evicting the oldest past the cap. Public so tests
    /// and fakes can feed the log without a live transport.
    pub async fn record(&self, entry: NetworkLogEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= MAX_ENTRIES {
            entries.remove(0);
        }
        entries.push(entry);
    }

    /// Snapshot of "request will be sent" entries, optionally filtered to
    /// an exact request URL. The buffer is left untouched.
    pub async fn sent_requests(&self, url: Option<&str>) -> Vec<NetworkLogEntry> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.method == REQUEST_WILL_BE_SENT)
            .filter(|e| url.is_none_or(|u| e.params.request.url == u))
            .cloned()
            .collect()
    }

    /// The sent-request query as a retryable value, for "wait until X was
    /// requested" expectations.
    pub fn sent_requests_retryable(&self, url: Option<&str>) -> Retryable<Vec<NetworkLogEntry>> {
        let log = self.clone();
        let url = url.map(str::to_string);
        let description = match &url {
            Some(u) => format!("requests to {u}"),
            None => "sent requests".to_string(),
        };
        Retryable::live(description, move || {
            let log = log.clone();
            let url = url.clone();
            async move { Ok(log.sent_requests(url.as_deref()).await) }
        })
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> NetworkLog {
        let log = NetworkLog::new();
        log.record(NetworkLogEntry::sent_request("1", "https://a.test/", "GET"))
            .await;
        log.record(NetworkLogEntry::sent_request("2", "https://b.test/", "GET"))
            .await;
        log.record(NetworkLogEntry::sent_request("3", "https://a.test/", "POST"))
            .await;
        log
    }

    #[tokio::test]
    async fn url_filter_is_exact_match() {
        let log = seeded().await;
        let a = log.sent_requests(Some("https://a.test/")).await;
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|e| e.params.request.url == "https://a.test/"));

        let all = log.sent_requests(None).await;
        assert_eq!(all.len(), 3);

        assert!(log.sent_requests(Some("https://a.test")).await.is_empty());
    }

    #[tokio::test]
    async fn queries_are_idempotent_snapshots() {
        let log = seeded().await;
        let first = log.sent_requests(None).await;
        let second = log.sent_requests(None).await;
        assert_eq!(first, second);
        assert_eq!(log.len().await, 3);
    }

    #[tokio::test]
    async fn buffer_caps_and_drops_oldest() {
        let log = NetworkLog::new();
        for i in 0..MAX_ENTRIES + 100 {
            log.record(NetworkLogEntry::sent_request(
                i.to_string(),
                format!("https://x.test/{i}"),
                "GET",
            ))
            .await;
        }
        let entries = log.sent_requests(None).await;
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].params.request.url, "https://x.test/100");
        assert_eq!(
            entries.last().unwrap().params.request.url,
            format!("https://x.test/{}", MAX_ENTRIES + 99)
        );
    }

    #[tokio::test]
    async fn retryable_query_waits_for_a_request() {
        let log = NetworkLog::new();
        let waiter = log.sent_requests_retryable(Some("https://late.test/"));

        let feeder = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            feeder
                .record(NetworkLogEntry::sent_request("9", "https://late.test/", "GET"))
                .await;
        });

        let hits = waiter
            .wait_until(
                "request observed",
                |entries| !entries.is_empty(),
                &crate::retry::PollOptions::new()
                    .with_timeout(std::time::Duration::from_millis(500))
                    .with_interval(std::time::Duration::from_millis(5)),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
