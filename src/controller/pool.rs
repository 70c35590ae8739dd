use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::Mutex;

use super::session::BrowserSession;
use super::BrowserController;
use crate::error::Result;
use crate::fixture::{BrowserKind, DeviceProfile};

/// Cache key: one live session per browser kind and device profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub browser: BrowserKind,
    pub profile: String,
}

/// Process-wide cache of browser sessions.
///
/// Repeated requests for "a chrome controller on the desktop profile"
/// reuse one remote browser instead of spawning a new one per test.
/// Sessions are created lazily on first request and torn down only through
/// [`dispose_all`](ControllerPool::dispose_all) — never implicitly.
#[derive(Debug, Default)]
pub struct ControllerPool {
    headless: bool,
    sessions: Mutex<HashMap<SessionKey, BrowserSession>>,
}

impl ControllerPool {
    pub fn new(headless: bool) -> Self {
        Self {
            headless,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// A controller on a (possibly shared) session for the given browser
    /// kind and profile, opened at `url`.
    pub async fn controller(
        &self,
        browser: BrowserKind,
        profile: &DeviceProfile,
        url: &str,
    ) -> Result<BrowserController> {
        let mut sessions = self.sessions.lock().await;
        let key = SessionKey {
            browser,
            profile: profile.name.clone(),
        };
        let session = match sessions.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                tracing::info!(
                    browser = %browser,
                    profile = profile.name.as_str(),
                    "launching pooled session"
                );
                entry.insert(BrowserSession::launch(profile, self.headless).await?)
            }
        };
        session.new_controller(url).await
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Tear down every pooled session.
    pub async fn dispose_all(&self) {
        let mut sessions = self.sessions.lock().await;
        for (key, session) in sessions.drain() {
            tracing::info!(browser = %key.browser, profile = key.profile.as_str(), "closing pooled session");
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_profiles_but_not_instances() {
        let a = SessionKey {
            browser: BrowserKind::Chrome,
            profile: "desktop".into(),
        };
        let b = SessionKey {
            browser: BrowserKind::Chrome,
            profile: "desktop".into(),
        };
        let c = SessionKey {
            browser: BrowserKind::Chrome,
            profile: "mobile".into(),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn pool_starts_empty() {
        let pool = ControllerPool::new(true);
        assert!(pool.is_empty().await);
        pool.dispose_all().await;
        assert_eq!(pool.len().await, 0);
    }
}
