//! stakeout — retrying expectations over headless Chrome via CDP.
//!
//! Browser state is eventually consistent: the element you asked about may
//! not exist yet, and its text may still be changing. This crate makes that
//! observable through a synchronous-looking assertion API. Reads from the
//! page come back as [`Retryable`] values; `expect(...)` turns a matcher
//! into a poll predicate and resolves once the condition holds against
//! freshly fetched state, or fails with the last observed mismatch.
//!
//! ```no_run
//! use std::time::Duration;
//! use stakeout::{expect, BrowserSession, DeviceProfile};
//!
//! # async fn demo() -> stakeout::Result<()> {
//! let session = BrowserSession::launch(&DeviceProfile::desktop(), true).await?;
//! let page = session.new_controller("https://example.com").await?;
//!
//! let heading = page.find_element("h1", Duration::from_secs(5)).await?;
//! expect(page.text(&heading)).to_contain("Example").await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod expect;
pub mod fixture;
pub mod netlog;
pub mod retry;
pub mod selectors;

pub use controller::{
    BrowserController, BrowserSession, ControllerPool, ElementHandle, ElementRect,
    LookupContext, PASTE_KEY,
};
pub use error::{Error, Result};
pub use expect::{expect, ExpectHandler, Expectation};
pub use fixture::{BrowserKind, DeviceProfile, TestConfig, TestEnv};
pub use netlog::{NetworkLog, NetworkLogEntry};
pub use retry::{PollOptions, Retryable};
pub use selectors::SelectorType;
