//! Test-environment configuration: browser kinds, device profiles, and the
//! one-shot config slot a test fixture sets up before driving a controller.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::{Error, Result};

/// The browser family a controller session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserKind::Chrome => f.write_str("chrome"),
        }
    }
}

/// Viewport preset a session is launched with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mobile: bool,
}

impl DeviceProfile {
    pub fn desktop() -> Self {
        Self {
            name: "desktop".to_string(),
            width: 1280,
            height: 720,
            mobile: false,
        }
    }

    pub fn tablet() -> Self {
        Self {
            name: "tablet".to_string(),
            width: 1024,
            height: 768,
            mobile: true,
        }
    }

    pub fn mobile() -> Self {
        Self {
            name: "mobile".to_string(),
            width: 412,
            height: 732,
            mobile: true,
        }
    }

    /// Resolve a preset by name. Unknown names are a setup-time
    /// configuration error, reported synchronously.
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "desktop" => Ok(Self::desktop()),
            "tablet" => Ok(Self::tablet()),
            "mobile" => Ok(Self::mobile()),
            other => Err(Error::Configuration(format!(
                "unknown device profile {other:?}; expected desktop, tablet, or mobile"
            ))),
        }
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::desktop()
    }
}

/// Everything a fixture needs to launch and address a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestConfig {
    pub browser: BrowserKind,
    pub profile: DeviceProfile,
    pub headless: bool,
    pub base_url: Option<String>,
}

impl TestConfig {
    pub fn new() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }

    pub fn with_browser(mut self, browser: BrowserKind) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn headed(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// One-shot configuration slot for a test environment.
///
/// `configure` may be called exactly once; a second call is a programmer
/// error surfaced synchronously at setup time, never mid-poll.
#[derive(Debug, Default)]
pub struct TestEnv {
    config: Mutex<Option<TestConfig>>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, config: TestConfig) -> Result<()> {
        let mut slot = self
            .config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_some() {
            return Err(Error::Configuration(
                "environment already configured; configure() may only be called once".to_string(),
            ));
        }
        *slot = Some(config);
        Ok(())
    }

    /// The active configuration, or the default when none was set.
    pub fn config(&self) -> TestConfig {
        self.config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .unwrap_or_else(TestConfig::new)
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve_by_name() {
        assert_eq!(DeviceProfile::preset("desktop").unwrap().width, 1280);
        assert_eq!(DeviceProfile::preset("mobile").unwrap().width, 412);
        assert!(DeviceProfile::preset("tablet").unwrap().mobile);
    }

    #[test]
    fn unknown_preset_is_a_configuration_error() {
        let err = DeviceProfile::preset("watch").unwrap_err();
        match err {
            Error::Configuration(msg) => assert!(msg.contains("watch")),
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn configure_is_single_shot() {
        let env = TestEnv::new();
        assert!(!env.is_configured());
        env.configure(TestConfig::new().with_profile(DeviceProfile::mobile()))
            .unwrap();
        assert!(env.is_configured());
        assert_eq!(env.config().profile.name, "mobile");

        let err = env.configure(TestConfig::new()).unwrap_err();
        assert!(err.to_string().contains("only be called once"));
        // The original configuration survives the failed second attempt.
        assert_eq!(env.config().profile.name, "mobile");
    }

    #[test]
    fn unconfigured_env_yields_the_default() {
        let env = TestEnv::new();
        let cfg = env.config();
        assert!(cfg.headless);
        assert_eq!(cfg.profile, DeviceProfile::desktop());
        assert_eq!(cfg.browser, BrowserKind::Chrome);
    }
}
