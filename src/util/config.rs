//! Runtime configuration for the PAM engine.
//!
//! Two options are recognized:
//! - `PAM_ENABLED` - when false, the whole subsystem is disabled: nothing is
//!   loaded from or saved to sidecar files.
//! - `PAM_PROXY_DIR` - directory that receives every proxy sidecar allocated
//!   when the natural sidecar location cannot be written.

use std::path::PathBuf;
use std::sync::LazyLock;

/// PAM configuration options.
#[derive(Clone, Debug, PartialEq)]
pub struct PamConfig {
    /// Master switch; `false` behaves like a permanently disabled dataset.
    pub enabled: bool,
    /// Directory holding proxy sidecars and the persistent proxy index.
    pub proxy_dir: Option<PathBuf>,
}

impl Default for PamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy_dir: None,
        }
    }
}

static GLOBAL_CONFIG: LazyLock<PamConfig> = LazyLock::new(PamConfig::from_env);

impl PamConfig {
    /// Environment key for the master switch.
    pub const ENABLED_KEY: &'static str = "PAM_ENABLED";

    /// Environment key for the proxy directory.
    pub const PROXY_DIR_KEY: &'static str = "PAM_PROXY_DIR";

    /// Configuration with PAM disabled.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Set the proxy directory.
    pub fn with_proxy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proxy_dir = Some(dir.into());
        self
    }

    /// Read options from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read options through an arbitrary key lookup.
    ///
    /// Unparseable boolean values fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup(Self::ENABLED_KEY) {
            match parse_bool(&value) {
                Some(enabled) => config.enabled = enabled,
                None => tracing::warn!(
                    "Ignoring {}={:?}: not a boolean",
                    Self::ENABLED_KEY,
                    value
                ),
            }
        }

        if let Some(dir) = lookup(Self::PROXY_DIR_KEY) {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.proxy_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }

    /// Process-wide configuration, read from the environment on first use.
    pub fn global() -> &'static PamConfig {
        &GLOBAL_CONFIG
    }
}

/// Parse a configuration boolean (YES/NO, ON/OFF, TRUE/FALSE, 1/0).
pub fn parse_bool(value: &str) -> Option<bool> {
    let v = value.trim();
    const TRUTHY: [&str; 4] = ["yes", "on", "true", "1"];
    const FALSY: [&str; 4] = ["no", "off", "false", "0"];
    if TRUTHY.iter().any(|t| v.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSY.iter().any(|f| v.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}
