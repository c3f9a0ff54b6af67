//! Configuration types for the docchat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the binary runs with.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::local_state::FileStore;

/// Default per-request timeout, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Environment variable holding the password for `--email` auto-login.
pub const PASSWORD_ENV: &str = "DOCCHAT_PASSWORD";

/// Command-line arguments for the docchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct AppArgs {
    /// Backend base URL.
    #[arrrg(optional, "Backend URL (default: $DOCCHAT_API_URL or https://localhost:8000)", "URL")]
    pub api_url: Option<String>,

    /// Where theme and last chat are kept.
    #[arrrg(optional, "State file (default: ~/.docchat/state.json)", "PATH")]
    pub state_file: Option<String>,

    /// Per-request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Sign in as this user at start, with the password from DOCCHAT_PASSWORD.
    #[arrrg(optional, "Sign in at start (password from $DOCCHAT_PASSWORD)", "EMAIL")]
    pub email: Option<String>,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Backend base URL; `None` defers to the environment and default.
    pub api_url: Option<String>,

    /// Path of the local state file.
    pub state_file: PathBuf,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Email to sign in with at start.
    pub email: Option<String>,
}

impl AppConfig {
    /// Creates a new AppConfig with default values.
    ///
    /// Defaults:
    /// - API URL: from the environment, else https://localhost:8000
    /// - State file: ~/.docchat/state.json
    /// - Timeout: 60 seconds
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            api_url: None,
            state_file: FileStore::default_path(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            use_color: true,
            email: None,
        }
    }

    /// Sets the backend URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Sets the state file.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the email to sign in with at start.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<AppArgs> for AppConfig {
    fn from(args: AppArgs) -> Self {
        let defaults = AppConfig::new();
        AppConfig {
            api_url: args.api_url,
            state_file: args
                .state_file
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            timeout: args
                .timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            use_color: !args.no_color,
            email: args.email,
        }
    }
}
