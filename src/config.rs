//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default remote service base URL.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Default delay before the one-shot host-integration prompt.
const DEFAULT_HOST_PROMPT_DELAY_MS: u64 = 3000;

/// Widget configuration.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Base URL of the remote service (no trailing slash).
    pub base_url: String,
    /// File backing the durable token and host-integration flags.
    pub state_path: PathBuf,
    /// Delay between mount (or a switch back to QA) and the host-integration prompt.
    pub host_prompt_delay: Duration,
    /// Page opened when a chat reply asks for the dashboard.
    pub dashboard_url: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            state_path: default_state_path(),
            host_prompt_delay: Duration::from_millis(DEFAULT_HOST_PROMPT_DELAY_MS),
            dashboard_url: format!("{DEFAULT_BASE_URL}/static/dashboard/index.html"),
        }
    }
}

impl WidgetConfig {
    /// Load configuration from `WIDGET_*` environment variables.
    pub fn from_env() -> crate::error::Result<Self> {
        Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("WIDGET_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let state_path = lookup("WIDGET_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_state_path);

        let host_prompt_delay = match lookup("WIDGET_HOST_PROMPT_DELAY_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                    key: "WIDGET_HOST_PROMPT_DELAY_MS".to_string(),
                    message: format!("{raw:?}: {e}"),
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_HOST_PROMPT_DELAY_MS),
        };

        let dashboard_url = lookup("WIDGET_DASHBOARD_URL")
            .unwrap_or_else(|| format!("{base_url}/static/dashboard/index.html"));

        Ok(Self {
            base_url,
            state_path,
            host_prompt_delay,
            dashboard_url,
        })
    }
}

fn default_state_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".persona-widget/state.json")
}
