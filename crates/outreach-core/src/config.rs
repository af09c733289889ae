//! Configuration management for outreach runs
//!
//! Configuration lives in `.outreach/config.toml` under the working root.
//! Every field has a default, so a partial file (or no file) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{OutreachError, Query, Result, Role};

/// Directory holding config, ledger and logs
pub const OUTREACH_DIR: &str = ".outreach";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutreachConfig {
    /// Run pacing, cap and message template
    #[serde(default)]
    pub run: RunConfig,

    /// Session establishment
    #[serde(default)]
    pub session: SessionConfig,

    /// Browser launch options
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Per-role locator candidate overrides
    #[serde(default)]
    pub locators: LocatorOverrides,
}

/// Run-level options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum successful sends per run
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Message body with `{placeholder}` attributes
    #[serde(default = "default_message_template")]
    pub message_template: String,

    /// Lower bound for pauses between steps of one target
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound for pauses between steps of one target
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Lower bound for the pause between two targets
    #[serde(default = "default_between_targets_min_ms")]
    pub between_targets_min_ms: u64,

    /// Upper bound for the pause between two targets
    #[serde(default = "default_between_targets_max_ms")]
    pub between_targets_max_ms: u64,

    /// Bound for each navigation step
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Skip targets the ledger already records as sent
    #[serde(default = "default_true")]
    pub skip_already_sent: bool,
}

/// Session establishment options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Page loaded before the session cookie is injected
    #[serde(default = "default_entry_url")]
    pub entry_url: String,

    /// Name of the site's session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookie domain
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,

    /// Environment variable holding the session token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Inline token, used only when `token_env` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Address fragments that mean the session is not authenticated
    #[serde(default = "default_unauthenticated_patterns")]
    pub unauthenticated_url_patterns: Vec<String>,

    /// Address fragments that mean a challenge interstitial is showing
    #[serde(default = "default_challenge_patterns")]
    pub challenge_url_patterns: Vec<String>,
}

/// Browser launch options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Attach to a running browser at this DevTools websocket address
    /// instead of launching one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_ws_url: Option<String>,
}

/// Output locations, relative paths resolve against the working root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_ledger_path")]
    pub ledger: PathBuf,

    #[serde(default = "default_activity_log_path")]
    pub activity_log: PathBuf,

    /// Snapshot directory; snapshots are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_dir: Option<PathBuf>,
}

/// Locator candidates replacing the built-in list for a role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocatorOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_affordance: Option<Vec<Query>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_field: Option<Vec<Query>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_affordance: Option<Vec<Query>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_marker: Option<Vec<Query>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_marker: Option<Vec<Query>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_confirmation: Option<Vec<Query>>,
}

impl LocatorOverrides {
    pub fn get(&self, role: Role) -> Option<&[Query]> {
        let slot = match role {
            Role::ComposeAffordance => &self.compose_affordance,
            Role::InputField => &self.input_field,
            Role::SendAffordance => &self.send_affordance,
            Role::LoggedInMarker => &self.logged_in_marker,
            Role::ChallengeMarker => &self.challenge_marker,
            Role::SentConfirmation => &self.sent_confirmation,
        };
        slot.as_deref()
    }
}

// Default value providers
fn default_max_messages() -> usize {
    20
}

fn default_message_template() -> String {
    "Hi {first_name}, I came across your profile while looking into {industry} \
     and would love to hear your take on {topic}."
        .to_string()
}

fn default_delay_min_ms() -> u64 {
    2_000
}

fn default_delay_max_ms() -> u64 {
    5_000
}

fn default_between_targets_min_ms() -> u64 {
    15_000
}

fn default_between_targets_max_ms() -> u64 {
    45_000
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_entry_url() -> String {
    "https://www.linkedin.com/".to_string()
}

fn default_cookie_name() -> String {
    "li_at".to_string()
}

fn default_cookie_domain() -> String {
    ".linkedin.com".to_string()
}

fn default_token_env() -> String {
    "OUTREACH_SESSION_TOKEN".to_string()
}

fn default_unauthenticated_patterns() -> Vec<String> {
    vec![
        "/login".to_string(),
        "/uas/login".to_string(),
        "/authwall".to_string(),
        "/checkpoint".to_string(),
    ]
}

fn default_challenge_patterns() -> Vec<String> {
    vec!["/checkpoint/challenge".to_string()]
}

fn default_window_width() -> u32 {
    1366
}

fn default_window_height() -> u32 {
    900
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(OUTREACH_DIR).join("ledger.jsonl")
}

fn default_activity_log_path() -> PathBuf {
    PathBuf::from(OUTREACH_DIR).join("activity.md")
}

impl OutreachConfig {
    /// Load configuration from `.outreach/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(OUTREACH_DIR).join("config.toml");

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            OutreachError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.outreach/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        let config_dir = root.join(OUTREACH_DIR);
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| OutreachError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let run = &self.run;
        if run.delay_min_ms > run.delay_max_ms {
            return Err(OutreachError::Config(format!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                run.delay_min_ms, run.delay_max_ms
            )));
        }
        if run.between_targets_min_ms > run.between_targets_max_ms {
            return Err(OutreachError::Config(format!(
                "between_targets_min_ms ({}) exceeds between_targets_max_ms ({})",
                run.between_targets_min_ms, run.between_targets_max_ms
            )));
        }
        if run.between_targets_min_ms < run.delay_max_ms {
            return Err(OutreachError::Config(format!(
                "between_targets_min_ms ({}) must be at least delay_max_ms ({})",
                run.between_targets_min_ms, run.delay_max_ms
            )));
        }
        if run.navigation_timeout_secs == 0 {
            return Err(OutreachError::Config(
                "navigation_timeout_secs must be positive".to_string(),
            ));
        }
        if run.message_template.trim().is_empty() {
            return Err(OutreachError::Config("message_template is empty".to_string()));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(OutreachError::Config("cookie_name is empty".to_string()));
        }
        Ok(())
    }

    /// Resolve a configured path against the working root
    pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            message_template: default_message_template(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            between_targets_min_ms: default_between_targets_min_ms(),
            between_targets_max_ms: default_between_targets_max_ms(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            skip_already_sent: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            entry_url: default_entry_url(),
            cookie_name: default_cookie_name(),
            cookie_domain: default_cookie_domain(),
            token_env: default_token_env(),
            token: None,
            unauthenticated_url_patterns: default_unauthenticated_patterns(),
            challenge_url_patterns: default_challenge_patterns(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: None,
            debug_ws_url: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ledger: default_ledger_path(),
            activity_log: default_activity_log_path(),
            diagnostics_dir: None,
        }
    }
}
