//! Core type definitions for outreach runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{OutreachError, Result};

/// One outreach recipient
///
/// Targets are produced by an external source at run start and are never
/// mutated by the engine. Every field except `url` may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Profile address (direct or network-scoped profile)
    pub url: String,
    #[serde(default, alias = "firstName")]
    pub first_name: String,
    #[serde(default, alias = "lastName")]
    pub last_name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub topic: String,
    /// Additional named attributes available to the message template
    ///
    /// Values of any JSON type are accepted; non-string values are rendered
    /// in their JSON text form.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = industry.into();
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Full display name, empty when neither name part is known
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// Check that the url is an absolute http(s) address with a host
    pub fn validate(&self) -> Result<()> {
        let trimmed = self.url.trim();
        if trimmed.is_empty() {
            return Err(OutreachError::InvalidTarget("empty url".to_string()));
        }

        let parsed = url::Url::parse(trimmed)
            .map_err(|e| OutreachError::InvalidTarget(format!("{}: {}", trimmed, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(OutreachError::InvalidTarget(format!(
                "{}: not an http(s) address",
                trimmed
            )));
        }

        Ok(())
    }

    /// Attribute mapping used for message personalization
    ///
    /// Named fields take precedence over entries in `extra` with the same key.
    /// Name parts are available under both their snake_case and camelCase keys.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs: BTreeMap<String, String> = self
            .extra
            .iter()
            .map(|(key, value)| (key.clone(), attribute_text(value)))
            .collect();
        attrs.insert("first_name".to_string(), self.first_name.clone());
        attrs.insert("firstName".to_string(), self.first_name.clone());
        attrs.insert("last_name".to_string(), self.last_name.clone());
        attrs.insert("lastName".to_string(), self.last_name.clone());
        attrs.insert("name".to_string(), self.name());
        attrs.insert("industry".to_string(), self.industry.clone());
        attrs.insert("topic".to_string(), self.topic.clone());
        attrs.insert("url".to_string(), self.url.clone());
        attrs
    }
}

fn attribute_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Semantic role of an element on the rendered surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Button or link that opens the message composer
    ComposeAffordance,
    /// Editable message body inside the composer
    InputField,
    /// Button that submits the composed message
    SendAffordance,
    /// Element only present for a signed-in user
    LoggedInMarker,
    /// Element of a bot-verification or identity-challenge interstitial
    ChallengeMarker,
    /// Element that appears once a message has been delivered
    SentConfirmation,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::ComposeAffordance,
        Role::InputField,
        Role::SendAffordance,
        Role::LoggedInMarker,
        Role::ChallengeMarker,
        Role::SentConfirmation,
    ];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ComposeAffordance => write!(f, "compose_affordance"),
            Self::InputField => write!(f, "input_field"),
            Self::SendAffordance => write!(f, "send_affordance"),
            Self::LoggedInMarker => write!(f, "logged_in_marker"),
            Self::ChallengeMarker => write!(f, "challenge_marker"),
            Self::SentConfirmation => write!(f, "sent_confirmation"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "compose_affordance" | "compose" => Ok(Self::ComposeAffordance),
            "input_field" | "input" => Ok(Self::InputField),
            "send_affordance" | "send" => Ok(Self::SendAffordance),
            "logged_in_marker" | "logged_in" => Ok(Self::LoggedInMarker),
            "challenge_marker" | "challenge" => Ok(Self::ChallengeMarker),
            "sent_confirmation" | "confirmation" => Ok(Self::SentConfirmation),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Status of a processed target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Sent,
    Failed,
    Skipped,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-target failure, isolated to that target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    NavigationTimeout,
    SessionLost,
    ComposeAffordanceNotFound,
    InputFieldNotFound,
    SendAffordanceNotFound,
    UnexpectedError { message: String },
}

impl FailureReason {
    /// Failure reported when a required role resolves to nothing
    pub fn not_found(role: Role) -> Self {
        match role {
            Role::ComposeAffordance => Self::ComposeAffordanceNotFound,
            Role::InputField => Self::InputFieldNotFound,
            Role::SendAffordance => Self::SendAffordanceNotFound,
            other => Self::UnexpectedError {
                message: format!("{} is not a required role", other),
            },
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NavigationTimeout => write!(f, "navigation timeout"),
            Self::SessionLost => write!(f, "session lost"),
            Self::ComposeAffordanceNotFound => write!(f, "compose affordance not found"),
            Self::InputFieldNotFound => write!(f, "input field not found"),
            Self::SendAffordanceNotFound => write!(f, "send affordance not found"),
            Self::UnexpectedError { message } => write!(f, "unexpected error: {}", message),
        }
    }
}

/// Why a target was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A prior run already recorded a successful send
    AlreadySent,
    /// The url is empty or not an http(s) address
    InvalidUrl,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadySent => write!(f, "already sent"),
            Self::InvalidUrl => write!(f, "invalid url"),
        }
    }
}

/// Condition that aborts the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FatalReason {
    ChallengeDetected(String),
    AuthenticationFailed(String),
    ReauthenticationFailed(String),
    LedgerUnavailable(String),
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChallengeDetected(d) => write!(f, "challenge interstitial detected ({})", d),
            Self::AuthenticationFailed(d) => write!(f, "authentication failed ({})", d),
            Self::ReauthenticationFailed(d) => write!(f, "re-authentication failed ({})", d),
            Self::LedgerUnavailable(d) => write!(f, "outcome ledger unavailable ({})", d),
        }
    }
}

/// Result of processing one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub target_url: String,
    pub target_name: String,
    pub status: OutcomeStatus,
    pub failure_reason: Option<FailureReason>,
    pub skip_reason: Option<SkipReason>,
    /// For sends: whether a confirmation marker was observed
    pub confirmed: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionOutcome {
    fn base(target: &Target, status: OutcomeStatus) -> Self {
        Self {
            target_url: target.url.clone(),
            target_name: target.name(),
            status,
            failure_reason: None,
            skip_reason: None,
            confirmed: None,
            timestamp: Utc::now(),
        }
    }

    pub fn sent(target: &Target, confirmed: bool) -> Self {
        Self {
            confirmed: Some(confirmed),
            ..Self::base(target, OutcomeStatus::Sent)
        }
    }

    pub fn failed(target: &Target, reason: FailureReason) -> Self {
        Self {
            failure_reason: Some(reason),
            ..Self::base(target, OutcomeStatus::Failed)
        }
    }

    pub fn skipped(target: &Target, reason: SkipReason) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::base(target, OutcomeStatus::Skipped)
        }
    }

    /// Sent without an observed confirmation marker
    pub fn is_unconfirmed(&self) -> bool {
        self.status == OutcomeStatus::Sent && self.confirmed == Some(false)
    }

    /// Human-readable error column for the ledger
    pub fn error_text(&self) -> Option<String> {
        match (&self.failure_reason, &self.skip_reason) {
            (Some(reason), _) => Some(reason.to_string()),
            (None, Some(skip)) => Some(skip.to_string()),
            (None, None) => None,
        }
    }
}

/// Counters for the current run, owned by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    pub sent_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    pub unconfirmed_count: usize,
    pub max_messages: usize,
}

impl RunState {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sent_count: 0,
            failed_count: 0,
            skipped_count: 0,
            unconfirmed_count: 0,
            max_messages,
        }
    }

    pub fn cap_reached(&self) -> bool {
        self.sent_count >= self.max_messages
    }

    /// Fold one outcome into the counters
    pub fn apply(&mut self, outcome: &InteractionOutcome) {
        match outcome.status {
            OutcomeStatus::Sent => {
                self.sent_count += 1;
                if outcome.is_unconfirmed() {
                    self.unconfirmed_count += 1;
                }
            }
            OutcomeStatus::Failed => self.failed_count += 1,
            OutcomeStatus::Skipped => self.skipped_count += 1,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            sent_count: self.sent_count,
            failed_count: self.failed_count,
            skipped_count: self.skipped_count,
            unconfirmed_count: self.unconfirmed_count,
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub sent_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    /// Subset of `sent_count` without an observed confirmation
    pub unconfirmed_count: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent {} ({} unconfirmed), failed {}, skipped {}",
            self.sent_count, self.unconfirmed_count, self.failed_count, self.skipped_count
        )
    }
}
