//! Role-based element location with ordered fallback
//!
//! Site markup changes without notice, so no role is tied to a single
//! selector. Each [`Role`] carries an ordered candidate list; the first
//! candidate with a visible match wins. Keeping candidates as data means a
//! markup change is a config edit, not a code change.

use outreach_core::config::LocatorOverrides;
use outreach_core::{Query, Role};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::surface::{ElementRef, Surface};

/// Ordered candidate queries for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorStrategy {
    pub role: Role,
    pub candidates: Vec<Query>,
}

impl LocatorStrategy {
    pub fn new(role: Role, candidates: Vec<Query>) -> Self {
        Self { role, candidates }
    }

    /// Built-in candidates for a role, most specific first
    pub fn builtin(role: Role) -> Self {
        let candidates = match role {
            Role::ComposeAffordance => vec![
                Query::css("main .pvs-profile-actions button[aria-label^='Message']"),
                Query::css("button.message-anywhere-button"),
                Query::css("button[aria-label^='Message']"),
                Query::css("a[href*='/messaging/compose']"),
                Query::text("button", "Message"),
            ],
            Role::InputField => vec![
                Query::css("div.msg-form__contenteditable[contenteditable='true']"),
                Query::css("div[role='textbox'][contenteditable='true']"),
                Query::css("textarea[name='message']"),
                Query::css("textarea"),
            ],
            Role::SendAffordance => vec![
                Query::css("button.msg-form__send-button"),
                Query::css("button.msg-form__send-btn"),
                Query::css("form.msg-form button[type='submit']"),
                Query::text("button", "Send"),
            ],
            Role::LoggedInMarker => vec![
                Query::css("#global-nav"),
                Query::css("nav.global-nav"),
                Query::css("img.global-nav__me-photo"),
            ],
            Role::ChallengeMarker => vec![
                Query::css("#captcha-internal"),
                Query::css("iframe[src*='captcha']"),
                Query::css("form#challenge"),
                Query::text("h1", "security check"),
                Query::text("h1", "Security Verification"),
            ],
            Role::SentConfirmation => vec![
                Query::css("li.msg-s-message-list__event:last-child .msg-s-event-listitem__body"),
                Query::css(".msg-s-event-listitem--last-in-group"),
            ],
        };
        Self::new(role, candidates)
    }
}

/// Outcome of resolving a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ElementRef),
    NotFound,
}

impl Resolution {
    pub fn into_found(self) -> Option<ElementRef> {
        match self {
            Self::Found(element) => Some(element),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Resolves roles against a surface using configured strategies
#[derive(Debug, Clone)]
pub struct LocatorResolver {
    strategies: BTreeMap<Role, LocatorStrategy>,
}

impl LocatorResolver {
    /// Resolver with no candidates for any role
    pub fn empty() -> Self {
        Self {
            strategies: BTreeMap::new(),
        }
    }

    /// Resolver with the built-in candidates for every role
    pub fn with_defaults() -> Self {
        let mut resolver = Self::empty();
        for role in Role::ALL {
            resolver.set(LocatorStrategy::builtin(role));
        }
        resolver
    }

    /// Replace the candidates of every role named in `overrides`
    pub fn with_overrides(mut self, overrides: &LocatorOverrides) -> Self {
        for role in Role::ALL {
            if let Some(candidates) = overrides.get(role) {
                debug!("Overriding {} with {} candidates", role, candidates.len());
                self.set(LocatorStrategy::new(role, candidates.to_vec()));
            }
        }
        self
    }

    pub fn set(&mut self, strategy: LocatorStrategy) {
        self.strategies.insert(strategy.role, strategy);
    }

    pub fn strategy(&self, role: Role) -> Option<&LocatorStrategy> {
        self.strategies.get(&role)
    }

    /// Try each candidate in order; the first visible match wins
    ///
    /// A candidate whose evaluation errors counts as non-matching. Running
    /// out of candidates is a normal `NotFound`, not an error.
    #[instrument(skip(self, surface))]
    pub async fn resolve(&self, role: Role, surface: &dyn Surface) -> Resolution {
        let Some(strategy) = self.strategies.get(&role) else {
            debug!("No strategy configured for {}", role);
            return Resolution::NotFound;
        };

        for (position, query) in strategy.candidates.iter().enumerate() {
            match surface.first_visible(query).await {
                Ok(Some(element)) => {
                    debug!("{} resolved by candidate {} ({})", role, position, query);
                    return Resolution::Found(element);
                }
                Ok(None) => {}
                Err(e) => debug!("Candidate {} for {} errored, skipping: {}", query, role, e),
            }
        }

        debug!("{} not found after {} candidates", role, strategy.candidates.len());
        Resolution::NotFound
    }
}

impl Default for LocatorResolver {
    fn default() -> Self {
        Self::with_defaults()
    }
}
