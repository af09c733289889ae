//! Driver loop for the per-target interaction protocol
//!
//! [`InteractionProtocol::run`] feeds events into
//! [`transition`](crate::state_machine::transition) and performs the
//! actions it returns against the session's surface. Every per-target error
//! is caught here and classified; only fatal conditions leave the target
//! boundary, as [`TargetResult::Fatal`].

use outreach_browser::{
    DiagnosticSink, ElementRef, LocatorResolver, NoDiagnostics, Resolution, Stage, Surface,
};
use outreach_core::fail_open::fail_open;
use outreach_core::{render, FatalReason, InteractionOutcome, OutreachError, Role, Target};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::delay::{DelayGenerator, Pacing};
use crate::session::SessionManager;
use crate::state_machine::{transition, Action, Completion, Event, Step};

/// What processing one target produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetResult {
    /// A classified outcome to record
    Outcome(InteractionOutcome),
    /// The run must stop; no outcome exists for this target
    Fatal(FatalReason),
}

/// Runs the per-target protocol
pub struct InteractionProtocol {
    resolver: LocatorResolver,
    delays: DelayGenerator,
    pacing: Pacing,
    diagnostics: Arc<dyn DiagnosticSink>,
    template: String,
    navigation_timeout: Duration,
}

impl InteractionProtocol {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            resolver: LocatorResolver::with_defaults(),
            delays: DelayGenerator::new(),
            pacing: Pacing::NONE,
            diagnostics: Arc::new(NoDiagnostics),
            template: template.into(),
            navigation_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_resolver(mut self, resolver: LocatorResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Pause bounds applied after every surface action
    pub fn with_delays(mut self, delays: DelayGenerator, pacing: Pacing) -> Self {
        self.delays = delays;
        self.pacing = pacing;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Process one target against the session's surface
    ///
    /// The mutable borrow keeps the surface exclusive to this target until
    /// the call returns.
    #[instrument(skip(self, session, target), fields(url = %target.url))]
    pub async fn run<S: Surface>(
        &self,
        session: &mut SessionManager<S>,
        target: &Target,
    ) -> TargetResult {
        let message = render(&self.template, target);
        let mut attempt = Attempt {
            session,
            target,
            message,
            resolved: HashMap::new(),
        };

        let (mut step, mut actions) = transition(Step::Pending, Event::Begin);
        loop {
            let mut produced = None;
            for action in actions {
                if let Some(event) = self.perform(action, &mut attempt).await {
                    produced = Some(event);
                    break;
                }
            }

            if let Step::Done(completion) = &step {
                return self.finish(target, completion.clone());
            }

            let event = produced
                .unwrap_or_else(|| Event::Fault(format!("no progress from {:?}", step)));
            debug!("{:?} on {:?}", step, event);
            (step, actions) = transition(step, event);
        }
    }

    async fn perform<S: Surface>(&self, action: Action, attempt: &mut Attempt<'_, S>) -> Option<Event> {
        let surface = attempt.session.surface();

        match action {
            Action::Navigate => {
                let result = surface
                    .navigate(&attempt.target.url, self.navigation_timeout)
                    .await;
                self.pause().await;
                Some(match result {
                    Ok(()) => Event::Navigated,
                    Err(OutreachError::NavigationTimeout { .. }) => Event::NavigationTimedOut,
                    Err(e) => Event::Fault(e.to_string()),
                })
            }

            Action::VerifySession => {
                if attempt.session.is_challenged().await {
                    return Some(Event::ChallengeDetected(self.where_am_i(surface).await));
                }
                if attempt.session.is_live().await {
                    attempt.session.mark_verified();
                    Some(Event::SessionVerified)
                } else {
                    Some(Event::SessionLost)
                }
            }

            Action::Reauthenticate => Some(match attempt.session.re_authenticate_once().await {
                Ok(true) => Event::Reauthenticated,
                Ok(false) => Event::ReauthExhausted,
                Err(OutreachError::Challenge(detail)) => Event::ChallengeDetected(detail),
                Err(e) => Event::ReauthFailed(e.to_string()),
            }),

            Action::Resolve(role) => match self.resolver.resolve(role, surface).await {
                Resolution::Found(element) => {
                    attempt.resolved.insert(role, element);
                    Some(Event::Resolved(role))
                }
                // A challenge page hides every affordance; report it as such
                Resolution::NotFound => {
                    if attempt.session.is_challenged().await {
                        Some(Event::ChallengeDetected(self.where_am_i(surface).await))
                    } else {
                        Some(Event::Missing(role))
                    }
                }
            },

            Action::Activate(role) => {
                let element = match attempt.element(role) {
                    Ok(element) => element,
                    Err(event) => return Some(event),
                };
                let result = surface.click(&element).await;
                self.pause().await;
                Some(match result {
                    Ok(()) => Event::Activated(role),
                    Err(e) => Event::Fault(e.to_string()),
                })
            }

            Action::Fill => {
                let element = match attempt.element(Role::InputField) {
                    Ok(element) => element,
                    Err(event) => return Some(event),
                };
                let result = surface.fill(&element, &attempt.message).await;
                self.pause().await;
                Some(match result {
                    Ok(()) => Event::Filled,
                    Err(e) => Event::Fault(e.to_string()),
                })
            }

            Action::ConfirmSent => {
                if self
                    .resolver
                    .resolve(Role::SentConfirmation, surface)
                    .await
                    .is_found()
                {
                    Some(Event::Confirmed)
                } else if attempt.session.is_challenged().await {
                    Some(Event::ChallengeDetected(self.where_am_i(surface).await))
                } else {
                    warn!(
                        "No delivery confirmation observed for {}; recording as unconfirmed",
                        attempt.target.url
                    );
                    Some(Event::Unconfirmed)
                }
            }

            Action::Capture(stage) => {
                self.capture(surface, stage, &attempt.target.url).await;
                None
            }
        }
    }

    async fn capture(&self, surface: &dyn Surface, stage: Stage, target_url: &str) {
        fail_open("diagnostics::capture", || {
            self.diagnostics.capture(surface, stage, target_url)
        })
        .await;
    }

    async fn where_am_i(&self, surface: &dyn Surface) -> String {
        surface
            .current_url()
            .await
            .unwrap_or_else(|_| "unknown address".to_string())
    }

    async fn pause(&self) {
        self.delays.sleep(self.pacing.min_ms, self.pacing.max_ms).await;
    }

    fn finish(&self, target: &Target, completion: Completion) -> TargetResult {
        match completion {
            Completion::Success { confirmed } => {
                info!("Sent message to {} ({})", target.url, target.name());
                TargetResult::Outcome(InteractionOutcome::sent(target, confirmed))
            }
            Completion::Failure(reason) => {
                warn!("Target {} failed: {}", target.url, reason);
                TargetResult::Outcome(InteractionOutcome::failed(target, reason))
            }
            Completion::Fatal(reason) => TargetResult::Fatal(reason),
        }
    }
}

/// Per-target scratch state for the driver
struct Attempt<'a, S: Surface> {
    session: &'a mut SessionManager<S>,
    target: &'a Target,
    message: String,
    resolved: HashMap<Role, ElementRef>,
}

impl<S: Surface> Attempt<'_, S> {
    fn element(&self, role: Role) -> Result<ElementRef, Event> {
        self.resolved
            .get(&role)
            .cloned()
            .ok_or_else(|| Event::Fault(format!("{} used before it was resolved", role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_browser::{FakeElement, FakePage, FakeSurface, LocatorStrategy};
    use outreach_core::config::SessionConfig;
    use outreach_core::{FailureReason, OutcomeStatus, Query, SessionToken};

    const PROFILE: &str = "https://site.test/in/ada";

    fn element(role: Role) -> FakeElement {
        let query = LocatorStrategy::builtin(role).candidates[0].clone();
        FakeElement::new(role.to_string(), query).requires_auth()
    }

    async fn signed_in(page: FakePage) -> SessionManager<FakeSurface> {
        let surface = FakeSurface::new()
            .accept_token("good-token")
            .with_common(element(Role::LoggedInMarker))
            .with_page(PROFILE, page);
        let config = SessionConfig {
            entry_url: "https://site.test/".to_string(),
            ..SessionConfig::default()
        };
        let mut session =
            SessionManager::new(surface, config, Some(SessionToken::parse("good-token").unwrap()));
        session.ensure_authenticated().await.unwrap();
        session
    }

    fn protocol() -> InteractionProtocol {
        InteractionProtocol::new("Hello {first_name} from {company}")
            .with_delays(DelayGenerator::seeded(3), Pacing::NONE)
    }

    #[tokio::test]
    async fn test_run_sends_rendered_message() {
        let mut session = signed_in(
            FakePage::new()
                .element(element(Role::ComposeAffordance))
                .element(element(Role::InputField))
                .element(element(Role::SendAffordance)),
        )
        .await;
        let target = Target::new(PROFILE)
            .with_name("Ada", "Lovelace")
            .with_attribute("company", "Analytical");

        let result = protocol().run(&mut session, &target).await;
        let TargetResult::Outcome(outcome) = result else {
            panic!("expected an outcome, got {:?}", result);
        };
        assert_eq!(outcome.status, OutcomeStatus::Sent);
        assert!(outcome.is_unconfirmed());

        let surface = session.surface();
        assert_eq!(
            surface.clicks(),
            vec!["compose_affordance".to_string(), "send_affordance".to_string()]
        );
        assert_eq!(
            surface.fills(),
            vec![(
                "input_field".to_string(),
                "Hello Ada from Analytical".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_input_never_reaches_send() {
        let mut session = signed_in(
            FakePage::new()
                .element(element(Role::ComposeAffordance))
                .element(element(Role::SendAffordance)),
        )
        .await;

        let result = protocol().run(&mut session, &Target::new(PROFILE)).await;
        let TargetResult::Outcome(outcome) = result else {
            panic!("expected an outcome, got {:?}", result);
        };
        assert_eq!(outcome.failure_reason, Some(FailureReason::InputFieldNotFound));
        assert_eq!(session.surface().clicks(), vec!["compose_affordance".to_string()]);
    }

    #[tokio::test]
    async fn test_send_falls_back_to_later_candidate() {
        let mut session = signed_in(
            FakePage::new()
                .element(element(Role::ComposeAffordance))
                .element(element(Role::InputField))
                .element(FakeElement::new("send", Query::css("button.alt-send")).requires_auth()),
        )
        .await;
        let resolver = {
            let mut resolver = LocatorResolver::with_defaults();
            resolver.set(LocatorStrategy::new(
                Role::SendAffordance,
                vec![Query::css("button.primary-send"), Query::css("button.alt-send")],
            ));
            resolver
        };

        let result = protocol()
            .with_resolver(resolver)
            .run(&mut session, &Target::new(PROFILE))
            .await;
        assert!(matches!(
            result,
            TargetResult::Outcome(ref outcome) if outcome.status == OutcomeStatus::Sent
        ));
        assert_eq!(session.surface().clicks().last().map(String::as_str), Some("send"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_follows_compose_click() {
        let mut session = signed_in(
            FakePage::new()
                .element(element(Role::ComposeAffordance))
                .element(element(Role::SendAffordance)),
        )
        .await;
        let protocol = InteractionProtocol::new("Hello")
            .with_delays(DelayGenerator::seeded(3), Pacing::new(1_000, 1_000));

        let started = tokio::time::Instant::now();
        let result = protocol.run(&mut session, &Target::new(PROFILE)).await;
        let elapsed = started.elapsed();

        assert!(matches!(
            result,
            TargetResult::Outcome(ref outcome)
                if outcome.failure_reason == Some(FailureReason::InputFieldNotFound)
        ));
        // One pause after navigating, one after the compose click
        assert!(elapsed >= Duration::from_millis(2_000), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3_000), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_challenge_after_send_is_fatal() {
        let mut session = signed_in(
            FakePage::new()
                .element(element(Role::ComposeAffordance))
                .element(element(Role::InputField))
                .element(
                    element(Role::SendAffordance)
                        .leads_to("https://site.test/checkpoint/challenge/verify"),
                ),
        )
        .await;

        let result = protocol().run(&mut session, &Target::new(PROFILE)).await;
        assert!(
            matches!(result, TargetResult::Fatal(FatalReason::ChallengeDetected(_))),
            "got {:?}",
            result
        );
        assert_eq!(
            session.surface().clicks().last().map(String::as_str),
            Some("send_affordance")
        );
    }
}
