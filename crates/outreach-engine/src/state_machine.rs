//! Pure state machine for the per-target interaction protocol
//!
//! No I/O happens here. [`transition`] maps the current step and the event
//! produced by the last action to the next step plus the actions the driver
//! must perform. Invalid transitions end the target with an unexpected-error
//! failure; the function never panics.

use outreach_browser::Stage;
use outreach_core::{FailureReason, FatalReason, Role};

/// Protocol step for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Pending,
    /// Loading the target address; `reauthenticated` once the session was rebuilt
    Navigating { reauthenticated: bool },
    /// Checking for a challenge, then for a live session
    VerifyingSession { reauthenticated: bool },
    /// Spending the run's single re-authentication
    Reauthenticating,
    ResolvingCompose,
    /// Opening the composer, locating the input and filling it
    Composing,
    ResolvingSend,
    Sending,
    VerifyingSent,
    Done(Completion),
}

impl Step {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Terminal result of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success { confirmed: bool },
    Failure(FailureReason),
    /// Aborts the whole run, not just this target
    Fatal(FatalReason),
}

/// Result of the action the driver last performed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Navigated,
    NavigationTimedOut,
    ChallengeDetected(String),
    SessionVerified,
    SessionLost,
    Reauthenticated,
    /// The run's re-authentication was already spent
    ReauthExhausted,
    ReauthFailed(String),
    Resolved(Role),
    Missing(Role),
    Activated(Role),
    Filled,
    Confirmed,
    Unconfirmed,
    /// Any unclassified error raised by a step
    Fault(String),
}

/// Work the driver performs after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Navigate,
    VerifySession,
    Reauthenticate,
    Resolve(Role),
    Activate(Role),
    /// Clear the resolved input field and type the rendered message
    Fill,
    ConfirmSent,
    /// Advisory snapshot; produces no event
    Capture(Stage),
}

/// Pure transition function
///
/// Takes the current step and an event, returns the next step and the
/// actions to perform. A `Done` step absorbs every event.
pub fn transition(step: Step, event: Event) -> (Step, Vec<Action>) {
    match (step, event) {
        // Terminal steps stay terminal
        (done @ Step::Done(_), _) => (done, vec![]),

        // A challenge anywhere aborts the run
        (_, Event::ChallengeDetected(detail)) => (
            Step::Done(Completion::Fatal(FatalReason::ChallengeDetected(detail))),
            vec![Action::Capture(Stage::OnFailure)],
        ),

        (_, Event::Fault(message)) => fail(FailureReason::UnexpectedError { message }),

        (Step::Pending, Event::Begin) => (
            Step::Navigating {
                reauthenticated: false,
            },
            vec![Action::Navigate],
        ),

        // From Navigating
        (Step::Navigating { reauthenticated }, Event::Navigated) => (
            Step::VerifyingSession { reauthenticated },
            vec![Action::Capture(Stage::PostNavigation), Action::VerifySession],
        ),

        (Step::Navigating { .. }, Event::NavigationTimedOut) => {
            fail(FailureReason::NavigationTimeout)
        }

        // From VerifyingSession
        (Step::VerifyingSession { .. }, Event::SessionVerified) => (
            Step::ResolvingCompose,
            vec![Action::Resolve(Role::ComposeAffordance)],
        ),

        (
            Step::VerifyingSession {
                reauthenticated: false,
            },
            Event::SessionLost,
        ) => (Step::Reauthenticating, vec![Action::Reauthenticate]),

        (
            Step::VerifyingSession {
                reauthenticated: true,
            },
            Event::SessionLost,
        ) => fail(FailureReason::SessionLost),

        // From Reauthenticating: the target page must be loaded again
        (Step::Reauthenticating, Event::Reauthenticated) => (
            Step::Navigating {
                reauthenticated: true,
            },
            vec![Action::Navigate],
        ),

        (Step::Reauthenticating, Event::ReauthExhausted) => fail(FailureReason::SessionLost),

        (Step::Reauthenticating, Event::ReauthFailed(detail)) => (
            Step::Done(Completion::Fatal(FatalReason::ReauthenticationFailed(detail))),
            vec![Action::Capture(Stage::OnFailure)],
        ),

        // From ResolvingCompose
        (Step::ResolvingCompose, Event::Resolved(Role::ComposeAffordance)) => (
            Step::Composing,
            vec![Action::Activate(Role::ComposeAffordance)],
        ),

        // Composing: open the composer, find the input, fill it
        (Step::Composing, Event::Activated(Role::ComposeAffordance)) => {
            (Step::Composing, vec![Action::Resolve(Role::InputField)])
        }

        (Step::Composing, Event::Resolved(Role::InputField)) => {
            (Step::Composing, vec![Action::Fill])
        }

        (Step::Composing, Event::Filled) => (
            Step::ResolvingSend,
            vec![
                Action::Capture(Stage::PostCompose),
                Action::Resolve(Role::SendAffordance),
            ],
        ),

        // From ResolvingSend
        (Step::ResolvingSend, Event::Resolved(Role::SendAffordance)) => (
            Step::Sending,
            vec![Action::Activate(Role::SendAffordance)],
        ),

        // From Sending
        (Step::Sending, Event::Activated(Role::SendAffordance)) => {
            (Step::VerifyingSent, vec![Action::ConfirmSent])
        }

        // From VerifyingSent: a missing marker is still a send
        (Step::VerifyingSent, Event::Confirmed) => (
            Step::Done(Completion::Success { confirmed: true }),
            vec![Action::Capture(Stage::PostSend)],
        ),

        (Step::VerifyingSent, Event::Unconfirmed) => (
            Step::Done(Completion::Success { confirmed: false }),
            vec![Action::Capture(Stage::PostSend)],
        ),

        // Required role with no matching candidate
        (Step::ResolvingCompose, Event::Missing(role @ Role::ComposeAffordance))
        | (Step::Composing, Event::Missing(role @ Role::InputField))
        | (Step::ResolvingSend, Event::Missing(role @ Role::SendAffordance)) => {
            fail(FailureReason::not_found(role))
        }

        (step, event) => fail(FailureReason::UnexpectedError {
            message: format!("invalid transition from {:?} on {:?}", step, event),
        }),
    }
}

fn fail(reason: FailureReason) -> (Step, Vec<Action>) {
    (
        Step::Done(Completion::Failure(reason)),
        vec![Action::Capture(Stage::OnFailure)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed events in order, returning the final step and every action emitted
    fn drive(events: Vec<Event>) -> (Step, Vec<Action>) {
        let mut step = Step::Pending;
        let mut all = Vec::new();
        for event in events {
            let (next, actions) = transition(step, event);
            all.extend(actions);
            step = next;
        }
        (step, all)
    }

    fn happy_path() -> Vec<Event> {
        vec![
            Event::Begin,
            Event::Navigated,
            Event::SessionVerified,
            Event::Resolved(Role::ComposeAffordance),
            Event::Activated(Role::ComposeAffordance),
            Event::Resolved(Role::InputField),
            Event::Filled,
            Event::Resolved(Role::SendAffordance),
            Event::Activated(Role::SendAffordance),
        ]
    }

    #[test]
    fn test_happy_path_full_flow() {
        let mut events = happy_path();
        events.push(Event::Confirmed);
        let (step, actions) = drive(events);

        assert_eq!(step, Step::Done(Completion::Success { confirmed: true }));
        assert_eq!(
            actions,
            vec![
                Action::Navigate,
                Action::Capture(Stage::PostNavigation),
                Action::VerifySession,
                Action::Resolve(Role::ComposeAffordance),
                Action::Activate(Role::ComposeAffordance),
                Action::Resolve(Role::InputField),
                Action::Fill,
                Action::Capture(Stage::PostCompose),
                Action::Resolve(Role::SendAffordance),
                Action::Activate(Role::SendAffordance),
                Action::ConfirmSent,
                Action::Capture(Stage::PostSend),
            ]
        );
    }

    #[test]
    fn test_missing_confirmation_is_unconfirmed_success() {
        let mut events = happy_path();
        events.push(Event::Unconfirmed);
        let (step, _) = drive(events);
        assert_eq!(step, Step::Done(Completion::Success { confirmed: false }));
    }

    #[test]
    fn test_navigation_timeout_fails_target() {
        let (step, actions) = drive(vec![Event::Begin, Event::NavigationTimedOut]);
        assert_eq!(
            step,
            Step::Done(Completion::Failure(FailureReason::NavigationTimeout))
        );
        assert_eq!(actions.last(), Some(&Action::Capture(Stage::OnFailure)));
    }

    #[test]
    fn test_each_missing_role_maps_to_its_reason() {
        let cases = [
            (3, Role::ComposeAffordance, FailureReason::ComposeAffordanceNotFound),
            (5, Role::InputField, FailureReason::InputFieldNotFound),
            (7, Role::SendAffordance, FailureReason::SendAffordanceNotFound),
        ];

        for (prefix, role, reason) in cases {
            let mut events: Vec<Event> = happy_path().into_iter().take(prefix).collect();
            events.push(Event::Missing(role));
            let (step, _) = drive(events);
            assert_eq!(step, Step::Done(Completion::Failure(reason)), "role {}", role);
        }
    }

    #[test]
    fn test_challenge_is_fatal() {
        let (step, _) = drive(vec![
            Event::Begin,
            Event::Navigated,
            Event::ChallengeDetected("captcha".to_string()),
        ]);
        assert_eq!(
            step,
            Step::Done(Completion::Fatal(FatalReason::ChallengeDetected(
                "captcha".to_string()
            )))
        );
    }

    #[test]
    fn test_session_loss_reauthenticates_then_renavigates() {
        let (step, actions) = drive(vec![
            Event::Begin,
            Event::Navigated,
            Event::SessionLost,
            Event::Reauthenticated,
            Event::Navigated,
            Event::SessionVerified,
        ]);
        assert_eq!(step, Step::ResolvingCompose);
        assert_eq!(
            actions.iter().filter(|a| **a == Action::Navigate).count(),
            2
        );
        assert!(actions.contains(&Action::Reauthenticate));
    }

    #[test]
    fn test_second_session_loss_fails_target() {
        let (step, actions) = drive(vec![
            Event::Begin,
            Event::Navigated,
            Event::SessionLost,
            Event::Reauthenticated,
            Event::Navigated,
            Event::SessionLost,
        ]);
        assert_eq!(step, Step::Done(Completion::Failure(FailureReason::SessionLost)));
        assert_eq!(
            actions.iter().filter(|a| **a == Action::Reauthenticate).count(),
            1
        );
    }

    #[test]
    fn test_spent_reauth_fails_target() {
        let (step, _) = drive(vec![
            Event::Begin,
            Event::Navigated,
            Event::SessionLost,
            Event::ReauthExhausted,
        ]);
        assert_eq!(step, Step::Done(Completion::Failure(FailureReason::SessionLost)));
    }

    #[test]
    fn test_failed_reauth_is_fatal() {
        let (step, _) = drive(vec![
            Event::Begin,
            Event::Navigated,
            Event::SessionLost,
            Event::ReauthFailed("token rejected".to_string()),
        ]);
        assert!(matches!(
            step,
            Step::Done(Completion::Fatal(FatalReason::ReauthenticationFailed(_)))
        ));
    }

    #[test]
    fn test_fault_from_any_step() {
        for prefix in 1..happy_path().len() {
            let mut events: Vec<Event> = happy_path().into_iter().take(prefix).collect();
            events.push(Event::Fault("boom".to_string()));
            let (step, _) = drive(events);
            assert_eq!(
                step,
                Step::Done(Completion::Failure(FailureReason::UnexpectedError {
                    message: "boom".to_string()
                })),
                "after {} events",
                prefix
            );
        }
    }

    #[test]
    fn test_invalid_transition_never_panics() {
        let (step, actions) = transition(Step::Pending, Event::Filled);
        assert!(matches!(
            step,
            Step::Done(Completion::Failure(FailureReason::UnexpectedError { .. }))
        ));
        assert_eq!(actions, vec![Action::Capture(Stage::OnFailure)]);

        // Mismatched role is invalid too
        let (step, _) = transition(Step::ResolvingSend, Event::Resolved(Role::InputField));
        assert!(step.is_done());
    }

    #[test]
    fn test_done_absorbs_events() {
        let done = Step::Done(Completion::Success { confirmed: true });
        let (step, actions) = transition(done.clone(), Event::Fault("late".to_string()));
        assert_eq!(step, done);
        assert!(actions.is_empty());
    }
}
