//! Run orchestration
//!
//! The [`Orchestrator`] establishes the session, then walks the target queue
//! in order: skip, attempt, record, pause. Per-target failures are recorded
//! and the run continues. Fatal conditions stop the run and come back as
//! [`RunAborted`] carrying the partial summary.

use outreach_browser::{DiagnosticSink, FileDiagnostics, LocatorResolver, NoDiagnostics, Surface};
use outreach_core::config::{OutreachConfig, RunConfig};
use outreach_core::{
    FatalReason, InteractionOutcome, OutcomeStatus, OutreachError, Result, RunState, RunSummary,
    SessionToken, SkipReason, Target,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::activity_logger::ActivityLogger;
use crate::delay::{DelayGenerator, Pacing};
use crate::ledger::OutcomeLedger;
use crate::protocol::{InteractionProtocol, TargetResult};
use crate::session::SessionManager;

/// A run stopped by a fatal condition
///
/// Outcomes recorded before the abort stay in the ledger; `summary` counts them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("run aborted: {reason} (before abort: {summary})")]
pub struct RunAborted {
    pub reason: FatalReason,
    pub summary: RunSummary,
}

/// Run-level policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Successful sends after which the run stops
    pub max_messages: usize,
    pub skip_already_sent: bool,
    /// Pause bounds between two attempted targets
    pub between_targets: Pacing,
}

impl RunOptions {
    pub fn from_config(run: &RunConfig) -> Self {
        Self {
            max_messages: run.max_messages,
            skip_already_sent: run.skip_already_sent,
            between_targets: Pacing::new(run.between_targets_min_ms, run.between_targets_max_ms),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&RunConfig::default())
    }
}

/// Drives one run over one session
pub struct Orchestrator<S: Surface> {
    session: SessionManager<S>,
    protocol: InteractionProtocol,
    ledger: OutcomeLedger,
    activity: Option<ActivityLogger>,
    delays: DelayGenerator,
    options: RunOptions,
}

impl<S: Surface> Orchestrator<S> {
    pub fn new(
        session: SessionManager<S>,
        protocol: InteractionProtocol,
        ledger: OutcomeLedger,
        options: RunOptions,
    ) -> Self {
        Self {
            session,
            protocol,
            ledger,
            activity: None,
            delays: DelayGenerator::new(),
            options,
        }
    }

    /// Orchestrator wired from a loaded configuration
    ///
    /// Relative paths resolve against `root`. Opening the ledger happens
    /// here so an unwritable ledger stops the run before any send.
    pub async fn from_config(
        surface: S,
        config: &OutreachConfig,
        token: Option<SessionToken>,
        root: &Path,
        run_id: &str,
    ) -> Result<Self> {
        let resolver = LocatorResolver::with_defaults().with_overrides(&config.locators);
        let delays = DelayGenerator::new();

        let diagnostics: Arc<dyn DiagnosticSink> = match &config.paths.diagnostics_dir {
            Some(dir) => Arc::new(FileDiagnostics::new(OutreachConfig::resolve_path(root, dir))),
            None => Arc::new(NoDiagnostics),
        };

        let protocol = InteractionProtocol::new(config.run.message_template.clone())
            .with_resolver(resolver)
            .with_delays(
                delays.clone(),
                Pacing::new(config.run.delay_min_ms, config.run.delay_max_ms),
            )
            .with_diagnostics(diagnostics)
            .with_navigation_timeout(Duration::from_secs(config.run.navigation_timeout_secs));

        let ledger_path = OutreachConfig::resolve_path(root, &config.paths.ledger);
        let ledger = OutcomeLedger::open(ledger_path, run_id).await?;
        let activity =
            ActivityLogger::new(OutreachConfig::resolve_path(root, &config.paths.activity_log));

        Ok(Self::new(
            SessionManager::from_config(surface, config, token, delays.clone()),
            protocol,
            ledger,
            RunOptions::from_config(&config.run),
        )
        .with_delays(delays)
        .with_activity_log(activity))
    }

    pub fn with_activity_log(mut self, activity: ActivityLogger) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn delays(&self) -> &DelayGenerator {
        &self.delays
    }

    /// Generator for the between-target pauses
    pub fn with_delays(mut self, delays: DelayGenerator) -> Self {
        self.delays = delays;
        self
    }

    pub fn session(&self) -> &SessionManager<S> {
        &self.session
    }

    pub fn ledger(&self) -> &OutcomeLedger {
        &self.ledger
    }

    /// Release the session, and with it the surface
    pub fn into_session(self) -> SessionManager<S> {
        self.session
    }

    /// Process `targets` in order until exhausted, capped, or aborted
    ///
    /// Targets past the send cap are never pulled from the iterator.
    #[instrument(skip_all, fields(run_id = %self.ledger.run_id()))]
    pub async fn run<I>(&mut self, targets: I) -> std::result::Result<RunSummary, RunAborted>
    where
        I: IntoIterator<Item = Target>,
    {
        let mut state = RunState::new(self.options.max_messages);
        info!(
            "Starting run {} (cap {})",
            self.ledger.run_id(),
            self.options.max_messages
        );
        if let Some(activity) = &self.activity {
            activity
                .log_run_start(self.ledger.run_id(), self.options.max_messages)
                .await;
        }

        if let Err(e) = self.session.ensure_authenticated().await {
            let reason = match e {
                OutreachError::Challenge(detail) => FatalReason::ChallengeDetected(detail),
                other => FatalReason::AuthenticationFailed(other.to_string()),
            };
            return Err(self.abort(reason, &state).await);
        }

        let mut already_sent = if self.options.skip_already_sent {
            match self.ledger.sent_urls().await {
                Ok(urls) => urls,
                Err(e) => {
                    return Err(self
                        .abort(FatalReason::LedgerUnavailable(e.to_string()), &state)
                        .await)
                }
            }
        } else {
            HashSet::new()
        };

        let mut targets = targets.into_iter();
        let mut attempted = 0usize;
        let stop_reason = loop {
            if state.cap_reached() {
                info!("Send cap of {} reached", self.options.max_messages);
                break "send cap reached";
            }
            let Some(target) = targets.next() else {
                break "targets exhausted";
            };

            if let Some(skip) = self.skip_reason(&target, &already_sent) {
                info!("Skipping {}: {}", target.url, skip);
                let outcome = InteractionOutcome::skipped(&target, skip);
                if let Err(reason) = self.commit(&mut state, &outcome).await {
                    return Err(self.abort(reason, &state).await);
                }
                continue;
            }

            if attempted > 0 {
                let pacing = self.options.between_targets;
                self.delays.sleep(pacing.min_ms, pacing.max_ms).await;
            }
            attempted += 1;

            match self.protocol.run(&mut self.session, &target).await {
                TargetResult::Outcome(outcome) => {
                    if let Err(reason) = self.commit(&mut state, &outcome).await {
                        return Err(self.abort(reason, &state).await);
                    }
                    if outcome.status == OutcomeStatus::Sent && self.options.skip_already_sent {
                        already_sent.insert(outcome.target_url);
                    }
                }
                TargetResult::Fatal(reason) => return Err(self.abort(reason, &state).await),
            }
        };

        let summary = state.summary();
        info!("Run finished ({}): {}", stop_reason, summary);
        if let Some(activity) = &self.activity {
            activity
                .log_run_complete(&summary, stop_reason, self.ledger.path())
                .await;
        }
        Ok(summary)
    }

    fn skip_reason(&self, target: &Target, already_sent: &HashSet<String>) -> Option<SkipReason> {
        if target.validate().is_err() {
            Some(SkipReason::InvalidUrl)
        } else if already_sent.contains(&target.url) {
            Some(SkipReason::AlreadySent)
        } else {
            None
        }
    }

    /// Count the outcome, then make it durable
    async fn commit(
        &self,
        state: &mut RunState,
        outcome: &InteractionOutcome,
    ) -> std::result::Result<(), FatalReason> {
        state.apply(outcome);
        self.ledger
            .record(outcome)
            .await
            .map_err(|e| FatalReason::LedgerUnavailable(e.to_string()))?;
        if let Some(activity) = &self.activity {
            activity.log_outcome(outcome).await;
        }
        Ok(())
    }

    async fn abort(&self, reason: FatalReason, state: &RunState) -> RunAborted {
        let summary = state.summary();
        error!("Run aborted: {} ({})", reason, summary);
        if let Some(activity) = &self.activity {
            activity.log_fatal(&reason, &summary).await;
        }
        RunAborted { reason, summary }
    }
}
