//! # outreach-engine
//!
//! Session management, the per-target interaction protocol and run
//! orchestration.
//!
//! Control flows one way: the [`Orchestrator`] asks the [`SessionManager`]
//! for a verified session, then hands it to the [`InteractionProtocol`] one
//! target at a time and appends each outcome to the [`OutcomeLedger`].
//! Nothing here runs concurrently; one session owns one surface for the
//! whole run.

pub mod activity_logger;
pub mod delay;
pub mod ledger;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod state_machine;

pub use activity_logger::ActivityLogger;
pub use delay::{DelayGenerator, Pacing};
pub use ledger::{load_records, new_run_id, LedgerRecord, OutcomeLedger};
pub use orchestrator::{Orchestrator, RunAborted, RunOptions};
pub use protocol::{InteractionProtocol, TargetResult};
pub use session::{Session, SessionManager};
pub use state_machine::{transition, Action, Completion, Event, Step};
