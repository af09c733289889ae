//! Rendered-surface access for the outreach engine
//!
//! This crate provides everything that touches a page:
//!
//! - [`surface`]: the [`Surface`] capability the engine drives
//! - [`locator`]: role-based element location with ordered fallback
//! - [`chrome`]: a Chrome DevTools Protocol surface via `headless_chrome`
//! - [`fake`]: an in-memory surface for tests
//! - [`diagnostics`]: advisory screenshot/HTML snapshots
//!
//! # Example
//!
//! ```no_run
//! use outreach_browser::{ChromeSurface, LocatorResolver, Resolution, Surface};
//! use outreach_core::config::BrowserSettings;
//! use outreach_core::Role;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let surface = ChromeSurface::start(&BrowserSettings::default()).await?;
//!     surface
//!         .navigate("https://www.linkedin.com/", Duration::from_secs(30))
//!         .await?;
//!
//!     let resolver = LocatorResolver::with_defaults();
//!     if let Resolution::Found(marker) = resolver.resolve(Role::LoggedInMarker, &surface).await {
//!         println!("signed in, marker at {}", marker);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Requirements
//!
//! - Chrome or Chromium installed for [`ChromeSurface`]
//! - To attach to a running browser, start it with
//!   `--remote-debugging-port=9222` and pass its websocket address

pub mod chrome;
pub mod diagnostics;
pub mod fake;
pub mod locator;
pub mod surface;

// Re-export commonly used types
pub use chrome::ChromeSurface;
pub use diagnostics::{DiagnosticSink, FileDiagnostics, NoDiagnostics, Stage};
pub use fake::{FakeElement, FakePage, FakeSurface, SurfaceEvent};
pub use locator::{LocatorResolver, LocatorStrategy, Resolution};
pub use surface::{ElementRef, SessionCookie, Surface};
