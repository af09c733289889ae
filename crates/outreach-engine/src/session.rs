//! Ownership and liveness of the single authenticated session
//!
//! [`SessionManager`] owns the surface for the whole run. The interaction
//! protocol borrows it mutably for one target at a time, so two targets can
//! never hold the surface at once.

use chrono::{DateTime, Utc};
use outreach_browser::{LocatorResolver, SessionCookie, Surface};
use outreach_core::config::{OutreachConfig, SessionConfig};
use outreach_core::{OutreachError, Result, Role, SessionToken};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::delay::{DelayGenerator, Pacing};

/// State of the one session of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub is_authenticated: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Whether the single mid-run re-authentication has been spent
    pub reauthenticated: bool,
}

/// Establishes, verifies and (once) re-establishes the session
pub struct SessionManager<S: Surface> {
    surface: S,
    config: SessionConfig,
    token: Option<SessionToken>,
    resolver: LocatorResolver,
    delays: DelayGenerator,
    pacing: Pacing,
    navigation_timeout: Duration,
    session: Session,
}

impl<S: Surface> SessionManager<S> {
    pub fn new(surface: S, config: SessionConfig, token: Option<SessionToken>) -> Self {
        Self {
            surface,
            config,
            token,
            resolver: LocatorResolver::with_defaults(),
            delays: DelayGenerator::new(),
            pacing: Pacing::NONE,
            navigation_timeout: Duration::from_secs(30),
            session: Session::default(),
        }
    }

    /// Manager wired from a loaded configuration
    ///
    /// `delays` should be the generator the rest of the run paces with.
    pub fn from_config(
        surface: S,
        config: &OutreachConfig,
        token: Option<SessionToken>,
        delays: DelayGenerator,
    ) -> Self {
        Self::new(surface, config.session.clone(), token)
            .with_resolver(LocatorResolver::with_defaults().with_overrides(&config.locators))
            .with_delays(
                delays,
                Pacing::new(config.run.delay_min_ms, config.run.delay_max_ms),
            )
            .with_navigation_timeout(Duration::from_secs(config.run.navigation_timeout_secs))
    }

    pub fn with_resolver(mut self, resolver: LocatorResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_delays(mut self, delays: DelayGenerator, pacing: Pacing) -> Self {
        self.delays = delays;
        self.pacing = pacing;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn delays(&self) -> &DelayGenerator {
        &self.delays
    }

    /// Release the surface at run end
    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Make sure a verified session exists
    ///
    /// Returns immediately if one was already established. Otherwise loads
    /// the entry page, injects the token as the session cookie, reloads and
    /// checks liveness.
    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        if self.session.is_authenticated {
            debug!("Session already verified");
            return Ok(());
        }

        let token = self.token.clone().ok_or_else(|| {
            OutreachError::Authentication("no session token supplied".to_string())
        })?;

        info!("Establishing session via {}", self.config.entry_url);
        self.surface
            .navigate(&self.config.entry_url, self.navigation_timeout)
            .await
            .map_err(|e| OutreachError::Authentication(format!("entry page unreachable: {}", e)))?;
        self.pause().await;

        let cookie = SessionCookie::new(
            self.config.cookie_name.as_str(),
            token.expose(),
            self.config.cookie_domain.as_str(),
        );
        self.surface
            .set_cookie(&cookie)
            .await
            .map_err(|e| OutreachError::Authentication(format!("cookie injection failed: {}", e)))?;

        self.surface
            .reload(self.navigation_timeout)
            .await
            .map_err(|e| OutreachError::Authentication(format!("reload failed: {}", e)))?;
        self.pause().await;

        if self.is_challenged().await {
            return Err(OutreachError::Challenge(
                "challenge shown while establishing the session".to_string(),
            ));
        }

        if !self.is_live().await {
            return Err(OutreachError::Authentication(
                "session token rejected or expired".to_string(),
            ));
        }

        self.session.is_authenticated = true;
        self.session.last_verified_at = Some(Utc::now());
        info!("Session established (token {})", token);
        Ok(())
    }

    /// Signed-in marker present and address not a login/checkpoint page
    pub async fn is_live(&self) -> bool {
        if !self
            .resolver
            .resolve(Role::LoggedInMarker, &self.surface)
            .await
            .is_found()
        {
            debug!("Logged-in marker absent");
            return false;
        }

        match self.surface.current_url().await {
            Ok(url) if matches_any(&url, &self.config.unauthenticated_url_patterns) => {
                debug!("Current address {} is an unauthenticated page", url);
                false
            }
            Ok(_) => true,
            Err(e) => {
                debug!("Could not read current address: {}", e);
                false
            }
        }
    }

    /// Challenge marker present or address on a challenge page
    pub async fn is_challenged(&self) -> bool {
        if self
            .resolver
            .resolve(Role::ChallengeMarker, &self.surface)
            .await
            .is_found()
        {
            return true;
        }

        match self.surface.current_url().await {
            Ok(url) => matches_any(&url, &self.config.challenge_url_patterns),
            Err(_) => false,
        }
    }

    /// Record a successful liveness check made by the protocol
    pub fn mark_verified(&mut self) {
        self.session.last_verified_at = Some(Utc::now());
    }

    /// Re-establish a session lost mid-run, at most once per run
    ///
    /// `Ok(false)` means the single attempt was already spent. An error
    /// means the attempt was made and failed, which ends the run.
    pub async fn re_authenticate_once(&mut self) -> Result<bool> {
        if self.session.reauthenticated {
            warn!("Session lost again; re-authentication already used this run");
            return Ok(false);
        }

        warn!("Session lost mid-run, re-authenticating");
        self.session.reauthenticated = true;
        self.session.is_authenticated = false;
        self.ensure_authenticated().await?;
        Ok(true)
    }

    async fn pause(&self) {
        self.delays.sleep(self.pacing.min_ms, self.pacing.max_ms).await;
    }
}

fn matches_any(url: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| !p.is_empty() && url.contains(p.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_browser::{FakeElement, FakePage, FakeSurface, SurfaceEvent};
    use outreach_core::Query;

    const ENTRY: &str = "https://site.test/";

    fn config() -> SessionConfig {
        SessionConfig {
            entry_url: ENTRY.to_string(),
            cookie_name: "li_at".to_string(),
            cookie_domain: ".site.test".to_string(),
            ..SessionConfig::default()
        }
    }

    fn site() -> FakeSurface {
        FakeSurface::new()
            .accept_token("good-token")
            .with_common(FakeElement::new("nav", Query::css("#global-nav")).requires_auth())
    }

    fn manager(surface: FakeSurface, token: Option<&str>) -> SessionManager<FakeSurface> {
        let token = token.map(|t| SessionToken::parse(t).unwrap());
        SessionManager::new(surface, config(), token).with_delays(DelayGenerator::seeded(1), Pacing::NONE)
    }

    #[tokio::test]
    async fn test_ensure_authenticated_injects_and_verifies() {
        let mut manager = manager(site(), Some("good-token"));
        manager.ensure_authenticated().await.unwrap();

        assert!(manager.session().is_authenticated);
        assert!(manager.session().last_verified_at.is_some());

        let events = manager.surface().events();
        assert_eq!(events[0], SurfaceEvent::Navigated(ENTRY.to_string()));
        assert_eq!(
            events[1],
            SurfaceEvent::CookieSet {
                name: "li_at".to_string(),
                domain: ".site.test".to_string()
            }
        );
        assert_eq!(events[2], SurfaceEvent::Reloaded);
    }

    #[test]
    fn test_from_config_paces_with_given_generator() {
        let delays = DelayGenerator::seeded(9);
        let manager =
            SessionManager::from_config(site(), &OutreachConfig::default(), None, delays.clone());
        assert!(manager.delays().shares_state(&delays));
    }

    #[tokio::test]
    async fn test_ensure_authenticated_is_idempotent() {
        let mut manager = manager(site(), Some("good-token"));
        manager.ensure_authenticated().await.unwrap();
        let before = manager.surface().events().len();

        manager.ensure_authenticated().await.unwrap();
        assert_eq!(manager.surface().events().len(), before);
    }

    #[tokio::test]
    async fn test_missing_token_is_authentication_error() {
        let mut manager = manager(site(), None);
        let err = manager.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, OutreachError::Authentication(_)));
        assert!(manager.surface().events().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_token_is_authentication_error() {
        let mut manager = manager(site(), Some("stale-token"));
        let err = manager.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, OutreachError::Authentication(_)));
        assert!(!manager.session().is_authenticated);
    }

    #[tokio::test]
    async fn test_challenge_during_login_is_reported() {
        let surface = site().with_page(
            ENTRY,
            FakePage::new().element(FakeElement::new("captcha", Query::css("#captcha-internal"))),
        );
        let mut manager = manager(surface, Some("good-token"));
        let err = manager.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, OutreachError::Challenge(_)));
    }

    #[tokio::test]
    async fn test_is_live_rejects_login_addresses() {
        let surface = site().with_page(
            "https://site.test/in/ada",
            FakePage::new().redirect_to("https://site.test/login?session_redirect=x"),
        );
        let mut manager = manager(surface, Some("good-token"));
        manager.ensure_authenticated().await.unwrap();
        assert!(manager.is_live().await);

        manager
            .surface()
            .navigate("https://site.test/in/ada", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!manager.is_live().await);
    }

    #[tokio::test]
    async fn test_is_challenged_by_address() {
        let surface = site().with_page(
            "https://site.test/in/ada",
            FakePage::new().redirect_to("https://site.test/checkpoint/challenge/abc"),
        );
        let manager = manager(surface, Some("good-token"));
        manager
            .surface()
            .navigate("https://site.test/in/ada", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(manager.is_challenged().await);
    }

    #[tokio::test]
    async fn test_reauthenticate_only_once() {
        let mut manager = manager(site(), Some("good-token"));
        manager.ensure_authenticated().await.unwrap();

        assert!(manager.re_authenticate_once().await.unwrap());
        assert!(manager.session().reauthenticated);
        assert!(!manager.re_authenticate_once().await.unwrap());
    }

    #[tokio::test]
    async fn test_reauthenticate_failure_is_error() {
        let surface = site().with_page("https://site.test/revoke", FakePage::new().revokes_credential());
        let mut manager = manager(surface, Some("good-token"));
        manager.ensure_authenticated().await.unwrap();

        manager
            .surface()
            .navigate("https://site.test/revoke", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!manager.is_live().await);

        let err = manager.re_authenticate_once().await.unwrap_err();
        assert!(matches!(err, OutreachError::Authentication(_)));
    }
}
