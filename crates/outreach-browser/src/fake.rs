//! In-memory surface for testing
//!
//! [`FakeSurface`] models a site as a set of pages keyed by url. Elements
//! marked `requires_auth` only exist while the injected session cookie
//! matches the accepted token, which is enough to exercise session checks,
//! re-authentication and every locator fallback path without a browser.

use async_trait::async_trait;
use outreach_core::{OutreachError, Query, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::surface::{ElementRef, SessionCookie, Surface};

/// Element on a fake page
#[derive(Debug, Clone)]
pub struct FakeElement {
    /// Name used in recorded events
    pub label: String,
    pub query: Query,
    pub visible: bool,
    pub requires_auth: bool,
    pub fails_on_click: bool,
    /// Address the page moves to when clicked
    pub leads_to: Option<String>,
}

impl FakeElement {
    pub fn new(label: impl Into<String>, query: Query) -> Self {
        Self {
            label: label.into(),
            query,
            visible: true,
            requires_auth: false,
            fails_on_click: false,
            leads_to: None,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails_on_click = true;
        self
    }

    /// Clicking moves the page to `url`
    pub fn leads_to(mut self, url: impl Into<String>) -> Self {
        self.leads_to = Some(url.into());
        self
    }
}

/// One url's page
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: Vec<FakeElement>,
    redirect: Option<String>,
    times_out: bool,
    session_drops: usize,
    revokes_credential: bool,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Land on `url` instead of the requested address
    pub fn redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }

    /// Navigation never completes within its bound
    pub fn times_out(mut self) -> Self {
        self.times_out = true;
        self
    }

    /// First visit clears the session cookie
    pub fn drops_session(mut self) -> Self {
        self.session_drops = 1;
        self
    }

    /// Every visit clears the session cookie
    pub fn always_drops_session(mut self) -> Self {
        self.session_drops = usize::MAX;
        self
    }

    /// Visiting invalidates the credential for good
    pub fn revokes_credential(mut self) -> Self {
        self.revokes_credential = true;
        self
    }
}

/// Action recorded by the fake surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Navigated(String),
    Reloaded,
    CookieSet { name: String, domain: String },
    Clicked(String),
    Filled { label: String, text: String },
    Screenshot,
    Html,
}

#[derive(Debug, Default)]
struct FakeState {
    current_url: String,
    cookie_value: Option<String>,
    accepted_token: Option<String>,
    common: Vec<FakeElement>,
    pages: HashMap<String, FakePage>,
    broken: Vec<Query>,
    events: Vec<SurfaceEvent>,
}

impl FakeState {
    fn signed_in(&self) -> bool {
        match (&self.cookie_value, &self.accepted_token) {
            (Some(cookie), Some(accepted)) => cookie == accepted,
            _ => false,
        }
    }

    /// Elements present on the current page, in document order
    fn present(&self) -> Vec<&FakeElement> {
        let signed_in = self.signed_in();
        self.pages
            .get(&self.current_url)
            .map(|page| page.elements.iter())
            .into_iter()
            .flatten()
            .chain(self.common.iter())
            .filter(|e| signed_in || !e.requires_auth)
            .collect()
    }

    fn matches(&self, query: &Query) -> Vec<&FakeElement> {
        self.present()
            .into_iter()
            .filter(|e| &e.query == query)
            .collect()
    }

    fn element(&self, element: &ElementRef) -> Result<FakeElement> {
        self.matches(&element.query)
            .get(element.index)
            .map(|e| (*e).clone())
            .ok_or_else(|| OutreachError::Browser(format!("stale element {}", element)))
    }
}

/// In-memory [`Surface`]
#[derive(Debug, Default)]
pub struct FakeSurface {
    state: Mutex<FakeState>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that authenticates when injected as the session cookie
    pub fn accept_token(self, token: impl Into<String>) -> Self {
        self.lock().accepted_token = Some(token.into());
        self
    }

    /// Element present on every page, after the page's own elements
    pub fn with_common(self, element: FakeElement) -> Self {
        self.lock().common.push(element);
        self
    }

    pub fn with_page(self, url: impl Into<String>, page: FakePage) -> Self {
        self.lock().pages.insert(url.into(), page);
        self
    }

    /// Evaluating `query` raises an error
    pub fn with_broken_query(self, query: Query) -> Self {
        self.lock().broken.push(query);
        self
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.lock().events.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Navigated(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Clicked(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Filled { label, text } => Some((label.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock().signed_in()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Surface for FakeSurface {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        state.events.push(SurfaceEvent::Navigated(url.to_string()));

        let page = state.pages.get(url).cloned().unwrap_or_default();
        if page.times_out {
            return Err(OutreachError::NavigationTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }

        if page.revokes_credential {
            state.accepted_token = None;
            state.cookie_value = None;
        }
        if page.session_drops > 0 {
            state.cookie_value = None;
            if let Some(stored) = state.pages.get_mut(url) {
                stored.session_drops = stored.session_drops.saturating_sub(1);
            }
        }

        state.current_url = page.redirect.unwrap_or_else(|| url.to_string());
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        self.lock().events.push(SurfaceEvent::Reloaded);
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().current_url.clone())
    }

    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()> {
        let mut state = self.lock();
        state.events.push(SurfaceEvent::CookieSet {
            name: cookie.name.clone(),
            domain: cookie.domain.clone(),
        });
        state.cookie_value = Some(cookie.value.clone());
        Ok(())
    }

    async fn first_visible(&self, query: &Query) -> Result<Option<ElementRef>> {
        let state = self.lock();
        if state.broken.contains(query) {
            return Err(OutreachError::Browser(format!(
                "query {} failed: node detached during evaluation",
                query
            )));
        }

        Ok(state
            .matches(query)
            .iter()
            .position(|e| e.visible)
            .map(|index| ElementRef::new(query.clone(), index)))
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        let mut state = self.lock();
        let found = state.element(element)?;
        if found.fails_on_click {
            return Err(OutreachError::Browser(format!(
                "click on {} intercepted by overlay",
                found.label
            )));
        }
        state.events.push(SurfaceEvent::Clicked(found.label));
        if let Some(url) = found.leads_to {
            state.current_url = url;
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        let mut state = self.lock();
        let found = state.element(element)?;
        state.events.push(SurfaceEvent::Filled {
            label: found.label,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.lock().events.push(SurfaceEvent::Screenshot);
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn html(&self) -> Result<String> {
        let mut state = self.lock();
        state.events.push(SurfaceEvent::Html);
        let body: Vec<String> = state
            .present()
            .iter()
            .map(|e| format!("<div data-label=\"{}\"></div>", e.label))
            .collect();
        Ok(format!("<html><body>{}</body></html>", body.join("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn site() -> FakeSurface {
        FakeSurface::new()
            .accept_token("good")
            .with_common(FakeElement::new("nav", Query::css("nav.global")).requires_auth())
            .with_page(
                "https://site.test/in/ada",
                FakePage::new()
                    .element(FakeElement::new("ghost", Query::css("button.msg")).hidden())
                    .element(FakeElement::new("message", Query::css("button.msg"))),
            )
    }

    #[tokio::test]
    async fn test_auth_gated_elements() {
        let surface = site();
        surface.navigate("https://site.test/", TIMEOUT).await.unwrap();
        assert!(surface.first_visible(&Query::css("nav.global")).await.unwrap().is_none());

        surface
            .set_cookie(&SessionCookie::new("li_at", "good", ".site.test"))
            .await
            .unwrap();
        assert!(surface.is_signed_in());
        assert!(surface.first_visible(&Query::css("nav.global")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_first_visible_skips_hidden_matches() {
        let surface = site();
        surface.navigate("https://site.test/in/ada", TIMEOUT).await.unwrap();

        let found = surface.first_visible(&Query::css("button.msg")).await.unwrap().unwrap();
        assert_eq!(found.index, 1);

        surface.click(&found).await.unwrap();
        assert_eq!(surface.clicks(), vec!["message".to_string()]);
    }

    #[tokio::test]
    async fn test_broken_query_errors() {
        let surface = site().with_broken_query(Query::css("button.msg"));
        surface.navigate("https://site.test/in/ada", TIMEOUT).await.unwrap();
        assert!(surface.first_visible(&Query::css("button.msg")).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_and_session_drop() {
        let surface = FakeSurface::new()
            .accept_token("good")
            .with_page("https://site.test/slow", FakePage::new().times_out())
            .with_page("https://site.test/drop", FakePage::new().drops_session());

        let err = surface.navigate("https://site.test/slow", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, OutreachError::NavigationTimeout { timeout_secs: 5, .. }));

        surface
            .set_cookie(&SessionCookie::new("li_at", "good", ".site.test"))
            .await
            .unwrap();
        surface.navigate("https://site.test/drop", TIMEOUT).await.unwrap();
        assert!(!surface.is_signed_in());

        surface
            .set_cookie(&SessionCookie::new("li_at", "good", ".site.test"))
            .await
            .unwrap();
        surface.navigate("https://site.test/drop", TIMEOUT).await.unwrap();
        assert!(surface.is_signed_in());
    }

    #[tokio::test]
    async fn test_redirect_changes_current_url() {
        let surface = FakeSurface::new().with_page(
            "https://site.test/in/bob",
            FakePage::new().redirect_to("https://site.test/authwall"),
        );
        surface.navigate("https://site.test/in/bob", TIMEOUT).await.unwrap();
        assert_eq!(surface.current_url().await.unwrap(), "https://site.test/authwall");
    }

    #[tokio::test]
    async fn test_click_can_change_page() {
        let surface = FakeSurface::new().with_page(
            "https://site.test/in/ada",
            FakePage::new().element(
                FakeElement::new("send", Query::css("button.send"))
                    .leads_to("https://site.test/checkpoint/challenge"),
            ),
        );
        surface.navigate("https://site.test/in/ada", TIMEOUT).await.unwrap();
        let found = surface.first_visible(&Query::css("button.send")).await.unwrap().unwrap();

        surface.click(&found).await.unwrap();
        assert_eq!(
            surface.current_url().await.unwrap(),
            "https://site.test/checkpoint/challenge"
        );
    }

    #[tokio::test]
    async fn test_stale_element_click_fails() {
        let surface = site();
        surface.navigate("https://site.test/in/ada", TIMEOUT).await.unwrap();
        let found = surface.first_visible(&Query::css("button.msg")).await.unwrap().unwrap();

        surface.navigate("https://site.test/elsewhere", TIMEOUT).await.unwrap();
        assert!(surface.click(&found).await.is_err());
    }
}
