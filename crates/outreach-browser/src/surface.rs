//! The rendered-surface capability
//!
//! Everything the engine does to the remote site goes through [`Surface`]:
//! navigation, cookie injection, element lookup and the two interactions
//! (click and fill). Implementations decide how a [`Query`] is evaluated.

use async_trait::async_trait;
use outreach_core::{Query, Result};
use std::time::Duration;

/// Handle to one element: the `index`-th raw match of `query`
///
/// Handles are re-resolved on use, so they survive re-renders that keep
/// document order intact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub query: Query,
    pub index: usize,
}

impl ElementRef {
    pub fn new(query: Query, index: usize) -> Self {
        Self { query, index }
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.query, self.index)
    }
}

/// Session cookie injected to authenticate
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
        }
    }
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("value", &"***")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .finish()
    }
}

/// A live, queryable page owned by one session
#[async_trait]
pub trait Surface: Send + Sync {
    /// Load `url` and wait for it, failing with `NavigationTimeout` past `timeout`
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Reload the current page
    async fn reload(&self, timeout: Duration) -> Result<()>;

    /// Address of the current page
    async fn current_url(&self) -> Result<String>;

    /// Install the session cookie for subsequent requests
    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()>;

    /// First visible match of `query` in document order
    async fn first_visible(&self, query: &Query) -> Result<Option<ElementRef>>;

    /// Activate an element
    async fn click(&self, element: &ElementRef) -> Result<()>;

    /// Replace the content of an editable element with `text`
    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()>;

    /// PNG screenshot of the viewport
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Serialized document
    async fn html(&self) -> Result<String>;
}
