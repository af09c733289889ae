//! Chrome DevTools Protocol implementation of [`Surface`]
//!
//! `headless_chrome` is synchronous, so every call runs on the blocking
//! pool with its own clone of the tab handle.

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use outreach_core::config::BrowserSettings;
use outreach_core::{OutreachError, Query, Result};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::surface::{ElementRef, SessionCookie, Surface};

/// Keep the browser alive through long inter-target pauses
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Extra time granted to the blocking call beyond the CDP wait itself
const NAVIGATION_GRACE: Duration = Duration::from_secs(2);

const IS_VISIBLE_JS: &str = r#"function() {
    const rect = this.getBoundingClientRect();
    const style = window.getComputedStyle(this);
    return rect.width > 0 && rect.height > 0
        && style.visibility !== 'hidden' && style.display !== 'none';
}"#;

const FILL_JS: &str = r#"function(text) {
    this.focus();
    if (this.isContentEditable) {
        this.innerHTML = '';
        document.execCommand('insertText', false, text);
    } else {
        this.value = '';
        this.value = text;
    }
    this.dispatchEvent(new Event('input', { bubbles: true }));
    return true;
}"#;

/// Browser tab driven over CDP
pub struct ChromeSurface {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSurface {
    /// Launch a new browser, or attach when `debug_ws_url` is set
    pub async fn start(settings: &BrowserSettings) -> Result<Self> {
        match &settings.debug_ws_url {
            Some(ws_url) => Self::connect(ws_url).await,
            None => Self::launch(settings).await,
        }
    }

    /// Launch a new browser instance
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            settings.headless, settings.window_width, settings.window_height
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some((settings.window_width, settings.window_height)))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|e| OutreachError::Browser(format!("Invalid launch options: {}", e)))?;

        let user_agent_arg: Option<String> = settings
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));
        if let Some(ref ua_arg) = user_agent_arg {
            launch_options.args.push(OsStr::new(ua_arg));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| OutreachError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| OutreachError::Browser(format!("Failed to create tab: {}", e)))?;

        info!("Browser launched successfully");
        Ok(Self { browser, tab })
    }

    /// Attach to a browser started with `--remote-debugging-port`
    pub async fn connect(ws_url: &str) -> Result<Self> {
        info!("Connecting to existing browser at {}", ws_url);

        let browser = Browser::connect_with_timeout(ws_url.to_string(), IDLE_BROWSER_TIMEOUT)
            .map_err(|e| OutreachError::Browser(format!("Failed to connect to browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| OutreachError::Browser(format!("Failed to create tab: {}", e)))?;

        info!("Connected to browser successfully");
        Ok(Self { browser, tab })
    }

    /// Run a blocking tab operation off the async executor
    async fn with_tab<F, T>(&self, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| OutreachError::Browser(format!("{} task aborted: {}", what, e)))?
            .map_err(|e| OutreachError::Browser(format!("{} failed: {}", what, e)))
    }

    /// Wait for a navigation-like operation, mapping overruns to `NavigationTimeout`
    async fn navigation<F>(&self, url: &str, timeout: Duration, f: F) -> Result<()>
    where
        F: FnOnce(&Tab) -> anyhow::Result<()> + Send + 'static,
    {
        let timeout_error = || OutreachError::NavigationTimeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        };

        let tab = Arc::clone(&self.tab);
        let task = tokio::task::spawn_blocking(move || {
            tab.set_default_timeout(timeout);
            f(&tab)
        });

        match tokio::time::timeout(timeout + NAVIGATION_GRACE, task).await {
            Err(_) => Err(timeout_error()),
            Ok(Err(join)) => Err(OutreachError::Browser(format!(
                "navigation task aborted: {}",
                join
            ))),
            Ok(Ok(Err(e))) if looks_like_timeout(&e) => Err(timeout_error()),
            Ok(Ok(Err(e))) => Err(OutreachError::Browser(format!(
                "Failed to navigate to {}: {}",
                url, e
            ))),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}

fn looks_like_timeout(error: &anyhow::Error) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("timeout") || message.contains("timed out") || message.contains("never came")
}

fn find_all<'t>(tab: &'t Tab, query: &Query) -> anyhow::Result<Vec<Element<'t>>> {
    match query {
        Query::Css(selector) => tab.find_elements(selector),
        Query::XPath(expr) => tab.find_elements_by_xpath(expr),
        Query::Text { tag, text } => tab.find_elements_by_xpath(&Query::text_xpath(tag, text)),
    }
}

fn is_visible(element: &Element<'_>) -> bool {
    element
        .call_js_fn(IS_VISIBLE_JS, vec![], false)
        .ok()
        .and_then(|remote| remote.value)
        .and_then(|value| value.as_bool())
        .unwrap_or(false)
}

fn nth<'t>(tab: &'t Tab, element: &ElementRef) -> anyhow::Result<Element<'t>> {
    find_all(tab, &element.query)?
        .into_iter()
        .nth(element.index)
        .ok_or_else(|| anyhow::anyhow!("element {} is no longer attached", element))
}

#[async_trait]
impl Surface for ChromeSurface {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!("Navigating to {}", url);
        let target = url.to_string();
        self.navigation(url, timeout, move |tab| {
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(())
        })
        .await?;
        info!("Successfully navigated to {}", url);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn reload(&self, timeout: Duration) -> Result<()> {
        let url = self.current_url().await?;
        self.navigation(&url, timeout, |tab| {
            tab.reload(false, None)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn current_url(&self) -> Result<String> {
        self.with_tab("get url", |tab| Ok(tab.get_url())).await
    }

    #[instrument(skip(self, cookie), fields(name = %cookie.name, domain = %cookie.domain))]
    async fn set_cookie(&self, cookie: &SessionCookie) -> Result<()> {
        let param: CookieParam = serde_json::from_value(serde_json::json!({
            "name": cookie.name,
            "value": cookie.value,
            "domain": cookie.domain,
            "path": cookie.path,
            "secure": true,
            "httpOnly": true,
        }))?;

        self.with_tab("set cookie", move |tab| tab.set_cookies(vec![param]))
            .await
    }

    async fn first_visible(&self, query: &Query) -> Result<Option<ElementRef>> {
        let owned = query.clone();
        let index = self
            .with_tab("query", move |tab| {
                // No match surfaces as an error from the CDP lookup
                let elements = match find_all(tab, &owned) {
                    Ok(elements) => elements,
                    Err(_) => return Ok(None),
                };
                Ok(elements.iter().position(is_visible))
            })
            .await?;

        Ok(index.map(|i| ElementRef::new(query.clone(), i)))
    }

    #[instrument(skip(self), fields(element = %element))]
    async fn click(&self, element: &ElementRef) -> Result<()> {
        let target = element.clone();
        self.with_tab("click", move |tab| {
            let found = nth(tab, &target)?;
            found.scroll_into_view()?;
            found.click()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, text), fields(element = %element, chars = text.chars().count()))]
    async fn fill(&self, element: &ElementRef, text: &str) -> Result<()> {
        let target = element.clone();
        let text = text.to_string();
        self.with_tab("fill", move |tab| {
            let found = nth(tab, &target)?;
            found.scroll_into_view()?;
            found.call_js_fn(FILL_JS, vec![serde_json::Value::String(text)], false)?;
            Ok(())
        })
        .await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with_tab("screenshot", |tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    async fn html(&self) -> Result<String> {
        self.with_tab("page content", |tab| tab.get_content()).await
    }
}

impl Drop for ChromeSurface {
    fn drop(&mut self) {
        debug!("ChromeSurface dropped, browser will be cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_detection() {
        assert!(looks_like_timeout(&anyhow::anyhow!(
            "The event waited for never came"
        )));
        assert!(looks_like_timeout(&anyhow::anyhow!("Navigation Timeout")));
        assert!(!looks_like_timeout(&anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED")));
    }
}
