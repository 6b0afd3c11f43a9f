//! Browser capability interface
//!
//! The fetch workflow only ever talks to a [`Browser`]. The production
//! implementation is [`WebDriverClient`]; tests drive a scripted portal.

mod webdriver;

#[cfg(test)]
pub mod mock;

pub use webdriver::{firefox_capabilities, WebDriverClient, DEFAULT_WEBDRIVER_URL};

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;

/// Element lookup strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum By {
    #[serde(rename = "css")]
    Css(String),
    #[serde(rename = "xpath")]
    XPath(String),
    #[serde(rename = "link_text")]
    LinkText(String),
    #[serde(rename = "id")]
    Id(String),
}

impl By {
    /// W3C WebDriver `using` strategy and value
    pub fn strategy(&self) -> (&'static str, String) {
        match self {
            By::Css(s) => ("css selector", s.clone()),
            By::XPath(s) => ("xpath", s.clone()),
            By::LinkText(s) => ("link text", s.clone()),
            By::Id(s) => ("css selector", format!("#{}", s)),
        }
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            By::Css(s) => write!(f, "css `{}`", s),
            By::XPath(s) => write!(f, "xpath `{}`", s),
            By::LinkText(s) => write!(f, "link text `{}`", s),
            By::Id(s) => write!(f, "id `{}`", s),
        }
    }
}

/// Browser backend errors
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("WebDriver request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("WebDriver error `{error}`: {message}")]
    Protocol { error: String, message: String },

    #[error("Element is no longer attached to the page")]
    StaleElement,

    #[error("Unexpected WebDriver response: {0}")]
    UnexpectedResponse(String),

    #[error("No active browser session")]
    NoSession,
}

#[allow(async_fn_in_trait)]
pub trait Browser {
    type Element: Clone + fmt::Debug;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// First element matching `by`, or `None` if there is none
    async fn find(&mut self, by: &By) -> Result<Option<Self::Element>, BrowserError>;

    async fn find_all(&mut self, by: &By) -> Result<Vec<Self::Element>, BrowserError>;

    /// First descendant of `parent` matching `by`
    async fn find_in(
        &mut self,
        parent: &Self::Element,
        by: &By,
    ) -> Result<Option<Self::Element>, BrowserError>;

    /// Rendered text of an element
    async fn text(&mut self, element: &Self::Element) -> Result<String, BrowserError>;

    async fn attribute(
        &mut self,
        element: &Self::Element,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    async fn click(&mut self, element: &Self::Element) -> Result<(), BrowserError>;

    async fn send_keys(&mut self, element: &Self::Element, text: &str) -> Result<(), BrowserError>;

    /// Displayed and enabled
    async fn is_clickable(&mut self, element: &Self::Element) -> Result<bool, BrowserError>;

    /// Full markup of the current page
    async fn page_source(&mut self) -> Result<String, BrowserError>;
}

/// What a bounded wait is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitCondition {
    Present,
    Clickable,
}

/// Poll for an element until it satisfies `condition` or `timeout` runs out
///
/// Returns `Ok(None)` on timeout. The element is checked at least once, and
/// stale references seen while polling are treated as "not yet".
pub async fn wait_for<B: Browser, C: Clock>(
    browser: &mut B,
    clock: &C,
    by: &By,
    condition: WaitCondition,
    timeout: Duration,
    poll: Duration,
) -> Result<Option<B::Element>, BrowserError> {
    let start = clock.now();

    loop {
        if let Some(element) = browser.find(by).await? {
            let ready = match condition {
                WaitCondition::Present => true,
                WaitCondition::Clickable => match browser.is_clickable(&element).await {
                    Ok(clickable) => clickable,
                    Err(BrowserError::StaleElement) => false,
                    Err(e) => return Err(e),
                },
            };
            if ready {
                return Ok(Some(element));
            }
        }

        let waited = clock.now().saturating_duration_since(start);
        if waited >= timeout {
            debug!("Gave up waiting for {} after {:?}", by, waited);
            return Ok(None);
        }
        clock.sleep(poll.min(timeout - waited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBrowser, MockPortal};
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn test_id_strategy_maps_to_css() {
        assert_eq!(By::Id("username".into()).strategy(), ("css selector", "#username".to_string()));
        assert_eq!(By::LinkText("Next".into()).strategy().0, "link text");
    }

    #[tokio::test]
    async fn test_wait_for_times_out_at_bound() {
        let mut browser = MockBrowser::new(MockPortal::default());
        let clock = FakeClock::new();

        let found = wait_for(
            &mut browser,
            &clock,
            &By::Css(".nothing".into()),
            WaitCondition::Present,
            Duration::from_secs(10),
            Duration::from_millis(400),
        )
        .await
        .unwrap();

        assert!(found.is_none());
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }
}
