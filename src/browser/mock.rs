//! Scripted in-memory portal for workflow tests

use std::collections::HashMap;

use super::{Browser, BrowserError, By};
use crate::config::Selectors;

/// One listing row
pub struct MockRow {
    pub title: Option<String>,
    pub href: Option<String>,
}

impl MockRow {
    pub fn new(title: &str, href: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            href: Some(href.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Clickable,
    Disabled,
    Missing,
}

/// A document report view and what clicking its download control does
pub struct MockReport {
    pub control: ControlState,
    pub on_click: Option<Box<dyn FnMut()>>,
}

impl MockReport {
    pub fn clickable(on_click: impl FnMut() + 'static) -> Self {
        Self {
            control: ControlState::Clickable,
            on_click: Some(Box::new(on_click)),
        }
    }

    pub fn with_control(control: ControlState) -> Self {
        Self {
            control,
            on_click: None,
        }
    }
}

#[derive(Default)]
pub struct MockPortal {
    pub login_url: String,
    pub listing_url: String,
    pub pages: Vec<Vec<MockRow>>,
    /// Listing table never renders
    pub rows_hidden: bool,
    /// Login page has no form
    pub login_form_missing: bool,
    pub reports: HashMap<String, MockReport>,
}

impl MockPortal {
    pub fn new(pages: Vec<Vec<MockRow>>) -> Self {
        Self {
            login_url: "https://portal.test/login".into(),
            listing_url: "https://portal.test/folder".into(),
            pages,
            ..Default::default()
        }
    }

    pub fn report(mut self, url: &str, report: MockReport) -> Self {
        self.reports.insert(url.to_string(), report);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    Blank,
    Login,
    Listing(usize),
    Report(String),
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockElement {
    Username,
    Password,
    LoginButton,
    Row(usize),
    Title(usize),
    Action(usize),
    Next,
    Control,
}

pub struct MockBrowser {
    portal: MockPortal,
    selectors: Selectors,
    location: Location,
    /// Every navigation and click, in order
    pub actions: Vec<String>,
    pub typed: HashMap<String, String>,
}

impl MockBrowser {
    pub fn new(portal: MockPortal) -> Self {
        Self {
            portal,
            selectors: Selectors::default(),
            location: Location::Blank,
            actions: Vec::new(),
            typed: HashMap::new(),
        }
    }

    pub fn clicks(&self, what: &str) -> usize {
        let needle = format!("click:{}", what);
        self.actions.iter().filter(|a| **a == needle).count()
    }

    fn rows(&self) -> &[MockRow] {
        match self.location {
            Location::Listing(page) if !self.portal.rows_hidden => self
                .portal
                .pages
                .get(page)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        }
    }

    fn report(&self) -> Option<&MockReport> {
        match &self.location {
            Location::Report(url) => self.portal.reports.get(url),
            _ => None,
        }
    }
}

impl Browser for MockBrowser {
    type Element = MockElement;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.actions.push(format!("navigate:{}", url));
        self.location = if url == self.portal.login_url {
            Location::Login
        } else if url == self.portal.listing_url {
            Location::Listing(0)
        } else if self.portal.reports.contains_key(url) {
            Location::Report(url.to_string())
        } else {
            Location::Other(url.to_string())
        };
        Ok(())
    }

    async fn find(&mut self, by: &By) -> Result<Option<MockElement>, BrowserError> {
        let s = &self.selectors;
        let found = match &self.location {
            Location::Login if !self.portal.login_form_missing => {
                if *by == s.username_field {
                    Some(MockElement::Username)
                } else if *by == s.password_field {
                    Some(MockElement::Password)
                } else if *by == s.login_button {
                    Some(MockElement::LoginButton)
                } else {
                    None
                }
            }
            Location::Listing(page) => {
                if *by == s.document_row && !self.rows().is_empty() {
                    Some(MockElement::Row(0))
                } else if *by == s.next_page && page + 1 < self.portal.pages.len() {
                    Some(MockElement::Next)
                } else {
                    None
                }
            }
            Location::Report(_) if *by == s.download_control => self
                .report()
                .filter(|r| r.control != ControlState::Missing)
                .map(|_| MockElement::Control),
            _ => None,
        };
        Ok(found)
    }

    async fn find_all(&mut self, by: &By) -> Result<Vec<MockElement>, BrowserError> {
        if *by == self.selectors.document_row {
            return Ok((0..self.rows().len()).map(MockElement::Row).collect());
        }
        Ok(self.find(by).await?.into_iter().collect())
    }

    async fn find_in(
        &mut self,
        parent: &MockElement,
        by: &By,
    ) -> Result<Option<MockElement>, BrowserError> {
        let MockElement::Row(i) = *parent else {
            return Ok(None);
        };
        let Some(row) = self.rows().get(i) else {
            return Err(BrowserError::StaleElement);
        };
        let found = if *by == self.selectors.row_title {
            row.title.as_ref().map(|_| MockElement::Title(i))
        } else if *by == self.selectors.row_action {
            row.href.as_ref().map(|_| MockElement::Action(i))
        } else {
            None
        };
        Ok(found)
    }

    async fn text(&mut self, element: &MockElement) -> Result<String, BrowserError> {
        match element {
            MockElement::Title(i) => self
                .rows()
                .get(*i)
                .and_then(|r| r.title.clone())
                .ok_or(BrowserError::StaleElement),
            MockElement::Next => Ok("Next".into()),
            _ => Ok(String::new()),
        }
    }

    async fn attribute(
        &mut self,
        element: &MockElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        match element {
            MockElement::Action(i) if name == "href" => Ok(self.rows().get(*i).and_then(|r| r.href.clone())),
            _ => Ok(None),
        }
    }

    async fn click(&mut self, element: &MockElement) -> Result<(), BrowserError> {
        match element {
            MockElement::Next => {
                self.actions.push("click:next".into());
                if let Location::Listing(page) = self.location {
                    self.location = Location::Listing(page + 1);
                }
            }
            MockElement::LoginButton => self.actions.push("click:login".into()),
            MockElement::Control => {
                self.actions.push("click:control".into());
                let Location::Report(url) = &self.location else {
                    return Err(BrowserError::StaleElement);
                };
                let report = self
                    .portal
                    .reports
                    .get_mut(url)
                    .ok_or(BrowserError::StaleElement)?;
                if report.control != ControlState::Clickable {
                    return Err(BrowserError::Protocol {
                        error: "element not interactable".into(),
                        message: "control is disabled".into(),
                    });
                }
                if let Some(on_click) = report.on_click.as_mut() {
                    on_click();
                }
            }
            other => self.actions.push(format!("click:{:?}", other)),
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &MockElement, text: &str) -> Result<(), BrowserError> {
        self.typed.insert(format!("{:?}", element), text.to_string());
        Ok(())
    }

    async fn is_clickable(&mut self, element: &MockElement) -> Result<bool, BrowserError> {
        match element {
            MockElement::Control => Ok(self
                .report()
                .map(|r| r.control == ControlState::Clickable)
                .unwrap_or(false)),
            _ => Ok(true),
        }
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        Ok(format!("<html><body data-location=\"{:?}\"></body></html>", self.location))
    }
}
