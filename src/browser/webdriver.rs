//! W3C WebDriver client
//!
//! Talks JSON over HTTP to an operator-provided WebDriver server
//! (geckodriver by default). Only the handful of endpoints the fetch
//! workflow needs are implemented.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{Browser, BrowserError, By};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:4444";

/// Key the W3C protocol uses for element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Connection timeout: time to reach the WebDriver server
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-command timeout. Navigation blocks until the page load event, so
/// keep this generous.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Opaque element reference returned by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebElement(String);

/// WebDriver session bound to one browser window
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
}

/// Firefox capabilities that save PDFs straight into `download_dir`
pub fn firefox_capabilities(download_dir: &Path, binary: Option<&Path>, headless: bool) -> Value {
    let mut options = json!({
        "prefs": {
            // 2 = use the custom download directory
            "browser.download.folderList": 2,
            "browser.download.dir": download_dir.to_string_lossy(),
            "browser.download.useDownloadDir": true,
            "browser.helperApps.neverAsk.saveToDisk": "application/pdf",
            "pdfjs.disabled": true,
            "browser.download.manager.showWhenStarting": false,
            "browser.download.manager.alertOnEXEOpen": false,
            "browser.download.manager.closeWhenDone": true,
            "browser.download.manager.showAlertOnComplete": false,
            "browser.download.manager.focusWhenStarting": false,
        }
    });

    if let Some(binary) = binary {
        options["binary"] = json!(binary.to_string_lossy());
    }
    if headless {
        options["args"] = json!(["-headless"]);
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "firefox",
                "moz:firefoxOptions": options,
            }
        }
    })
}

impl WebDriverClient {
    /// Open a new browser session
    pub async fn connect(base_url: &str, capabilities: Value) -> Result<Self, BrowserError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("docharvest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(COMMAND_TIMEOUT)
            .build()?;

        let mut client = Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: None,
        };

        let value = client
            .send(Method::POST, "session".to_string(), Some(capabilities))
            .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::UnexpectedResponse(format!("no sessionId in {}", value)))?
            .to_string();

        debug!("Opened WebDriver session {}", session_id);
        client.session_id = Some(session_id);
        Ok(client)
    }

    /// Close the browser window and end the session
    pub async fn quit(&mut self) -> Result<(), BrowserError> {
        if let Some(id) = self.session_id.take() {
            self.send(Method::DELETE, format!("session/{}", id), None).await?;
            debug!("Closed WebDriver session {}", id);
        }
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let session = self.session_id.as_deref().ok_or(BrowserError::NoSession)?;
        let path = if path.is_empty() {
            format!("session/{}", session)
        } else {
            format!("session/{}/{}", session, path)
        };
        self.send(method, path, body).await
    }

    async fn send(
        &self,
        method: Method,
        path: String,
        body: Option<Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}/{}", self.base_url, path);
        let is_post = method == Method::POST;

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        } else if is_post {
            request = request.json(&json!({}));
        }

        let response = request.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        parse_response(status.is_success(), body)
    }

    async fn find_from(&self, path: &str, by: &By) -> Result<Option<WebElement>, BrowserError> {
        let (using, value) = by.strategy();
        match self
            .command(Method::POST, path, Some(json!({ "using": using, "value": value })))
            .await
        {
            Ok(value) => element_ref(&value).map(Some),
            Err(BrowserError::Protocol { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for WebDriverClient {
    fn drop(&mut self) {
        if let Some(id) = &self.session_id {
            warn!("WebDriver session {} was not closed; the browser window stays open", id);
        }
    }
}

/// Unwrap the `value` member of a WebDriver response, mapping error payloads
fn parse_response(success: bool, mut body: Value) -> Result<Value, BrowserError> {
    let value = body
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| BrowserError::UnexpectedResponse(body.to_string()))?;

    if success {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if error == "stale element reference" {
        return Err(BrowserError::StaleElement);
    }
    Err(BrowserError::Protocol { error, message })
}

fn element_ref(value: &Value) -> Result<WebElement, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| WebElement(id.to_string()))
        .ok_or_else(|| BrowserError::UnexpectedResponse(format!("not an element: {}", value)))
}

fn as_bool(value: Value) -> Result<bool, BrowserError> {
    value
        .as_bool()
        .ok_or_else(|| BrowserError::UnexpectedResponse(format!("expected bool, got {}", value)))
}

fn as_string(value: Value) -> Result<String, BrowserError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(BrowserError::UnexpectedResponse(format!("expected string, got {}", other))),
    }
}

impl Browser for WebDriverClient {
    type Element = WebElement;

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn find(&mut self, by: &By) -> Result<Option<WebElement>, BrowserError> {
        self.find_from("element", by).await
    }

    async fn find_all(&mut self, by: &By) -> Result<Vec<WebElement>, BrowserError> {
        let (using, value) = by.strategy();
        let value = self
            .command(Method::POST, "elements", Some(json!({ "using": using, "value": value })))
            .await?;
        match value {
            Value::Array(items) => items.iter().map(element_ref).collect(),
            other => Err(BrowserError::UnexpectedResponse(format!("expected array, got {}", other))),
        }
    }

    async fn find_in(
        &mut self,
        parent: &WebElement,
        by: &By,
    ) -> Result<Option<WebElement>, BrowserError> {
        self.find_from(&format!("element/{}/element", parent.0), by).await
    }

    async fn text(&mut self, element: &WebElement) -> Result<String, BrowserError> {
        let value = self
            .command(Method::GET, &format!("element/{}/text", element.0), None)
            .await?;
        as_string(value)
    }

    async fn attribute(
        &mut self,
        element: &WebElement,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        // Properties give resolved values (absolute hrefs); fall back to the raw attribute
        for kind in ["property", "attribute"] {
            let value = self
                .command(Method::GET, &format!("element/{}/{}/{}", element.0, kind, name), None)
                .await?;
            if let Value::String(s) = value {
                return Ok(Some(s));
            }
        }
        Ok(None)
    }

    async fn click(&mut self, element: &WebElement) -> Result<(), BrowserError> {
        self.command(Method::POST, &format!("element/{}/click", element.0), None)
            .await?;
        Ok(())
    }

    async fn send_keys(&mut self, element: &WebElement, text: &str) -> Result<(), BrowserError> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.0),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn is_clickable(&mut self, element: &WebElement) -> Result<bool, BrowserError> {
        let displayed = as_bool(
            self.command(Method::GET, &format!("element/{}/displayed", element.0), None)
                .await?,
        )?;
        if !displayed {
            return Ok(false);
        }
        as_bool(
            self.command(Method::GET, &format!("element/{}/enabled", element.0), None)
                .await?,
        )
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        as_string(self.command(Method::GET, "source", None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_value() {
        let mut body = json!({ "value": {} });
        body["value"][ELEMENT_KEY] = json!("abc-123");
        let value = parse_response(true, body).unwrap();
        assert_eq!(element_ref(&value).unwrap(), WebElement("abc-123".into()));
    }

    #[test]
    fn test_parse_protocol_error() {
        let body = json!({
            "value": { "error": "no such element", "message": "Unable to locate", "stacktrace": "" }
        });
        match parse_response(false, body) {
            Err(BrowserError::Protocol { error, message }) => {
                assert_eq!(error, "no such element");
                assert_eq!(message, "Unable to locate");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_parse_stale_element() {
        let body = json!({ "value": { "error": "stale element reference", "message": "" } });
        assert!(matches!(parse_response(false, body), Err(BrowserError::StaleElement)));
    }

    #[test]
    fn test_parse_missing_value() {
        assert!(matches!(
            parse_response(true, json!({ "status": 0 })),
            Err(BrowserError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_firefox_capabilities() {
        let caps = firefox_capabilities(Path::new("/data/pdfs"), None, true);
        let options = &caps["capabilities"]["alwaysMatch"]["moz:firefoxOptions"];
        assert_eq!(options["prefs"]["browser.download.dir"], "/data/pdfs");
        assert_eq!(options["prefs"]["browser.download.folderList"], 2);
        assert_eq!(options["prefs"]["pdfjs.disabled"], true);
        assert_eq!(options["args"][0], "-headless");
        assert!(options.get("binary").is_none());
    }
}
