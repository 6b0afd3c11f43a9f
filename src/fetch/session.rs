//! Authenticated browser session driving the whole download pass

use indicatif::ProgressBar;
use tracing::{debug, info};

use super::{DownloadTask, FailureLog, FetchError, Outcome, RunSummary};
use crate::browser::Browser;
use crate::clock::Clock;
use crate::config::{FetchSettings, PortalProfile};
use crate::credentials::Credentials;
use crate::naming::DocumentId;

/// One browser session plus everything a fetch pass needs
pub struct Session<B: Browser, C: Clock> {
    pub(crate) browser: B,
    pub(crate) clock: C,
    pub(crate) portal: PortalProfile,
    pub(crate) settings: FetchSettings,
    pub(crate) failures: FailureLog,
}

impl<B: Browser, C: Clock> Session<B, C> {
    pub fn new(
        browser: B,
        clock: C,
        portal: PortalProfile,
        settings: FetchSettings,
        failures: FailureLog,
    ) -> Self {
        Self {
            browser,
            clock,
            portal,
            settings,
            failures,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn failure_log(&self) -> &FailureLog {
        &self.failures
    }

    /// Hand back the browser, e.g. to close its session
    pub fn into_browser(self) -> B {
        self.browser
    }

    /// Submit the login form and give the portal time to settle
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), FetchError> {
        let selectors = &self.portal.selectors;
        self.browser.navigate(&self.portal.login_url).await?;

        let mut fields = Vec::with_capacity(3);
        for by in [
            &selectors.username_field,
            &selectors.password_field,
            &selectors.login_button,
        ] {
            let element = self
                .browser
                .find(by)
                .await?
                .ok_or_else(|| FetchError::LoginFailed(format!("{} not found on login page", by)))?;
            fields.push(element);
        }

        self.browser.send_keys(&fields[0], &credentials.username).await?;
        self.browser.send_keys(&fields[1], &credentials.password).await?;
        self.browser.click(&fields[2]).await?;

        self.clock.sleep(self.portal.timing.login_settle()).await;
        info!("Logged in as {}", credentials.username);
        Ok(())
    }

    /// Fetch one document: locate it, download it, verify it landed
    ///
    /// Per-identifier failures end up in the task's outcome; only fatal
    /// errors are returned.
    pub async fn process(&mut self, id: DocumentId) -> Result<DownloadTask, FetchError> {
        let mut task = DownloadTask::new(id);

        let result = match self.locate(id).await {
            Ok(url) => {
                task.report_url = Some(url.clone());
                self.trigger(id, &url).await.map(|_| ())
            }
            Err(e @ FetchError::ControlInteraction(_)) => {
                self.record_control_failure(id, &e).await?;
                Err(e)
            }
            Err(e) => Err(e),
        };

        task.outcome = match result {
            Ok(()) => Outcome::Succeeded,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Document {} failed: {}", id, e);
                Outcome::from_error(&e)
            }
        };
        Ok(task)
    }

    /// Process every identifier in order
    ///
    /// A failure on one identifier never stops the rest; a fatal error
    /// (unwritable failure log, vanished download directory) does.
    pub async fn run(
        &mut self,
        ids: &[DocumentId],
        progress: &ProgressBar,
    ) -> Result<RunSummary, FetchError> {
        let mut summary = RunSummary::default();

        for &id in ids {
            progress.set_message(format!("document {}", id));
            let task = self.process(id).await?;

            progress.println(format!("{}: {}", id, task.outcome));
            summary.record(task);
            progress.inc(1);
        }

        Ok(summary)
    }
}
