//! Report view download: click the control, then wait for the file

use tracing::{info, warn};

use super::{CompletionDetector, CompletionRecord, FetchError, Session};
use crate::browser::{wait_for, Browser, WaitCondition};
use crate::clock::Clock;
use crate::naming::DocumentId;

impl<B: Browser, C: Clock> Session<B, C> {
    /// Open the report view, start the download and wait for it to land
    ///
    /// Control failures dump the page markup and are written to the failure
    /// log; so are downloads that never complete. Both come back as errors
    /// for the caller to record against the identifier.
    pub(crate) async fn trigger(
        &mut self,
        id: DocumentId,
        report_url: &str,
    ) -> Result<CompletionRecord, FetchError> {
        if let Err(e) = self.press_download_control(report_url).await {
            let e = match e {
                FetchError::ControlInteraction(_) => e,
                other => FetchError::ControlInteraction(other.to_string()),
            };
            self.record_control_failure(id, &e).await?;
            return Err(e);
        }
        info!("Requested download of document {}", id);

        let timing = &self.portal.timing;
        let record = CompletionDetector::new(
            &self.settings.download_dir,
            &self.clock,
            timing.download_timeout(),
            timing.download_poll(),
        )
        .wait_for(id)
        .await?;

        if !record.complete {
            self.failures.record(id)?;
            return Err(FetchError::DownloadTimeout {
                id,
                waited: record.elapsed,
            });
        }
        Ok(record)
    }

    async fn press_download_control(&mut self, report_url: &str) -> Result<(), FetchError> {
        let by = &self.portal.selectors.download_control;
        let timing = &self.portal.timing;

        self.browser.navigate(report_url).await?;

        let control = wait_for(
            &mut self.browser,
            &self.clock,
            by,
            WaitCondition::Clickable,
            timing.control_wait(),
            timing.element_poll(),
        )
        .await?
        .ok_or_else(|| {
            FetchError::ControlInteraction(format!(
                "{} not clickable within {} seconds",
                by,
                timing.control_wait().as_secs()
            ))
        })?;

        self.browser.click(&control).await?;
        Ok(())
    }

    /// Save the current markup for debugging and log the failure
    pub(crate) async fn record_control_failure(
        &mut self,
        id: DocumentId,
        error: &FetchError,
    ) -> Result<(), FetchError> {
        warn!("Document {}: {}", id, error);
        self.dump_page().await;
        self.failures.record(id)
    }

    async fn dump_page(&mut self) {
        let path = &self.settings.debug_dump;
        match self.browser.page_source().await {
            Ok(source) => match std::fs::write(path, source) {
                Ok(()) => info!("Page source written to '{}'", path.display()),
                Err(e) => warn!("Could not write page source to {}: {}", path.display(), e),
            },
            Err(e) => warn!("Could not read page source: {}", e),
        }
    }
}
