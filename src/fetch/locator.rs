//! Paginated search of the document listing

use tracing::{debug, info, warn};

use super::{FetchError, Session};
use crate::browser::{wait_for, Browser, WaitCondition};
use crate::clock::Clock;
use crate::naming::DocumentId;

impl<B: Browser, C: Clock> Session<B, C> {
    /// Walk the listing until a row titled with `id` turns up
    ///
    /// Returns the row's report URL. There is no page limit: the search ends
    /// on a match or when the "next page" control disappears.
    pub(crate) async fn locate(&mut self, id: DocumentId) -> Result<String, FetchError> {
        let selectors = &self.portal.selectors;
        let timing = &self.portal.timing;

        self.browser.navigate(&self.portal.listing_url).await?;
        let mut page = 1usize;

        loop {
            let table = wait_for(
                &mut self.browser,
                &self.clock,
                &selectors.document_row,
                WaitCondition::Present,
                timing.row_wait(),
                timing.element_poll(),
            )
            .await?;
            if table.is_none() {
                return Err(FetchError::UiLoadTimeout {
                    page,
                    waited: timing.row_wait(),
                });
            }

            let rows = self.browser.find_all(&selectors.document_row).await?;
            debug!("Page {}: {} rows", page, rows.len());

            for row in &rows {
                let Some(title_el) = self.browser.find_in(row, &selectors.row_title).await? else {
                    warn!("Row without a title on page {}, skipping", page);
                    continue;
                };
                let title = self.browser.text(&title_el).await?;
                if !id.matches_title(&title) {
                    continue;
                }

                info!("Found document with number: {} (page {})", id, page);
                let link = self
                    .browser
                    .find_in(row, &selectors.row_action)
                    .await?
                    .ok_or_else(|| {
                        FetchError::ControlInteraction(format!(
                            "row for document {} has no {} link",
                            id, selectors.row_action
                        ))
                    })?;
                let url = self
                    .browser
                    .attribute(&link, "href")
                    .await?
                    .filter(|href| !href.trim().is_empty())
                    .ok_or_else(|| {
                        FetchError::ControlInteraction(format!(
                            "report link for document {} has no href",
                            id
                        ))
                    })?;
                return Ok(url);
            }

            match self.browser.find(&selectors.next_page).await? {
                Some(next) => {
                    debug!("Clicking the Next button to go to page {}", page + 1);
                    self.browser.click(&next).await?;
                    self.clock.sleep(timing.page_settle()).await;
                    page += 1;
                }
                None => {
                    info!("Document with number {} not found after checking all pages", id);
                    return Err(FetchError::NotFound { id, pages: page });
                }
            }
        }
    }
}
