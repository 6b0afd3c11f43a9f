//! Download completion detection
//!
//! Browsers give no "download finished" signal over WebDriver, so the
//! download directory is listed on an interval until the expected file shows
//! up with no partial downloads beside it.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::FetchError;
use crate::clock::Clock;
use crate::naming::{is_partial_download, DocumentId};

/// What one directory listing showed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Complete,
    /// Partial files present; their names
    Downloading(Vec<String>),
    /// Nothing in flight and the file is not there yet
    Waiting,
}

/// Result of a completion wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRecord {
    pub complete: bool,
    pub elapsed: Duration,
    pub polls: u32,
}

pub struct CompletionDetector<'a, C: Clock> {
    dir: &'a Path,
    clock: &'a C,
    timeout: Duration,
    interval: Duration,
}

impl<'a, C: Clock> CompletionDetector<'a, C> {
    pub fn new(dir: &'a Path, clock: &'a C, timeout: Duration, interval: Duration) -> Self {
        Self {
            dir,
            clock,
            timeout,
            interval,
        }
    }

    /// Inspect the directory once
    ///
    /// The listing and the existence check are separate reads. A final file
    /// that lands in between counts on this poll; a partial renamed in
    /// between still reads as downloading until the next one.
    pub fn poll_once(&self, expected: &str) -> Result<PollState, FetchError> {
        self.poll_with(expected, || {})
    }

    /// [`poll_once`](Self::poll_once), running `between_reads` after the
    /// listing and before the existence check
    fn poll_with(&self, expected: &str, between_reads: impl FnOnce()) -> Result<PollState, FetchError> {
        let read_err = |source: std::io::Error| FetchError::DownloadDir {
            path: self.dir.to_path_buf(),
            source,
        };

        let mut downloading = Vec::new();
        for entry in std::fs::read_dir(self.dir).map_err(read_err)? {
            let name = entry.map_err(read_err)?.file_name().to_string_lossy().into_owned();
            if is_partial_download(&name) {
                downloading.push(name);
            }
        }

        between_reads();

        if !downloading.is_empty() {
            downloading.sort();
            return Ok(PollState::Downloading(downloading));
        }
        if self.dir.join(expected).is_file() {
            return Ok(PollState::Complete);
        }
        Ok(PollState::Waiting)
    }

    /// Wait until the document's file is fully downloaded or the timeout passes
    pub async fn wait_for(&self, id: DocumentId) -> Result<CompletionRecord, FetchError> {
        let expected = id.file_name();

        if self.dir.join(&expected).is_file() {
            debug!("File {} already exists, skipping wait", expected);
            return Ok(CompletionRecord {
                complete: true,
                elapsed: Duration::ZERO,
                polls: 0,
            });
        }

        let start = self.clock.now();
        let mut polls = 0u32;

        loop {
            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= self.timeout {
                warn!(
                    "Download of {} did not complete within {} seconds",
                    expected,
                    self.timeout.as_secs()
                );
                return Ok(CompletionRecord {
                    complete: false,
                    elapsed,
                    polls,
                });
            }

            polls += 1;
            match self.poll_once(&expected)? {
                PollState::Complete => {
                    info!("Download complete: {}", expected);
                    return Ok(CompletionRecord {
                        complete: true,
                        elapsed,
                        polls,
                    });
                }
                PollState::Downloading(files) => debug!("Still downloading... {:?}", files),
                PollState::Waiting => debug!("Waiting for download of {} to start...", expected),
            }

            self.clock.sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    const TIMEOUT: Duration = Duration::from_secs(120);
    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_existing_file_short_circuits() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("101_doc.pdf"), b"%PDF").unwrap();
        let clock = FakeClock::new();

        let record = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL)
            .wait_for(DocumentId::new(101))
            .await
            .unwrap();

        assert!(record.complete);
        assert_eq!(record.polls, 0);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn test_times_out_exactly_at_bound() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("7_doc.pdf"), b"%PDF").unwrap();
        let clock = FakeClock::new();

        let record = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL)
            .wait_for(DocumentId::new(102))
            .await
            .unwrap();

        assert!(!record.complete);
        assert_eq!(record.elapsed, TIMEOUT);
        assert_eq!(record.polls, 60);
        assert_eq!(clock.elapsed(), TIMEOUT);
    }

    #[tokio::test]
    async fn test_timeout_not_a_multiple_of_interval() {
        let temp = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();

        let record = CompletionDetector::new(
            temp.path(),
            &clock,
            Duration::from_secs(5),
            Duration::from_secs(2),
        )
        .wait_for(DocumentId::new(5))
        .await
        .unwrap();

        assert!(!record.complete);
        assert_eq!(record.elapsed, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_partial_then_complete() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        let clock = FakeClock::new();

        // t=2s: browser starts writing; t=6s: rename to final name
        clock.on_sleep(move |elapsed| {
            if elapsed == Duration::from_secs(2) {
                std::fs::write(dir.join("55_doc.pdf.part"), b"%PD").unwrap();
            } else if elapsed == Duration::from_secs(6) {
                std::fs::rename(dir.join("55_doc.pdf.part"), dir.join("55_doc.pdf")).unwrap();
            }
        });

        let record = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL)
            .wait_for(DocumentId::new(55))
            .await
            .unwrap();

        assert!(record.complete);
        assert_eq!(record.elapsed, Duration::from_secs(6));
        assert_eq!(record.polls, 4);
    }

    #[tokio::test]
    async fn test_final_file_beside_unrelated_partial_keeps_waiting() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().to_path_buf();
        std::fs::write(dir.join("other.crdownload"), b"").unwrap();
        let clock = FakeClock::new();

        // Expected file lands while another download is still in flight
        clock.on_sleep(move |elapsed| {
            if elapsed == Duration::from_secs(2) {
                std::fs::write(dir.join("9_doc.pdf"), b"%PDF").unwrap();
            } else if elapsed == Duration::from_secs(8) {
                std::fs::remove_file(dir.join("other.crdownload")).unwrap();
            }
        });

        let record = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL)
            .wait_for(DocumentId::new(9))
            .await
            .unwrap();

        assert!(record.complete);
        assert_eq!(record.elapsed, Duration::from_secs(8));
    }

    #[test]
    fn test_poll_once_states() {
        let temp = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let detector = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL);

        assert_eq!(detector.poll_once("3_doc.pdf").unwrap(), PollState::Waiting);

        std::fs::write(temp.path().join("3_doc.pdf.part"), b"").unwrap();
        assert_eq!(
            detector.poll_once("3_doc.pdf").unwrap(),
            PollState::Downloading(vec!["3_doc.pdf.part".into()])
        );

        std::fs::remove_file(temp.path().join("3_doc.pdf.part")).unwrap();
        std::fs::write(temp.path().join("1_doc.pdf"), b"%PDF").unwrap();
        std::fs::write(temp.path().join("3_doc.pdf"), b"%PDF").unwrap();
        assert_eq!(detector.poll_once("3_doc.pdf").unwrap(), PollState::Complete);
    }

    #[test]
    fn test_file_lands_between_listing_and_existence_check() {
        let temp = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let detector = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL);
        let target = temp.path().join("12_doc.pdf");

        // Listing saw an empty directory; the separate existence read sees the file
        let state = detector
            .poll_with("12_doc.pdf", || std::fs::write(&target, b"%PDF").unwrap())
            .unwrap();
        assert_eq!(state, PollState::Complete);
    }

    #[test]
    fn test_partial_renamed_between_listing_and_existence_check() {
        let temp = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let detector = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL);
        let partial = temp.path().join("12_doc.pdf.part");
        std::fs::write(&partial, b"%PD").unwrap();

        // Listing still shows the partial, so this poll reports downloading
        let state = detector
            .poll_with("12_doc.pdf", || {
                std::fs::rename(&partial, temp.path().join("12_doc.pdf")).unwrap()
            })
            .unwrap();
        assert_eq!(state, PollState::Downloading(vec!["12_doc.pdf.part".into()]));

        assert_eq!(detector.poll_once("12_doc.pdf").unwrap(), PollState::Complete);
    }

    #[test]
    fn test_partial_appears_between_listing_and_existence_check() {
        let temp = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let detector = CompletionDetector::new(temp.path(), &clock, TIMEOUT, INTERVAL);
        let partial = temp.path().join("12_doc.pdf.part");

        // Download starts after the listing: nothing final yet, so keep waiting
        let state = detector
            .poll_with("12_doc.pdf", || std::fs::write(&partial, b"").unwrap())
            .unwrap();
        assert_eq!(state, PollState::Waiting);

        assert_eq!(
            detector.poll_once("12_doc.pdf").unwrap(),
            PollState::Downloading(vec!["12_doc.pdf.part".into()])
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let missing = temp.path().join("gone");
        let clock = FakeClock::new();

        let err = CompletionDetector::new(&missing, &clock, TIMEOUT, INTERVAL)
            .wait_for(DocumentId::new(1))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
    }
}
