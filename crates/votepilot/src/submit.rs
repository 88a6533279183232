//! The opaque submission driver.
//!
//! The pacing core only ever sees two operations: attempt one end-to-end
//! vote, and hand back the most recent result page. Everything about how a
//! vote physically lands — page fetch, widget discovery, the vote POST —
//! stays behind [`VoteSubmitter`] so the worker loops can be exercised
//! against a mock.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

/// Per-request ceiling. A hung submission blocks its worker for at most
/// this long; cancellation never interrupts an in-flight request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One end-to-end poll submission plus access to the result page it
/// produced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoteSubmitter: Send + Sync {
    /// Attempt one submission. `Ok(true)` means a result page was obtained
    /// and is available from [`fetch_last_result_page`].
    ///
    /// [`fetch_last_result_page`]: VoteSubmitter::fetch_last_result_page
    async fn submit_once(&self) -> Result<bool>;

    /// The most recently captured result page content.
    async fn fetch_last_result_page(&self) -> Result<String>;
}

/// Plain-HTTP submission driver.
///
/// Fetches the poll page, discovers the embedded widget's vote endpoint
/// and poll id from inline script (the same patterns the page analysis of
/// these polls has always keyed on), posts the vote, and keeps whatever
/// page comes back as the result page. Best-effort by design: any miss is
/// a failed attempt, never an error that stops the run.
pub struct HttpSubmitter {
    client: reqwest::Client,
    poll_url: String,
    target_name: String,
    last_page: Mutex<Option<String>>,
}

impl HttpSubmitter {
    pub fn new(poll_url: &str, target_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            poll_url: poll_url.to_string(),
            target_name: target_name.to_string(),
            last_page: Mutex::new(None),
        })
    }

    fn store_page(&self, page: String) {
        *self.last_page.lock().unwrap_or_else(|e| e.into_inner()) = Some(page);
    }

    /// Pull the vote endpoint, poll id, and the target's answer id out of
    /// the page markup/scripts.
    fn discover_widget(&self, page: &str) -> Option<WidgetInfo> {
        let endpoint_re = Regex::new(r#"["']([^"']*api[^"']*vote[^"']*)["']"#).ok()?;
        let poll_re = Regex::new(r#"(?i)poll[_-]?id["']?\s*[:=]\s*["']?(\d+)"#).ok()?;
        let answer_re = Regex::new(r#"(?is)<input[^>]*value="(\d+)"[^>]*>\s*<[^>]*>([^<]+)<"#).ok()?;

        let endpoint = endpoint_re.captures(page)?.get(1)?.as_str().to_string();
        let poll_id = poll_re.captures(page)?.get(1)?.as_str().to_string();

        let target = self.target_name.to_lowercase();
        let answer_id = answer_re
            .captures_iter(page)
            .find(|c| c[2].to_lowercase().contains(&target))
            .map(|c| c[1].to_string())?;

        Some(WidgetInfo {
            endpoint,
            poll_id,
            answer_id,
        })
    }
}

struct WidgetInfo {
    endpoint: String,
    poll_id: String,
    answer_id: String,
}

#[async_trait]
impl VoteSubmitter for HttpSubmitter {
    async fn submit_once(&self) -> Result<bool> {
        let page = self
            .client
            .get(&self.poll_url)
            .send()
            .await
            .context("poll page fetch failed")?
            .error_for_status()
            .context("poll page returned an error status")?
            .text()
            .await
            .context("poll page body unreadable")?;

        let Some(widget) = self.discover_widget(&page) else {
            debug!("no vote widget discovered on poll page");
            return Ok(false);
        };

        debug!(
            endpoint = %widget.endpoint,
            poll_id = %widget.poll_id,
            answer_id = %widget.answer_id,
            "Submitting vote"
        );

        let response = self
            .client
            .post(&widget.endpoint)
            .form(&[
                ("poll_id", widget.poll_id.as_str()),
                ("answer_id", widget.answer_id.as_str()),
            ])
            .send()
            .await
            .context("vote POST failed")?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Vote POST rejected");
            return Ok(false);
        }

        let result_page = response.text().await.context("result page unreadable")?;
        self.store_page(result_page);
        Ok(true)
    }

    async fn fetch_last_result_page(&self) -> Result<String> {
        self.last_page
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .context("no result page captured yet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitter() -> HttpSubmitter {
        HttpSubmitter::new("https://example.com/poll", "Cutler Whitaker").unwrap()
    }

    #[test]
    fn test_discover_widget_finds_all_parts() {
        let page = r#"
            <script>
              var cfg = { "poll_id": 14823991, endpoint: "https://poll.example/api/vote" };
            </script>
            <input type="radio" value="6301"> <span>Dylan Papushak, jr., Berea</span>
            <input type="radio" value="6302"> <span>Cutler Whitaker, sr., Mountain</span>
        "#;
        let widget = submitter().discover_widget(page).unwrap();
        assert_eq!(widget.poll_id, "14823991");
        assert_eq!(widget.endpoint, "https://poll.example/api/vote");
        assert_eq!(widget.answer_id, "6302");
    }

    #[test]
    fn test_discover_widget_missing_endpoint() {
        let page = r#"<input value="1"> <span>Cutler Whitaker</span>"#;
        assert!(submitter().discover_widget(page).is_none());
    }

    #[test]
    fn test_discover_widget_target_not_listed() {
        let page = r#"
            <script>var u = "https://poll.example/api/vote"; var poll_id = 7;</script>
            <input value="1"> <span>Dylan Papushak</span>
        "#;
        assert!(submitter().discover_widget(page).is_none());
    }

    #[tokio::test]
    async fn test_no_result_page_before_first_submission() {
        let s = submitter();
        assert!(s.fetch_last_result_page().await.is_err());
    }

    #[tokio::test]
    async fn test_stored_page_round_trips() {
        let s = submitter();
        s.store_page("<html>results</html>".into());
        assert_eq!(
            s.fetch_last_result_page().await.unwrap(),
            "<html>results</html>"
        );
    }
}
