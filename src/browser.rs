//! Chromium session driving the survey page over CDP.

use crate::chart::{collapse_whitespace, ChartPattern, Observation};
use crate::controls::SweepControls;
use crate::space::{ActivationHandle, FilterDimension, FilterOption};
use crate::traverse::{DriverError, PageDriver};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::time::Duration;
use tokio::task::{spawn_local, JoinHandle};
use tokio::time::{sleep, Instant};
use url::Url;

/// Chrome flags used for unattended headless runs.
const CHROME_ARGS: [&str; 3] = ["--no-sandbox", "--disable-dev-shm-usage", "--disable-gpu"];
/// How often the chart wait re-samples the page.
const CHART_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// CSS selector of one filter section; its document position is the
/// section half of an [`ActivationHandle`].
const SECTION_SELECTOR: &str = "section.parameter.group";
/// Selector of the dimension name within a section.
const QUESTION_SELECTOR: &str = "div.question";
/// Selector of the option buttons within a section.
const BUTTON_SELECTOR: &str = "div.buttons button";
/// Selector of the visible label within an option button.
const OPTION_LABEL_SELECTOR: &str = "div.option";

/// Errors surfaced while launching or driving the browser session.
#[derive(Debug)]
pub enum SessionError {
    /// Building the browser configuration failed.
    Config(String),
    /// Launching Chromium or speaking CDP failed.
    Cdp(CdpError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(message) => write!(f, "browser configuration error: {message}"),
            Self::Cdp(err) => write!(f, "browser protocol error: {err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(_) => None,
            Self::Cdp(err) => Some(err),
        }
    }
}

/// A live headless-Chromium page scoped to one sweep run.
///
/// The session is the only writer and reader of the page's filter state;
/// the runtime releases it on every exit path, and dropping the browser
/// kills the child process as a last resort.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    pattern: ChartPattern,
}

impl BrowserSession {
    /// Launches headless Chromium, opens the target page, and waits out the
    /// configured initial render delay.
    ///
    /// Must run inside a `LocalSet`: the CDP event pump is spawned locally.
    pub async fn launch(
        url: &Url,
        chart_label: &str,
        controls: &SweepControls,
    ) -> Result<Self, SessionError> {
        let config = BrowserConfig::builder()
            .args(CHROME_ARGS)
            .build()
            .map_err(SessionError::Config)?;
        let (browser, mut handler) = Browser::launch(config).await.map_err(SessionError::Cdp)?;

        // The event stream must be drained for the session to make progress.
        let handler = spawn_local(async move { while handler.next().await.is_some() {} });

        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(SessionError::Cdp)?;
        sleep(controls.page_load_wait()).await;

        Ok(Self {
            browser,
            page,
            handler,
            pattern: ChartPattern::for_chart_label(chart_label),
        })
    }

    /// Reads the filter sections from the live page.
    ///
    /// Option order mirrors document order, which is also the traversal
    /// order.
    pub async fn discover(&self) -> Result<Vec<FilterDimension>, SessionError> {
        let html = self.content().await?;
        Ok(parse_filter_sections(&html))
    }

    /// Shuts the session down. Close failures are logged, not propagated:
    /// the child process dies with the handle either way.
    pub async fn close(mut self) {
        if let Err(err) = self.browser.close().await {
            eprintln!("browser close failed: {err}");
        }
        self.handler.abort();
    }

    async fn content(&self) -> Result<String, SessionError> {
        self.page.content().await.map_err(SessionError::Cdp)
    }
}

impl PageDriver for BrowserSession {
    async fn apply(&self, dimension: &str, option: &FilterOption) -> Result<(), DriverError> {
        let clicked = self
            .page
            .evaluate(click_expression(option.handle()))
            .await
            .map_err(|err| DriverError::new(format!("click evaluation failed: {err}")))?
            .into_value::<bool>()
            .map_err(|err| DriverError::new(format!("click result unreadable: {err}")))?;
        if clicked {
            Ok(())
        } else {
            Err(DriverError::new(format!(
                "no button at section {} index {} for dimension {dimension}",
                option.handle().section(),
                option.handle().button(),
            )))
        }
    }

    async fn await_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(html) = self.page.content().await {
                if self.pattern.container_present(&html) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(CHART_POLL_INTERVAL).await;
        }
    }

    async fn observe(&self) -> Observation {
        match self.page.content().await {
            Ok(html) => self.pattern.extract(&html),
            Err(_) => Observation::new(),
        }
    }
}

/// Parses the filter sections out of a page snapshot.
pub(crate) fn parse_filter_sections(html: &str) -> Vec<FilterDimension> {
    let section = Selector::parse(SECTION_SELECTOR).expect("section selector");
    let question = Selector::parse(QUESTION_SELECTOR).expect("question selector");
    let button = Selector::parse(BUTTON_SELECTOR).expect("button selector");
    let option_label = Selector::parse(OPTION_LABEL_SELECTOR).expect("option label selector");

    let document = Html::parse_document(html);
    let mut dimensions = Vec::new();
    for (section_idx, section_el) in document.select(&section).enumerate() {
        let name = section_el
            .select(&question)
            .next()
            .map(element_text)
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        let mut options = Vec::new();
        for (button_idx, button_el) in section_el.select(&button).enumerate() {
            // Fall back to the button's own text when the label wrapper is
            // absent.
            let label = button_el
                .select(&option_label)
                .next()
                .map(element_text)
                .filter(|label| !label.is_empty())
                .unwrap_or_else(|| element_text(button_el));
            options.push(FilterOption::new(
                label,
                ActivationHandle::new(section_idx, button_idx),
            ));
        }
        dimensions.push(FilterDimension::new(name, options));
    }
    dimensions
}

/// Builds the guarded JS click for an activation handle. Missing nodes
/// report failure instead of throwing past the evaluation boundary.
fn click_expression(handle: ActivationHandle) -> String {
    format!(
        "(() => {{ \
           const section = document.querySelectorAll('{SECTION_SELECTOR}')[{section}]; \
           if (!section) return false; \
           const button = section.querySelectorAll('{BUTTON_SELECTOR}')[{button}]; \
           if (!button) return false; \
           button.click(); \
           return true; \
         }})()",
        section = handle.section(),
        button = handle.button(),
    )
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}
