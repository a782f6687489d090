//! Sweep pacing knobs and the command-line surface shared by binaries.

use crate::chart::DEFAULT_CHART_LABEL;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default target page.
pub const DEFAULT_TARGET_URL: &str = "https://www.svt.se/datajournalistik/bygg-en-valjare/";
/// Default settling delay after each activation, in milliseconds.
pub const DEFAULT_SETTLE_MS: u64 = 300;
/// Default bound on waiting for the chart container at a leaf, in seconds.
pub const DEFAULT_CHART_TIMEOUT_SECS: u64 = 10;
/// Default pause after the initial page navigation, in seconds.
pub const DEFAULT_PAGE_LOAD_SECS: u64 = 5;
/// Default number of activation retries before a failure is ignored.
pub const DEFAULT_APPLY_RETRIES: usize = 2;
/// Default header name of the entity column.
pub const DEFAULT_ENTITY_COLUMN: &str = "Party";
/// Default header name of the value column.
pub const DEFAULT_VALUE_COLUMN: &str = "Value";

/// Tunable knobs that bound sweep behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepControls {
    settle_delay: Duration,
    chart_timeout: Duration,
    page_load_wait: Duration,
    apply_retries: usize,
    max_leaves: Option<usize>,
}

impl SweepControls {
    /// Constructs a new set of sweep controls.
    pub fn new(
        settle_delay: Duration,
        chart_timeout: Duration,
        page_load_wait: Duration,
        apply_retries: usize,
        max_leaves: Option<usize>,
    ) -> Self {
        Self {
            settle_delay,
            chart_timeout,
            page_load_wait,
            apply_retries,
            max_leaves,
        }
    }

    /// Time to wait after each activation before the next action.
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Upper bound on waiting for the chart container at each leaf.
    pub fn chart_timeout(&self) -> Duration {
        self.chart_timeout
    }

    /// Pause after the initial navigation, letting the page finish its
    /// first render.
    pub fn page_load_wait(&self) -> Duration {
        self.page_load_wait
    }

    /// Activation retries taken before a failure is logged and ignored.
    pub fn apply_retries(&self) -> usize {
        self.apply_retries
    }

    /// Optional bound on the number of completed combinations.
    pub fn max_leaves(&self) -> Option<usize> {
        self.max_leaves
    }
}

impl Default for SweepControls {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            chart_timeout: Duration::from_secs(DEFAULT_CHART_TIMEOUT_SECS),
            page_load_wait: Duration::from_secs(DEFAULT_PAGE_LOAD_SECS),
            apply_retries: DEFAULT_APPLY_RETRIES,
            max_leaves: None,
        }
    }
}

/// Command-line interface for the sweep binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "facetsweep",
    about = "Enumerate survey filter combinations and export chart readings"
)]
pub struct Cli {
    /// Page to sweep
    #[arg(long, env = "FACETSWEEP_URL", default_value = DEFAULT_TARGET_URL)]
    pub url: String,

    /// Output file for the delimited rows
    #[arg(long, env = "FACETSWEEP_OUTPUT", default_value = "data/sweep.csv")]
    pub output: PathBuf,

    /// Maximum number of combinations to process (unlimited when omitted)
    #[arg(long, env = "FACETSWEEP_MAX_COMBINATIONS")]
    pub max_combinations: Option<usize>,

    /// Milliseconds to let the chart settle after each activation
    #[arg(long, env = "FACETSWEEP_SETTLE_MS", default_value_t = DEFAULT_SETTLE_MS)]
    pub settle_ms: u64,

    /// Seconds to wait for the chart container at each combination
    #[arg(long, env = "FACETSWEEP_CHART_TIMEOUT", default_value_t = DEFAULT_CHART_TIMEOUT_SECS)]
    pub chart_timeout_secs: u64,

    /// Seconds to let the page finish its initial render
    #[arg(long, env = "FACETSWEEP_PAGE_LOAD", default_value_t = DEFAULT_PAGE_LOAD_SECS)]
    pub page_load_secs: u64,

    /// Activation retries before a click failure is ignored
    #[arg(long, env = "FACETSWEEP_APPLY_RETRIES", default_value_t = DEFAULT_APPLY_RETRIES)]
    pub apply_retries: usize,

    /// Header name for the entity column
    #[arg(long, env = "FACETSWEEP_ENTITY_COLUMN", default_value = DEFAULT_ENTITY_COLUMN)]
    pub entity_column: String,

    /// Header name for the value column
    #[arg(long, env = "FACETSWEEP_VALUE_COLUMN", default_value = DEFAULT_VALUE_COLUMN)]
    pub value_column: String,

    /// aria-label of the button wrapping the chart SVG
    #[arg(long, env = "FACETSWEEP_CHART_LABEL", default_value = DEFAULT_CHART_LABEL)]
    pub chart_label: String,

    /// Print the discovered filter space as JSON and exit without sweeping
    #[arg(long, default_value_t = false)]
    pub discover_only: bool,
}

impl Cli {
    /// Folds the parsed CLI into `SweepControls`.
    pub fn build_controls(&self) -> SweepControls {
        SweepControls::new(
            Duration::from_millis(self.settle_ms),
            Duration::from_secs(self.chart_timeout_secs),
            Duration::from_secs(self.page_load_secs),
            self.apply_retries,
            self.max_combinations,
        )
    }

    /// Parses and validates the target URL.
    pub fn target_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.url)
    }
}
