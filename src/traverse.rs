//! Depth-first enumeration of the filter space against an injected page
//! driver.

use crate::chart::Observation;
use crate::controls::SweepControls;
use crate::debug_log;
use crate::sink::SinkError;
use crate::space::{FilterOption, FilterSpace, Selection};
use futures_util::future::LocalBoxFuture;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

/// Error reported by a driver when an activation could not be delivered.
#[derive(Debug)]
pub struct DriverError {
    message: String,
}

impl DriverError {
    /// Creates a driver error from a human-readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DriverError {}

/// Capability set the traversal needs from the page: mutate the current
/// filter state, wait for the chart, read it back.
///
/// Injecting this keeps the engine free of any rendering technology; tests
/// drive it with a scripted fake.
#[allow(async_fn_in_trait)]
pub trait PageDriver {
    /// Activates one option of one dimension. Best effort: the engine
    /// retries a bounded number of times, then ignores the failure.
    async fn apply(&self, dimension: &str, option: &FilterOption) -> Result<(), DriverError>;

    /// Waits until the chart container is present, up to `timeout`.
    /// Returns `false` when it never appeared; never an error.
    async fn await_ready(&self, timeout: Duration) -> bool;

    /// Reads the current observation. Extraction failure is an empty
    /// observation, not an error.
    async fn observe(&self) -> Observation;
}

/// Counters accumulated over one sweep; a pure fold over emitted leaves,
/// never a second source of truth for the output file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// Completed combinations.
    pub leaves_visited: usize,
    /// Rows handed to the sink.
    pub rows_emitted: usize,
    /// Combinations whose observation came back empty.
    pub empty_leaves: usize,
    /// Activations given up on after the retry budget.
    pub apply_failures: usize,
    /// True when the sweep stopped at the combination budget.
    pub budget_exhausted: bool,
}

/// Depth-first traversal driving the page one option at a time.
///
/// Visits leaves in lexicographic order over (dimension order, per-dimension
/// option order): the outermost dimension varies slowest. The page state is
/// never explicitly reverted on backtrack; the next activation at a level
/// overwrites it.
pub struct Traversal<'a, D> {
    space: &'a FilterSpace,
    driver: &'a D,
    settle_delay: Duration,
    chart_timeout: Duration,
    apply_retries: usize,
    budget: Option<usize>,
}

impl<'a, D: PageDriver> Traversal<'a, D> {
    /// Prepares a traversal of `space` against `driver`, paced and bounded
    /// by `controls`.
    pub fn new(space: &'a FilterSpace, driver: &'a D, controls: &SweepControls) -> Self {
        Self {
            space,
            driver,
            settle_delay: controls.settle_delay(),
            chart_timeout: controls.chart_timeout(),
            apply_retries: controls.apply_retries(),
            budget: controls.max_leaves(),
        }
    }

    /// Runs the sweep, invoking `emit` once per completed combination with
    /// the selection and its observation. Emission failures abort
    /// immediately; activation failures do not.
    pub async fn run<F>(&self, mut emit: F) -> Result<SweepSummary, SinkError>
    where
        F: FnMut(&Selection, &Observation) -> Result<(), SinkError>,
    {
        let mut summary = SweepSummary::default();
        let mut selection = Selection::new();
        self.descend(0, &mut selection, &mut summary, &mut emit)
            .await?;
        summary.budget_exhausted = self
            .budget
            .is_some_and(|budget| summary.leaves_visited >= budget);
        Ok(summary)
    }

    fn budget_reached(&self, summary: &SweepSummary) -> bool {
        self.budget
            .is_some_and(|budget| summary.leaves_visited >= budget)
    }

    fn descend<'s, F>(
        &'s self,
        index: usize,
        selection: &'s mut Selection,
        summary: &'s mut SweepSummary,
        emit: &'s mut F,
    ) -> LocalBoxFuture<'s, Result<(), SinkError>>
    where
        F: FnMut(&Selection, &Observation) -> Result<(), SinkError> + 's,
    {
        Box::pin(async move {
            if self.budget_reached(summary) {
                return Ok(());
            }

            if index == self.space.dimension_count() {
                return self.visit_leaf(selection, summary, emit).await;
            }

            let dimension = &self.space.dimensions()[index];
            for option in dimension.options() {
                if self.budget_reached(summary) {
                    return Ok(());
                }
                self.activate(dimension.name(), option, summary).await;
                selection.push(dimension.name(), option.label());
                self.descend(index + 1, selection, summary, emit).await?;
                selection.pop();
            }
            Ok(())
        })
    }

    async fn visit_leaf<F>(
        &self,
        selection: &Selection,
        summary: &mut SweepSummary,
        emit: &mut F,
    ) -> Result<(), SinkError>
    where
        F: FnMut(&Selection, &Observation) -> Result<(), SinkError>,
    {
        summary.leaves_visited += 1;
        if !self.driver.await_ready(self.chart_timeout).await {
            debug_log!("chart not ready at combination {}", summary.leaves_visited);
        }
        let observation = self.driver.observe().await;
        if observation.is_empty() {
            summary.empty_leaves += 1;
        }
        summary.rows_emitted += observation.len();
        emit(selection, &observation)
    }

    /// Delivers one activation with the retried-then-ignored policy.
    /// Failures past the retry budget are logged and skipped; the caller
    /// records the intended label regardless. The settling delay is taken
    /// either way, since the page may have reacted to a partial event.
    async fn activate(&self, dimension: &str, option: &FilterOption, summary: &mut SweepSummary) {
        let mut attempt = 0usize;
        loop {
            match self.driver.apply(dimension, option).await {
                Ok(()) => break,
                Err(err) => {
                    attempt += 1;
                    if attempt > self.apply_retries {
                        eprintln!(
                            "activation failed for {dimension}={}: {err}",
                            option.label()
                        );
                        summary.apply_failures += 1;
                        break;
                    }
                    debug_log!(
                        "activation retry {attempt} for {dimension}={}",
                        option.label()
                    );
                }
            }
        }
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{ActivationHandle, FilterDimension};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::io;

    struct FakeDriver {
        clicks: RefCell<Vec<String>>,
        failing_labels: Vec<&'static str>,
        observation: Observation,
    }

    impl FakeDriver {
        fn new(observation: Observation) -> Self {
            Self {
                clicks: RefCell::new(Vec::new()),
                failing_labels: Vec::new(),
                observation,
            }
        }

        fn with_failing_labels(mut self, labels: Vec<&'static str>) -> Self {
            self.failing_labels = labels;
            self
        }

        fn clicks(&self) -> Vec<String> {
            self.clicks.borrow().clone()
        }
    }

    impl PageDriver for FakeDriver {
        async fn apply(&self, dimension: &str, option: &FilterOption) -> Result<(), DriverError> {
            self.clicks
                .borrow_mut()
                .push(format!("{dimension}={}", option.label()));
            if self.failing_labels.iter().any(|label| *label == option.label()) {
                return Err(DriverError::new("button went away"));
            }
            Ok(())
        }

        async fn await_ready(&self, _timeout: Duration) -> bool {
            true
        }

        async fn observe(&self) -> Observation {
            self.observation.clone()
        }
    }

    fn sample_space() -> FilterSpace {
        let dims = vec![
            FilterDimension::new(
                "Gender",
                vec![
                    FilterOption::new("A", ActivationHandle::new(0, 0)),
                    FilterOption::new("B", ActivationHandle::new(0, 1)),
                ],
            ),
            FilterDimension::new(
                "Region",
                vec![
                    FilterOption::new("X", ActivationHandle::new(1, 0)),
                    FilterOption::new("Y", ActivationHandle::new(1, 1)),
                ],
            ),
        ];
        FilterSpace::new(dims).unwrap()
    }

    fn fast_controls(budget: Option<usize>) -> SweepControls {
        SweepControls::new(Duration::ZERO, Duration::ZERO, Duration::ZERO, 2, budget)
    }

    fn two_party_observation() -> Observation {
        let mut observation = Observation::new();
        observation.push("Party1", "10%");
        observation.push("Party2", "5%");
        observation
    }

    async fn collect_leaves(
        space: &FilterSpace,
        driver: &FakeDriver,
        controls: &SweepControls,
    ) -> (SweepSummary, Vec<Vec<String>>) {
        let traversal = Traversal::new(space, driver, controls);
        let mut leaves = Vec::new();
        let summary = traversal
            .run(|selection, _observation| {
                leaves.push(selection.labels().map(str::to_string).collect());
                Ok(())
            })
            .await
            .unwrap();
        (summary, leaves)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn visits_full_product_in_declared_order() {
        let space = sample_space();
        let driver = FakeDriver::new(two_party_observation());
        let (summary, leaves) = collect_leaves(&space, &driver, &fast_controls(None)).await;

        assert_eq!(summary.leaves_visited, 4);
        assert_eq!(summary.rows_emitted, 8);
        assert_eq!(summary.empty_leaves, 0);
        assert!(!summary.budget_exhausted);
        assert_eq!(
            leaves,
            vec![
                vec!["A", "X"],
                vec!["A", "Y"],
                vec!["B", "X"],
                vec!["B", "Y"],
            ]
        );
        // One click per descent step, outer dimension varying slowest.
        assert_eq!(
            driver.clicks(),
            vec![
                "Gender=A",
                "Region=X",
                "Region=Y",
                "Gender=B",
                "Region=X",
                "Region=Y",
            ]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn budget_stops_before_the_next_activation_sequence() {
        let space = sample_space();
        let driver = FakeDriver::new(two_party_observation());
        let (summary, leaves) = collect_leaves(&space, &driver, &fast_controls(Some(1))).await;

        assert_eq!(summary.leaves_visited, 1);
        assert!(summary.budget_exhausted);
        assert_eq!(leaves, vec![vec!["A", "X"]]);
        assert_eq!(driver.clicks(), vec!["Gender=A", "Region=X"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn budget_covering_the_space_is_not_a_cutoff() {
        let space = sample_space();
        let driver = FakeDriver::new(two_party_observation());
        let (summary, leaves) = collect_leaves(&space, &driver, &fast_controls(Some(10))).await;

        assert_eq!(summary.leaves_visited, 4);
        assert_eq!(leaves.len(), 4);
        assert!(!summary.budget_exhausted);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_activations_are_retried_then_ignored() {
        let space = sample_space();
        let driver =
            FakeDriver::new(two_party_observation()).with_failing_labels(vec!["X"]);
        let (summary, leaves) = collect_leaves(&space, &driver, &fast_controls(None)).await;

        // The intended label is still recorded and the sweep continues.
        assert_eq!(summary.leaves_visited, 4);
        assert_eq!(summary.apply_failures, 2);
        assert_eq!(leaves[0], vec!["A", "X"]);

        // Three attempts per failing activation: initial plus two retries.
        let x_clicks = driver
            .clicks()
            .iter()
            .filter(|click| click.as_str() == "Region=X")
            .count();
        assert_eq!(x_clicks, 6);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_observations_count_as_empty_leaves() {
        let space = sample_space();
        let driver = FakeDriver::new(Observation::new());
        let (summary, leaves) = collect_leaves(&space, &driver, &fast_controls(None)).await;

        assert_eq!(summary.leaves_visited, 4);
        assert_eq!(summary.rows_emitted, 0);
        assert_eq!(summary.empty_leaves, 4);
        assert_eq!(leaves.len(), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn emit_errors_abort_the_sweep() {
        let space = sample_space();
        let driver = FakeDriver::new(two_party_observation());
        let traversal = Traversal::new(&space, &driver, &fast_controls(None));

        let mut emitted = 0usize;
        let result = traversal
            .run(|_selection, _observation| {
                emitted += 1;
                if emitted == 2 {
                    return Err(SinkError::Append {
                        path: "out.csv".into(),
                        source: io::Error::new(io::ErrorKind::Other, "disk full"),
                    });
                }
                Ok(())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(emitted, 2);
    }
}
