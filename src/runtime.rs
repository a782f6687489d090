//! Application runner coordinating one sweep from launch to report.

use crate::browser::BrowserSession;
use crate::controls::{Cli, SweepControls};
use crate::sink::{CsvSink, Record};
use crate::space::FilterSpace;
use crate::traverse::{SweepSummary, Traversal};
use anyhow::Context;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;
use tokio::task::LocalSet;

const USER_AGENT: &str = "facetsweep/0.1 (survey chart sweep)";
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);
const PROGRESS_EVERY_ROWS: usize = 100;

/// Entry point used by the sweep binary: runs the whole crawl on a
/// current-thread runtime.
///
/// The traversal is sequential by design; the page holds one piece of
/// mutable global state, so there is never more than one CDP action in
/// flight.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let rt = Builder::new_current_thread().enable_all().build()?;
    let local = LocalSet::new();
    rt.block_on(local.run_until(run_sweep(cli)))
}

async fn run_sweep(cli: Cli) -> anyhow::Result<()> {
    let url = cli.target_url().context("invalid target URL")?;
    let controls = cli.build_controls();

    preflight(&url).await?;

    println!("Loading {url}...");
    let session = BrowserSession::launch(&url, &cli.chart_label, &controls)
        .await
        .context("failed to launch browser session")?;

    // The session must be released on every path out of the sweep.
    let result = drive(&session, &cli, &controls).await;
    session.close().await;
    result
}

/// Checks the target answers plain HTTP before a browser is paid for.
async fn preflight(url: &url::Url) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(PREFLIGHT_TIMEOUT)
        .build()
        .context("failed to build preflight client")?;
    let response = client
        .get(url.as_str())
        .send()
        .await
        .with_context(|| format!("target unreachable: {url}"))?;
    anyhow::ensure!(
        response.status().is_success(),
        "target {url} answered with status {}",
        response.status()
    );
    Ok(())
}

async fn drive(
    session: &BrowserSession,
    cli: &Cli,
    controls: &SweepControls,
) -> anyhow::Result<()> {
    println!("Discovering filter sections...");
    let dimensions = session.discover().await.context("filter discovery failed")?;
    for dimension in &dimensions {
        println!("  {}: {} options", dimension.name(), dimension.options().len());
    }

    let space = FilterSpace::new(dimensions)?;
    println!("Total combinations: {}", space.total_combinations());

    if cli.discover_only {
        println!("{}", serde_json::to_string_pretty(&space)?);
        return Ok(());
    }

    let mut sink = CsvSink::create(
        cli.output.clone(),
        &space,
        &cli.entity_column,
        &cli.value_column,
    );
    let start = Instant::now();
    let mut last_reported = 0usize;

    let traversal = Traversal::new(&space, session, controls);
    let summary = traversal
        .run(|selection, observation| {
            let records = Record::from_leaf(selection, observation);
            sink.write_leaf(&records)?;
            let written = sink.rows_written();
            if written / PROGRESS_EVERY_ROWS > last_reported / PROGRESS_EVERY_ROWS {
                println!("Processed {written} rows...");
            }
            last_reported = written;
            Ok(())
        })
        .await?;

    report(&summary, &space, sink.rows_written(), start.elapsed(), sink.path());
    Ok(())
}

fn report(
    summary: &SweepSummary,
    space: &FilterSpace,
    rows: usize,
    elapsed: Duration,
    output: &Path,
) {
    let secs = elapsed.as_secs_f32().max(f32::EPSILON);
    println!("--- sweep metrics ({secs:.2}s) ---");
    println!(
        "combinations visited: {} of {}",
        summary.leaves_visited,
        space.total_combinations()
    );
    println!("rows written: {rows}");
    println!("rows/sec: {:.2}", rows as f32 / secs);
    println!("empty combinations: {}", summary.empty_leaves);
    println!("ignored activation failures: {}", summary.apply_failures);
    if summary.budget_exhausted {
        println!("stopped at the combination budget");
    }
    println!("output: {}", output.display());
}
