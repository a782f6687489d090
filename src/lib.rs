#![warn(missing_docs)]
//! Core library entry points for the facetsweep survey-chart crawler.

pub mod browser;
pub mod chart;
pub mod controls;
pub mod runtime;
pub mod sink;
pub mod space;
pub mod traverse;

pub use chart::{ChartPattern, Observation, DEFAULT_CHART_LABEL};
pub use controls::{Cli, SweepControls};
pub use runtime::run as run_sweep;
pub use sink::{parse_rows, CsvSink, Record, SinkError};
pub use space::{
    ActivationHandle, EmptySpaceError, FilterDimension, FilterOption, FilterSpace, Selection,
};
pub use traverse::{DriverError, PageDriver, SweepSummary, Traversal};

#[cfg(feature = "debug_logs")]
#[macro_export]
// This allows use of the `eprintln!` macro via `debug_log!` macro.
macro_rules! debug_log {
        ($($arg:tt)*) => {
            eprintln!($($arg)*);
        };
    }
#[cfg(not(feature = "debug_logs"))]
#[macro_export]
// This effectively disables the `eprintln!` macro, effectively removing it from the code during
// compilation.
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}
