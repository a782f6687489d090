//! Filter space model: the dimensions and options discovered once per run.

use serde::Serialize;
use std::fmt;

/// Positional address of an option's activation button inside the page.
///
/// Opaque to everything except the browser driver, which resolves it against
/// the live DOM on every activation, so the handle survives page re-renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActivationHandle {
    section: usize,
    button: usize,
}

impl ActivationHandle {
    /// Builds a handle from a section index and a button index within it.
    pub fn new(section: usize, button: usize) -> Self {
        Self { section, button }
    }

    /// Index of the filter section among all filter sections on the page.
    pub fn section(&self) -> usize {
        self.section
    }

    /// Index of the option button within its section.
    pub fn button(&self) -> usize {
        self.button
    }
}

/// One selectable value within a dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    label: String,
    handle: ActivationHandle,
}

impl FilterOption {
    /// Creates an option from its visible label and activation handle.
    pub fn new(label: impl Into<String>, handle: ActivationHandle) -> Self {
        Self {
            label: label.into(),
            handle,
        }
    }

    /// Human-readable label, exactly as rendered on the page.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The handle used to activate this option.
    pub fn handle(&self) -> ActivationHandle {
        self.handle
    }
}

/// A named discrete axis of variation with its ordered options.
///
/// Option order is declaration order as found on the page and is never
/// re-sorted; it doubles as the traversal order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterDimension {
    name: String,
    options: Vec<FilterOption>,
}

impl FilterDimension {
    /// Creates a dimension from its name and ordered options.
    pub fn new(name: impl Into<String>, options: Vec<FilterOption>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// Dimension name, unique across the space.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered options of this dimension.
    pub fn options(&self) -> &[FilterOption] {
        &self.options
    }
}

/// The ordered sequence of all dimensions discovered on the page.
///
/// Frozen after construction: nothing may add, remove, or reorder entries
/// for the remainder of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterSpace {
    dimensions: Vec<FilterDimension>,
}

impl FilterSpace {
    /// Builds the space, rejecting any layout with zero total combinations.
    pub fn new(dimensions: Vec<FilterDimension>) -> Result<Self, EmptySpaceError> {
        if dimensions.is_empty() {
            return Err(EmptySpaceError::NoDimensions);
        }
        if let Some(empty) = dimensions.iter().find(|dim| dim.options.is_empty()) {
            return Err(EmptySpaceError::EmptyDimension(empty.name.clone()));
        }
        Ok(Self { dimensions })
    }

    /// Ordered dimensions of the space.
    pub fn dimensions(&self) -> &[FilterDimension] {
        &self.dimensions
    }

    /// Number of dimensions.
    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    /// Ordered dimension names, for header rows and dumps.
    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|dim| dim.name.as_str())
    }

    /// Total number of leaf combinations (saturating on overflow).
    pub fn total_combinations(&self) -> usize {
        self.dimensions
            .iter()
            .fold(1usize, |acc, dim| acc.saturating_mul(dim.options.len()))
    }
}

/// Errors rejected at space construction time; both abort the run before
/// any traversal begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptySpaceError {
    /// Discovery produced no filter sections at all.
    NoDimensions,
    /// The named dimension carries zero options, emptying the whole space.
    EmptyDimension(String),
}

impl fmt::Display for EmptySpaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDimensions => write!(f, "no filter dimensions were discovered"),
            Self::EmptyDimension(name) => {
                write!(f, "filter dimension '{name}' has no options")
            }
        }
    }
}

impl std::error::Error for EmptySpaceError {}

/// One full or partial assignment of options, one label per descended
/// dimension.
///
/// The traversal uses it as a stack: entries are pushed in dimension order
/// on descent and popped on backtrack, so iteration order always equals
/// dimension order. A clone is taken whenever a completed selection is
/// handed off, since the original keeps mutating as the sweep continues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    entries: Vec<(String, String)>,
}

impl Selection {
    /// Creates an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the chosen label for the next dimension.
    pub fn push(&mut self, dimension: &str, label: &str) {
        self.entries.push((dimension.to_string(), label.to_string()));
    }

    /// Removes the most recently recorded entry.
    pub fn pop(&mut self) {
        self.entries.pop();
    }

    /// The `(dimension, label)` entries in dimension order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Chosen labels in dimension order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, label)| label.as_str())
    }

    /// Number of assigned dimensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no dimension has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
