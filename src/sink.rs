//! Append-per-leaf persistence of sweep records as delimited text.

use crate::chart::Observation;
use crate::space::{FilterSpace, Selection};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::mem::take;
use std::path::{Path, PathBuf};

/// Field delimiter of the output format.
pub const DELIMITER: char = ';';
/// Escape character, applied to the delimiter, itself, and line breaks.
pub const ESCAPE: char = '\\';

/// One output row: a completed selection flattened with a single
/// entity/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    selection: Selection,
    entity: String,
    value: String,
}

impl Record {
    /// Creates a record from an owned selection copy and one observed pair.
    pub fn new(selection: Selection, entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            selection,
            entity: entity.into(),
            value: value.into(),
        }
    }

    /// Expands a leaf observation into its records, one per entity, in
    /// observation order. An empty observation expands to no records.
    pub fn from_leaf(selection: &Selection, observation: &Observation) -> Vec<Record> {
        observation
            .entries()
            .iter()
            .map(|(entity, value)| Record::new(selection.clone(), entity.clone(), value.clone()))
            .collect()
    }

    /// The selection this record belongs to.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Observed entity label.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Observed value, exactly as rendered.
    pub fn value(&self) -> &str {
        &self.value
    }

    fn cells(&self) -> impl Iterator<Item = &str> {
        self.selection
            .labels()
            .chain([self.entity.as_str(), self.value.as_str()])
    }
}

/// Errors surfaced while appending to the output file. All of them abort
/// the run: rows already on disk stay trustworthy, nothing is retried.
#[derive(Debug)]
pub enum SinkError {
    /// The output file's parent directory could not be created.
    CreateDir {
        /// Directory that failed to materialize.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// Opening or appending to the output file failed.
    Append {
        /// Output file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDir { path, source } => {
                write!(f, "failed to create directory {}: {source}", path.display())
            }
            Self::Append { path, source } => {
                write!(f, "failed to append to {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDir { source, .. } | Self::Append { source, .. } => Some(source),
        }
    }
}

/// Streaming writer that appends one leaf's records at a time.
///
/// Every `write_leaf` call is its own open-append-close cycle, so a crash
/// between two leaves loses at most the in-flight leaf. The header row is
/// written exactly once, by the first call of the run; nothing touches the
/// disk before that.
#[derive(Debug)]
pub struct CsvSink {
    path: PathBuf,
    header: String,
    header_written: bool,
    rows_written: usize,
}

impl CsvSink {
    /// Prepares a sink whose header lists the space's dimensions in order,
    /// followed by the two observation columns.
    pub fn create(
        path: PathBuf,
        space: &FilterSpace,
        entity_column: &str,
        value_column: &str,
    ) -> Self {
        let header = render_row(
            space
                .dimension_names()
                .chain([entity_column, value_column]),
        );
        Self {
            path,
            header,
            header_written: false,
            rows_written: 0,
        }
    }

    /// Output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended so far, header excluded.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Appends one leaf's records. The call either lands completely or
    /// fails the run; nothing is buffered across calls.
    pub fn write_leaf(&mut self, records: &[Record]) -> Result<(), SinkError> {
        let mut payload = String::new();
        if !self.header_written {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
            }
            payload.push_str(&self.header);
            payload.push('\n');
        }
        for record in records {
            payload.push_str(&render_row(record.cells()));
            payload.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| SinkError::Append {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(payload.as_bytes())
            .map_err(|source| SinkError::Append {
                path: self.path.clone(),
                source,
            })?;

        self.header_written = true;
        self.rows_written += records.len();
        Ok(())
    }
}

fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for ch in field.chars() {
        if ch == DELIMITER || ch == ESCAPE || ch == '\n' || ch == '\r' {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
    out
}

fn render_row<'a>(cells: impl Iterator<Item = &'a str>) -> String {
    let mut row = String::new();
    for (idx, cell) in cells.enumerate() {
        if idx > 0 {
            row.push(DELIMITER);
        }
        row.push_str(&escape_field(cell));
    }
    row
}

/// Parses text produced by [`CsvSink`] back into rows of fields.
///
/// The inverse of the writer's escaping: a `\` takes the next character
/// literally (including line breaks), an unescaped `;` splits fields, an
/// unescaped newline ends the row. Used by tests and downstream consumers
/// that want to re-read a sweep.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            field.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            ESCAPE => escaped = true,
            DELIMITER => row.push(take(&mut field)),
            '\n' => {
                row.push(take(&mut field));
                rows.push(take(&mut row));
            }
            '\r' => {}
            _ => field.push(ch),
        }
    }

    // Flush a trailing row that lacked its final newline.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}
