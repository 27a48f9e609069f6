//! Spreadsheet-oriented CSV export of responses and manual credits.
//!
//! # Responsibility
//! - Render the category/response rows and expanded manual-credit rows.
//! - Replace the target file atomically.
//!
//! # Invariants
//! - Only responses dated at or after the last reset are written.
//! - A manual entry worth N points yields N identical rows.
//! - Export never mutates the store.

use crate::model::emergency::Emergency;
use crate::model::points::ManualPointEntry;
use ::csv::{Terminator, WriterBuilder};
use chrono::{DateTime, FixedOffset, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Date pattern expected by the consuming spreadsheet.
pub const DEFAULT_CSV_DATE_FORMAT: &str = "%Y-%m-%d";

const HEADER: [&str; 4] = ["Emergency type", " Incident number", " Date", " Details"];
const MANUAL_ROW_LABEL: &str = "Manually added";

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Csv(::csv::Error),
    /// The configured pattern could not render a date.
    DateFormat(String),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "{err}"),
            Self::DateFormat(format) => write!(f, "cannot render dates with `{format}`"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::DateFormat(_) => None,
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<::csv::Error> for ExportError {
    fn from(value: ::csv::Error) -> Self {
        Self::Csv(value)
    }
}

/// Everything the exporter reads, captured in one consistent snapshot.
#[derive(Debug, Clone)]
pub struct CsvSnapshot {
    /// Categories in listing order.
    pub emergencies: Vec<Emergency>,
    pub manual_entries: Vec<ManualPointEntry>,
    pub last_reset: Option<DateTime<Utc>>,
}

/// Rendering options for the date column.
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat<'a> {
    pub date_format: &'a str,
    pub offset: FixedOffset,
}

impl CsvFormat<'_> {
    fn render_date(&self, at: DateTime<Utc>) -> ExportResult<String> {
        let mut rendered = String::new();
        write!(
            rendered,
            "{}",
            at.with_timezone(&self.offset).format(self.date_format)
        )
        .map_err(|_| ExportError::DateFormat(self.date_format.to_string()))?;
        Ok(rendered)
    }
}

/// Writes the export document to `writer`.
///
/// Layout: header row, one row per response since the last reset, a blank
/// line, then one row per manual point.
pub fn write_csv<W: Write>(
    writer: W,
    snapshot: &CsvSnapshot,
    format: &CsvFormat<'_>,
) -> ExportResult<W> {
    let mut builder = WriterBuilder::new();
    builder.terminator(Terminator::Any(b'\n'));

    let mut rows = builder.from_writer(writer);
    rows.write_record(HEADER)?;
    for emergency in &snapshot.emergencies {
        for response in &emergency.responses {
            if snapshot.last_reset.is_some_and(|reset| response.date < reset) {
                continue;
            }
            rows.write_record([
                emergency.kind.as_str(),
                response.incident_number.as_str(),
                format.render_date(response.date)?.as_str(),
                response.details.as_str(),
            ])?;
        }
    }

    let mut writer = rows.into_inner().map_err(flush_failed)?;
    writer.write_all(b"\n")?;

    let mut rows = builder.from_writer(writer);
    for entry in &snapshot.manual_entries {
        let date = format.render_date(entry.date_added)?;
        for _ in 0..entry.points {
            rows.write_record([MANUAL_ROW_LABEL, "", date.as_str(), ""])?;
        }
    }

    rows.into_inner().map_err(flush_failed)
}

/// Renders the export document into a string.
pub fn render_csv(snapshot: &CsvSnapshot, format: &CsvFormat<'_>) -> ExportResult<String> {
    let bytes = write_csv(Vec::new(), snapshot, format)?;
    String::from_utf8(bytes).map_err(|err| {
        ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

/// Writes the export document to `path`, replacing any existing file.
///
/// The document is written to a uniquely named temp file in the target's
/// directory and renamed into place, so readers never observe a partial
/// export and concurrent exports to one path do not collide.
pub fn export_csv_file(
    path: &Path,
    snapshot: &CsvSnapshot,
    format: &CsvFormat<'_>,
) -> ExportResult<()> {
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    // Each export gets its own uniquely named temp file; it is removed on
    // drop unless persisted.
    let mut staged = NamedTempFile::new_in(directory)?;
    let buffered = write_csv(BufWriter::new(staged.as_file_mut()), snapshot, format)?;
    buffered
        .into_inner()
        .map_err(|err| ExportError::Io(err.into_error()))?
        .sync_all()?;
    staged
        .persist(path)
        .map_err(|err| ExportError::Io(err.error))?;

    info!(
        "event=csv_export module=export status=ok categories={} manual_entries={}",
        snapshot.emergencies.len(),
        snapshot.manual_entries.len()
    );
    Ok(())
}

fn flush_failed<W>(err: ::csv::IntoInnerError<W>) -> ExportError {
    let cause = err.error();
    ExportError::Io(std::io::Error::new(cause.kind(), cause.to_string()))
}
