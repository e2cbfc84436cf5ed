//! Delimited-text export of the attendance history.

use crate::report::history;
use crate::types::AttendanceRecord;
use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

pub const EXPORT_HEADER: [&str; 7] = [
    "Date",
    "Time",
    "Employee Name",
    "Employee ID",
    "Status",
    "Confidence",
    "Mood",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExportError {
    #[error("no records to export")]
    Empty,
}

/// Export file name for the given day, e.g. `attendance_logs_2026-10-19.csv`.
pub fn export_filename(date: NaiveDate) -> String {
    format!("attendance_logs_{}.csv", date.format("%Y-%m-%d"))
}

/// Render every record as one CSV row, newest first, with dates and times
/// shown in `offset`.
pub fn export_csv(records: &[AttendanceRecord], offset: FixedOffset) -> Result<String, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(EXPORT_HEADER.join(","));
    for record in history(records) {
        lines.push(export_row(record, offset));
    }
    Ok(lines.join("\n"))
}

fn export_row(record: &AttendanceRecord, offset: FixedOffset) -> String {
    let local: DateTime<FixedOffset> = record.timestamp.with_timezone(&offset);
    [
        local.format("%Y-%m-%d").to_string(),
        local.format("%H:%M:%S").to_string(),
        quote(&record.user_name),
        record.user_id.clone(),
        record.status.as_str().to_string(),
        format!("{:.1}%", record.confidence * 100.0),
        record.mood.as_deref().map_or_else(|| "-".to_string(), escape),
    ]
    .join(",")
}

/// Wrap a field in double quotes, doubling any embedded quotes.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quote a free-text field only when it would break the row.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        quote(field)
    } else {
        field.to_string()
    }
}
