//! Export of client intakes as spreadsheet workbooks or delimited text.
//!
//! Everything is rendered into memory; callers stream the returned bytes.

pub mod delimited;
pub mod layout;
pub mod xlsx;

use chrono::NaiveDate;

use crate::models::ClientIntake;

/// Fallback stem when a legal name sanitises to nothing.
const FALLBACK_STEM: &str = "client_intake";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// A rendered download.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ExportFile {
    fn new(stem: &str, format: ExportFormat, body: Vec<u8>) -> Self {
        Self {
            filename: format!("{}.{}", stem, format.extension()),
            content_type: format.content_type(),
            body,
        }
    }

    /// `Content-Disposition` header value.
    pub fn disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Reduce a legal name to `[A-Za-z0-9_]`, collapsing runs of replaced
/// characters into one underscore.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let stem = out.trim_matches('_');
    if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem.to_string()
    }
}

/// Render one record, named after its legal name.
pub fn export_one(intake: &ClientIntake, format: ExportFormat) -> Result<ExportFile, ExportError> {
    let body = match format {
        ExportFormat::Xlsx => xlsx::write_workbook(&layout::single_record_sheets(intake))?,
        ExportFormat::Csv => delimited::render_single(intake)?,
    };
    let stem = sanitize_filename(&intake.details.legal_name);
    Ok(ExportFile::new(&stem, format, body))
}

/// Render every given record as one flattened table, named for `date`.
pub fn export_all(
    intakes: &[ClientIntake],
    format: ExportFormat,
    date: NaiveDate,
) -> Result<ExportFile, ExportError> {
    let body = match format {
        ExportFormat::Xlsx => xlsx::write_workbook(&layout::all_records_sheets(intakes))?,
        ExportFormat::Csv => delimited::render_all(intakes)?,
    };
    let stem = format!("client_intakes_{}", date.format("%Y-%m-%d"));
    Ok(ExportFile::new(&stem, format, body))
}
