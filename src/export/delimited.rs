//! RFC 4180 delimited text.

use csv::{Terminator, WriterBuilder};

use super::layout::{self, Table};
use super::ExportError;
use crate::models::ClientIntake;

const BLANK_LINE: &[u8] = b"\r\n";

/// Append `table` to `out` as CRLF-terminated records.
fn write_table(out: Vec<u8>, table: &Table) -> Result<Vec<u8>, ExportError> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(out);
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Field/value table, then a blank line and the parties when there are any.
pub fn render_single(intake: &ClientIntake) -> Result<Vec<u8>, ExportError> {
    let mut out = write_table(Vec::new(), &layout::client_table(intake))?;
    if !intake.related_parties.is_empty() {
        out.extend_from_slice(BLANK_LINE);
        out = write_table(out, &layout::party_table(&intake.related_parties))?;
    }
    Ok(out)
}

/// The flattened all-records table.
pub fn render_all(intakes: &[ClientIntake]) -> Result<Vec<u8>, ExportError> {
    write_table(Vec::new(), &layout::flattened_table(intakes))
}
