//! Row sources: the batch file abstraction
//!
//! A row source is read once, in full, at the start of a batch. Results are
//! then written back cell by cell at coordinates derived from the absolute
//! row index, and persisted by a single `flush` at the end of the run.

use super::intent::BatchRow;
use super::spreadsheet::SpreadsheetRowSource;
use super::text::TextRowSource;
use crate::config::BatchConfig;
use crate::error::{DispatchError, DispatchResult};

use std::path::Path;

/// Batch file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSourceKind {
    Text,
    Spreadsheet,
}

/// Ordered table of transaction rows with positional write-back
pub trait RowSource: Send {
    fn kind(&self) -> RowSourceKind;

    /// Read every row, preserving file order
    fn read_all(&mut self) -> DispatchResult<Vec<BatchRow>>;

    /// Where the result for absolute row `index` is written
    fn output_coordinate(&self, index: usize) -> String;

    /// Write a single value at `coordinate`
    fn write_string(&mut self, coordinate: &str, value: &str) -> DispatchResult<()>;

    /// Persist all writes
    fn flush(&mut self) -> DispatchResult<()>;
}

/// Open a batch file, choosing the format from its extension
pub fn open_row_source(path: &Path, config: &BatchConfig) -> DispatchResult<Box<dyn RowSource>> {
    if !path.is_file() {
        return Err(DispatchError::BatchFile(format!("Batch file not found: {:?}", path)));
    }

    let is_spreadsheet = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);

    if is_spreadsheet {
        Ok(Box::new(SpreadsheetRowSource::open(
            path,
            &config.sheet,
            &config.output_column,
        )?))
    } else {
        Ok(Box::new(TextRowSource::open(path)?))
    }
}
