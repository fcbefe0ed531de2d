//! `.xlsx` batch files
//!
//! Row 1 is a header. Each following row holds sender, receiver, value,
//! payload and passphrase in columns A to E; the transaction hash is written
//! to the output column of the same row.

use super::intent::BatchRow;
use super::source::{RowSource, RowSourceKind};
use crate::error::{DispatchError, DispatchResult};

use std::path::{Path, PathBuf};
use tracing::debug;
use umya_spreadsheet::Spreadsheet;

/// Spreadsheet row holding the first batch row
const FIRST_DATA_ROW: usize = 2;
const INPUT_COLUMNS: [&str; 5] = ["A", "B", "C", "D", "E"];

pub struct SpreadsheetRowSource {
    path: PathBuf,
    sheet: String,
    output_column: String,
    book: Spreadsheet,
}

impl SpreadsheetRowSource {
    pub fn open(path: &Path, sheet: &str, output_column: &str) -> DispatchResult<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| DispatchError::BatchFile(format!("Failed to read {:?}: {:?}", path, e)))?;

        if book.get_sheet_by_name(sheet).is_none() {
            return Err(DispatchError::BatchFile(format!(
                "Sheet {} not found in {:?}",
                sheet, path
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            sheet: sheet.to_string(),
            output_column: output_column.to_uppercase(),
            book,
        })
    }
}

impl RowSource for SpreadsheetRowSource {
    fn kind(&self) -> RowSourceKind {
        RowSourceKind::Spreadsheet
    }

    fn read_all(&mut self) -> DispatchResult<Vec<BatchRow>> {
        let sheet = self
            .book
            .get_sheet_by_name(&self.sheet)
            .ok_or_else(|| DispatchError::BatchFile(format!("Sheet {} not found", self.sheet)))?;

        let highest = sheet.get_highest_row() as usize;
        let mut rows = Vec::new();
        for row in FIRST_DATA_ROW..=highest {
            let [sender, receiver, value, payload, passphrase] = INPUT_COLUMNS
                .map(|column| sheet.get_value(format!("{}{}", column, row).as_str()).trim().to_string());
            rows.push(BatchRow {
                sender,
                receiver,
                value,
                payload,
                passphrase: Some(passphrase).filter(|p| !p.is_empty()),
            });
        }

        // trailing blank rows are formatting, not data
        while rows.last().map_or(false, |row| *row == BatchRow::default()) {
            rows.pop();
        }

        debug!("Read {} rows from {:?} sheet {}", rows.len(), self.path, self.sheet);
        Ok(rows)
    }

    fn output_coordinate(&self, index: usize) -> String {
        format!("{}{}", self.output_column, index + FIRST_DATA_ROW)
    }

    fn write_string(&mut self, coordinate: &str, value: &str) -> DispatchResult<()> {
        let sheet = self
            .book
            .get_sheet_by_name_mut(&self.sheet)
            .ok_or_else(|| DispatchError::BatchFile(format!("Sheet {} not found", self.sheet)))?;
        sheet.get_cell_mut(coordinate).set_value(value);
        Ok(())
    }

    fn flush(&mut self) -> DispatchResult<()> {
        umya_spreadsheet::writer::xlsx::write(&self.book, &self.path)
            .map_err(|e| DispatchError::BatchFile(format!("Failed to write {:?}: {:?}", self.path, e)))?;
        debug!("Flushed batch results to {:?}", self.path);
        Ok(())
    }
}
