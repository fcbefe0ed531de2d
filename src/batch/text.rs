//! Comma separated batch files
//!
//! ```text
//! # sender, receiver, value, payload, passphrase, hash
//! 0x7e5f...5bdf, 0x2b5a...d6cf, 1000, 0x, , 0x9c1e...
//! ```
//!
//! Blank lines and `#` comments are kept verbatim but are not rows. The
//! transaction hash lands in the sixth field of its row's line.
//!
//! Commas inside parentheses belong to the field, so a macro payload such as
//! `$transfer(USDT, $receiver, 2)` stays a single field.

use super::intent::BatchRow;
use super::source::{RowSource, RowSourceKind};
use crate::error::{DispatchError, DispatchResult};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const OUTPUT_FIELD: usize = 5;

pub struct TextRowSource {
    path: PathBuf,
    lines: Vec<String>,
    /// Line number of every row
    row_lines: Vec<usize>,
    dirty: bool,
}

impl TextRowSource {
    pub fn open(path: &Path) -> DispatchResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DispatchError::BatchFile(format!("Failed to read {:?}: {}", path, e)))?;

        let lines: Vec<String> = contents.lines().map(str::to_string).collect();
        let row_lines = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| is_row(line))
            .map(|(n, _)| n)
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            row_lines,
            dirty: false,
        })
    }
}

fn is_row(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

/// Split a row at commas outside parentheses
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                fields.push(line[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(line[start..].trim().to_string());
    fields
}

impl RowSource for TextRowSource {
    fn kind(&self) -> RowSourceKind {
        RowSourceKind::Text
    }

    fn read_all(&mut self) -> DispatchResult<Vec<BatchRow>> {
        let rows = self
            .row_lines
            .iter()
            .map(|&n| {
                let mut fields = split_fields(&self.lines[n]).into_iter();
                let mut next = || fields.next().unwrap_or_default();
                let sender = next();
                let receiver = next();
                let value = next();
                let payload = next();
                let passphrase = Some(next()).filter(|p| !p.is_empty());
                BatchRow {
                    sender,
                    receiver,
                    value,
                    payload,
                    passphrase,
                }
            })
            .collect::<Vec<_>>();

        debug!("Read {} rows from {:?}", rows.len(), self.path);
        Ok(rows)
    }

    fn output_coordinate(&self, index: usize) -> String {
        index.to_string()
    }

    fn write_string(&mut self, coordinate: &str, value: &str) -> DispatchResult<()> {
        let index: usize = coordinate
            .parse()
            .map_err(|_| DispatchError::BatchFile(format!("Invalid row coordinate {}", coordinate)))?;
        let line_no = *self
            .row_lines
            .get(index)
            .ok_or_else(|| DispatchError::BatchFile(format!("Row {} out of range", index)))?;

        let mut fields = split_fields(&self.lines[line_no]);
        if fields.len() <= OUTPUT_FIELD {
            fields.resize(OUTPUT_FIELD + 1, String::new());
        }
        fields[OUTPUT_FIELD] = value.to_string();

        self.lines[line_no] = fields.join(",");
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> DispatchResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let mut contents = self.lines.join("\n");
        contents.push('\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let write_err =
            |e: std::io::Error| DispatchError::BatchFile(format!("Failed to write {:?}: {}", self.path, e));

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(contents.as_bytes()).map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;

        self.dirty = false;
        debug!("Flushed batch results to {:?}", self.path);
        Ok(())
    }
}
