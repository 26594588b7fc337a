//! Delimiter-separated text reader.

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Lines};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFormat {
    pub delimiter: char,
    /// Skip the first non-comment line.
    pub has_header: bool,
    pub comment_prefix: char,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            has_header: false,
            comment_prefix: '#',
        }
    }
}

impl TableFormat {
    pub fn tsv() -> Self {
        Self::default()
    }

    pub fn with_header(mut self) -> Self {
        self.has_header = true;
        self
    }
}

/// One data row. `line` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub line: usize,
    pub fields: Vec<String>,
}

impl Row {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields
            .get(index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}

/// Iterator over the data rows of a table; blank lines, comments and the
/// header are skipped.
pub struct TableReader<R: BufRead> {
    lines: Lines<R>,
    format: TableFormat,
    line_no: usize,
    header_pending: bool,
}

impl<R: BufRead> TableReader<R> {
    pub fn new(reader: R, format: TableFormat) -> Self {
        let header_pending = format.has_header;
        Self {
            lines: reader.lines(),
            format,
            line_no: 0,
            header_pending,
        }
    }
}

impl<R: BufRead> Iterator for TableReader<R> {
    type Item = io::Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.line_no += 1;

            let content = line.trim_end_matches(['\r', '\n']);
            let trimmed = content.trim();
            if trimmed.is_empty() || trimmed.starts_with(self.format.comment_prefix) {
                continue;
            }
            if self.header_pending {
                self.header_pending = false;
                continue;
            }

            let fields = content
                .split(self.format.delimiter)
                .map(str::to_string)
                .collect();
            return Some(Ok(Row {
                line: self.line_no,
                fields,
            }));
        }
    }
}
