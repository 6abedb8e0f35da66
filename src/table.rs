use crate::error::{Error, Result};
use crate::normalize::MetricValue;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Metric(MetricValue),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Metric(v) => write!(f, "{}", v),
        }
    }
}

impl From<MetricValue> for Cell {
    fn from(value: MetricValue) -> Self {
        Cell::Metric(value)
    }
}

/// Rows by named columns. Missing cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Option<Cell>>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Reads CSV with a header row. Blank cells become `None`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut table = Table::new(headers);

        for record in rdr.records() {
            let record = record?;
            let row = record
                .iter()
                .map(|cell| {
                    let cell = cell.trim();
                    (!cell.is_empty()).then(|| Cell::Text(cell.to_string()))
                })
                .collect();
            table.push_row(row);
        }
        Ok(table)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_csv_reader(file)
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Option<Cell>>) {
        row.resize(self.headers.len(), None);
        self.rows.push(row);
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Option<Cell>>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    /// The column's cells as text, `None` where the cell is empty.
    pub fn column_text(&self, name: &str) -> Result<Vec<Option<String>>> {
        let idx = self.column_index(name)?;
        Ok(self
            .rows
            .iter()
            .map(|row| match row.get(idx) {
                Some(Some(cell)) => {
                    let text = cell.to_string();
                    let trimmed = text.trim();
                    (!trimmed.is_empty()).then(|| trimmed.to_string())
                }
                _ => None,
            })
            .collect())
    }

    /// `base`, or `base #2`, `base #3`, ... whichever is free.
    pub fn unique_label(&self, base: &str) -> String {
        if !self.headers.iter().any(|h| h == base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} #{}", base, n))
            .find(|candidate| !self.headers.iter().any(|h| h == candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Appends a column under a label no existing column uses; returns that label.
    pub fn add_column(&mut self, label: &str, values: Vec<Option<Cell>>) -> Result<String> {
        if values.len() != self.rows.len() {
            return Err(Error::Internal(format!(
                "column '{}' has {} values for {} rows",
                label,
                values.len(),
                self.rows.len()
            )));
        }
        let label = self.unique_label(label);
        self.headers.push(label.clone());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(label)
    }

    /// Rows as JSON objects keyed by header.
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row)
                    .map(|(h, cell)| {
                        let value = match cell {
                            Some(cell) => serde_json::to_value(cell).unwrap_or(Value::Null),
                            None => Value::Null,
                        };
                        (h.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}
