//! Metric tables as served by the ingest service
//!
//! The ingest service serves commit, file and developer metrics as CSV with a
//! header row. Cells stay textual in [`MetricsTable`]; columns are read back
//! as numbers or labels on demand, and commit rows are lifted into
//! [`CommitRecord`]s aligned with a [`FeatureSchema`].

use crate::schema::{FeatureSchema, DATE_COLUMN, ID_COLUMN, LABEL_COLUMN};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("CSV input has no header row")]
    MissingHeader,

    #[error("Row {row} has {actual} fields, header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Unterminated quoted field starting on line {0}")]
    UnterminatedQuote(usize),

    #[error("Missing required column '{0}'")]
    MissingColumn(String),

    #[error("Invalid author date '{value}' for commit '{commit}'")]
    InvalidDate { commit: String, value: String },
}

pub type Result<T> = std::result::Result<T, TableError>;

/// One commit with its metrics aligned to a schema
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub commit_id: String,
    /// Author date in unix seconds
    pub author_date: i64,
    /// One value per schema feature, `None` when missing
    pub metrics: Vec<Option<f64>>,
    pub label: Option<bool>,
}

impl CommitRecord {
    /// Record with every metric present
    pub fn complete(
        commit_id: impl Into<String>,
        author_date: i64,
        metrics: Vec<f64>,
        label: Option<bool>,
    ) -> Self {
        Self {
            commit_id: commit_id.into(),
            author_date,
            metrics: metrics.into_iter().map(Some).collect(),
            label,
        }
    }

    /// Dense feature vector, or `None` if any metric is missing
    pub fn feature_vector(&self) -> Option<Vec<f64>> {
        self.metrics.iter().copied().collect()
    }

    /// True when the record is usable for training
    pub fn is_complete(&self) -> bool {
        self.label.is_some() && self.metrics.iter().all(|m| m.map_or(false, |v| !v.is_nan()))
    }
}

/// A parsed CSV table
#[derive(Debug, Clone, Default)]
pub struct MetricsTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetricsTable {
    /// Parse CSV text (RFC 4180 quoting, `\n` or `\r\n` line endings)
    pub fn parse(text: &str) -> Result<Self> {
        let mut records = parse_records(text)?.into_iter();
        let columns = records.next().ok_or(TableError::MissingHeader)?;

        let mut rows = Vec::new();
        for (i, record) in records.enumerate() {
            if record.len() != columns.len() {
                return Err(TableError::RaggedRow {
                    row: i + 1,
                    expected: columns.len(),
                    actual: record.len(),
                });
            }
            rows.push(record);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Numeric values of a column; empty or unparseable cells are `None`
    pub fn numeric_column(&self, idx: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| parse_number(&row[idx])).collect()
    }

    /// Lift rows into commit records aligned with `schema`
    ///
    /// Requires the id and date columns and every schema feature. The label
    /// column is optional (prediction-time tables may omit it).
    pub fn commit_records(&self, schema: &FeatureSchema) -> Result<Vec<CommitRecord>> {
        let required = |name: &str| {
            self.column_index(name)
                .ok_or_else(|| TableError::MissingColumn(name.to_string()))
        };

        let id_idx = required(ID_COLUMN)?;
        let date_idx = required(DATE_COLUMN)?;
        let label_idx = self.column_index(LABEL_COLUMN);
        let feature_idx = schema
            .features()
            .iter()
            .map(|f| required(f))
            .collect::<Result<Vec<_>>>()?;

        self.rows
            .iter()
            .map(|row| {
                let commit_id = row[id_idx].clone();
                let author_date = parse_date(&row[date_idx]).ok_or_else(|| {
                    TableError::InvalidDate {
                        commit: commit_id.clone(),
                        value: row[date_idx].clone(),
                    }
                })?;

                Ok(CommitRecord {
                    commit_id,
                    author_date,
                    metrics: feature_idx.iter().map(|&i| parse_number(&row[i])).collect(),
                    label: label_idx.and_then(|i| parse_label(&row[i])),
                })
            })
            .collect()
    }

    /// Numeric columns with their values, skipping `excluded` column names
    pub fn numeric_columns(&self, excluded: &[&str]) -> Vec<(String, Vec<Option<f64>>)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !excluded.contains(&name.as_str()))
            .map(|(i, name)| (name.clone(), self.numeric_column(i)))
            .collect()
    }

    /// Row lookup by column name, used by tests and diagnostics
    pub fn row_map(&self, row: usize) -> Option<HashMap<&str, &str>> {
        self.rows.get(row).map(|r| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(r.iter().map(String::as_str))
                .collect()
        })
    }
}

fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn parse_date(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    cell.parse::<i64>()
        .ok()
        .or_else(|| cell.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn parse_label(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Split CSV text into records of unescaped fields
fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote(quote_line));
    }

    // Last line without a trailing newline
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    // Blank lines carry no data
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));

    Ok(records)
}
