//! Export artifacts: JSON documents, Excel workbooks and HTML chart pages

pub mod html;
pub mod json;
pub mod xlsx;

use crate::error::Result;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Xlsx,
    Html,
    All,
}

impl OutputFormat {
    /// Whether `self` asks for the artifact kind `kind`
    pub fn includes(self, kind: OutputFormat) -> bool {
        self == OutputFormat::All || self == kind
    }
}

/// A single spreadsheet cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::Text).unwrap_or(CellValue::Empty)
    }
}

impl From<Option<DateTime<chrono::Utc>>> for CellValue {
    fn from(value: Option<DateTime<chrono::Utc>>) -> Self {
        value
            .map(|dt| CellValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(CellValue::Empty)
    }
}

/// Flat records that can be laid out as one spreadsheet row each
pub trait TabularRecord {
    fn headers() -> &'static [&'static str];
    fn row(&self) -> Vec<CellValue>;
}

/// Count table: one row per `row` key, one column per `column` key
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub row_label: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<u64>)>,
}

impl Pivot {
    /// Count `(row, column)` pairs
    ///
    /// Columns follow `column_order` first; keys not listed there are appended
    /// in sorted order. Rows are sorted.
    pub fn from_pairs<I>(row_label: &str, column_order: &[&str], pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut counts: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        let mut columns: Vec<String> = column_order.iter().map(|c| c.to_string()).collect();

        for (row, column) in pairs {
            if !columns.contains(&column) {
                columns.push(column.clone());
            }
            *counts.entry(row).or_default().entry(column).or_default() += 1;
        }

        let fixed = column_order.len();
        columns[fixed..].sort();

        let rows = counts
            .into_iter()
            .map(|(row, by_column)| {
                let values = columns
                    .iter()
                    .map(|c| by_column.get(c).copied().unwrap_or(0))
                    .collect();
                (row, values)
            })
            .collect();

        Self {
            row_label: row_label.to_string(),
            columns,
            rows,
        }
    }

    pub fn column_totals(&self) -> Vec<u64> {
        (0..self.columns.len())
            .map(|i| self.rows.iter().map(|(_, values)| values[i]).sum())
            .collect()
    }

    pub fn grand_total(&self) -> u64 {
        self.column_totals().iter().sum()
    }
}

/// `<dir>/<stem>-<timestamp>.<ext>`
pub fn artifact_path(dir: &Path, stem: &str, ext: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}-{}.{}", stem, at.format("%Y%m%d-%H%M%S"), ext))
}

/// Write every artifact `format` asks for and return the paths written
///
/// All artifacts of one run share a timestamp.
pub fn write_reports<R>(
    dir: &Path,
    stem: &str,
    format: OutputFormat,
    records: &[R],
    pivot: &Pivot,
    chart: &html::ChartPage,
) -> Result<Vec<PathBuf>>
where
    R: TabularRecord + Serialize,
{
    let at = Local::now();
    let mut written = Vec::new();

    if format.includes(OutputFormat::Json) {
        let path = artifact_path(dir, stem, "json", at);
        json::write_json(&path, records)?;
        written.push(path);
    }

    if format.includes(OutputFormat::Xlsx) {
        let path = artifact_path(dir, stem, "xlsx", at);
        xlsx::write_workbook(&path, records, pivot)?;
        written.push(path);
    }

    if format.includes(OutputFormat::Html) {
        let path = artifact_path(dir, stem, "html", at);
        html::write_chart_page(&path, chart)?;
        written.push(path);
    }

    Ok(written)
}
