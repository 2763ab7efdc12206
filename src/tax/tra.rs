//! Import of the tax authority's monthly VAT figures
//!
//! The extract is a CSV or XLSX table with at least the columns
//! `period,input_vat,output_vat`, one row per month. Extra columns are
//! ignored and rows with a blank period are skipped.

use bigdecimal::BigDecimal;
use calamine::{open_workbook, Data, Reader, Xlsx};
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::{CloseError, CloseResult};
use crate::utils::money::parse_amount;

const REQUIRED_COLUMNS: [&str; 3] = ["period", "input_vat", "output_vat"];

/// External VAT totals for one month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraMonthlyRow {
    pub period: String,
    pub input_vat: BigDecimal,
    pub output_vat: BigDecimal,
}

impl TraMonthlyRow {
    fn zero(period: &str) -> Self {
        Self {
            period: period.to_string(),
            input_vat: BigDecimal::from(0),
            output_vat: BigDecimal::from(0),
        }
    }
}

/// Monthly VAT table keyed by `YYYY-MM`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraImport {
    source: Option<PathBuf>,
    rows: BTreeMap<String, TraMonthlyRow>,
}

impl TraImport {
    /// An import with no rows; every month reads as zero
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: impl IntoIterator<Item = TraMonthlyRow>) -> Self {
        Self {
            source: None,
            rows: rows
                .into_iter()
                .map(|row| (row.period.clone(), row))
                .collect(),
        }
    }

    /// Read a `.csv` or `.xlsx` extract
    pub fn read(path: &Path) -> CloseResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        let rows = match extension.as_deref() {
            Some("csv") => read_csv(path)?,
            Some("xlsx") => read_xlsx(path)?,
            _ => {
                return Err(CloseError::Validation(
                    "TRA file must be .csv or .xlsx".to_string(),
                ))
            }
        };

        tracing::debug!(file = %path.display(), months = rows.len(), "loaded TRA import");
        Ok(Self {
            source: Some(path.to_path_buf()),
            rows,
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, period: &str) -> Option<&TraMonthlyRow> {
        self.rows.get(period)
    }

    /// Row for the period, or zero totals when the extract has a gap
    pub fn row_or_zero(&self, period: &str) -> TraMonthlyRow {
        self.rows
            .get(period)
            .cloned()
            .unwrap_or_else(|| TraMonthlyRow::zero(period))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn validate_columns<'a>(headers: impl IntoIterator<Item = &'a str>) -> CloseResult<()> {
    let present: Vec<&str> = headers.into_iter().collect();
    if REQUIRED_COLUMNS
        .iter()
        .all(|required| present.contains(required))
    {
        Ok(())
    } else {
        Err(CloseError::Validation(format!(
            "TRA file must include columns: {}",
            REQUIRED_COLUMNS.join(",")
        )))
    }
}

struct ColumnIndex {
    period: usize,
    input_vat: usize,
    output_vat: usize,
}

impl ColumnIndex {
    fn locate(headers: &[String]) -> CloseResult<Self> {
        validate_columns(headers.iter().map(String::as_str))?;
        let position = |name: &str| headers.iter().position(|h| h == name).unwrap_or(usize::MAX);
        Ok(Self {
            period: position("period"),
            input_vat: position("input_vat"),
            output_vat: position("output_vat"),
        })
    }

    fn build_row(&self, cells: &[String], line: usize) -> CloseResult<Option<TraMonthlyRow>> {
        let cell = |idx: usize| cells.get(idx).map(String::as_str).unwrap_or("");
        let period = cell(self.period).trim();
        if period.is_empty() {
            return Ok(None);
        }

        let parse = |column: &str, idx: usize| {
            parse_amount(cell(idx)).map_err(|e| {
                CloseError::Validation(format!("TRA row {line} ({period}) {column}: {e}"))
            })
        };

        Ok(Some(TraMonthlyRow {
            period: period.to_string(),
            input_vat: parse("input_vat", self.input_vat)?,
            output_vat: parse("output_vat", self.output_vat)?,
        }))
    }
}

fn read_csv(path: &Path) -> CloseResult<BTreeMap<String, TraMonthlyRow>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let columns = ColumnIndex::locate(&headers)?;

    let mut monthly = BTreeMap::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let cells: Vec<String> = record.iter().map(str::to_string).collect();
        if let Some(row) = columns.build_row(&cells, idx + 2)? {
            monthly.insert(row.period.clone(), row);
        }
    }
    Ok(monthly)
}

fn csv_error(path: &Path, err: csv::Error) -> CloseError {
    match err.kind() {
        csv::ErrorKind::Io(_) => CloseError::Io(std::io::Error::other(format!(
            "{}: {err}",
            path.display()
        ))),
        _ => CloseError::Validation(format!("TRA file {}: {err}", path.display())),
    }
}

fn read_xlsx(path: &Path) -> CloseResult<BTreeMap<String, TraMonthlyRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .map_err(|e| CloseError::Validation(format!("TRA file {}: {e}", path.display())))?;

    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range
            .map_err(|e| CloseError::Validation(format!("TRA file {}: {e}", path.display())))?,
        None => return Ok(BTreeMap::new()),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_text).collect(),
        None => return Ok(BTreeMap::new()),
    };
    let columns = ColumnIndex::locate(&headers)?;

    let mut monthly = BTreeMap::new();
    for (idx, values) in rows.enumerate() {
        let cells: Vec<String> = values.iter().map(cell_text).collect();
        if let Some(row) = columns.build_row(&cells, idx + 2)? {
            monthly.insert(row.period.clone(), row);
        }
    }
    Ok(monthly)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}
