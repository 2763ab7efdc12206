//! Report writers: JSON, CSV, XLSX and HTML artifacts

use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::types::{CloseError, CloseResult};

/// Rows flattened to a sorted union of column names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl Table {
    /// Build from serializable records; each must serialize to a JSON object
    pub fn from_rows<T: Serialize>(records: &[T]) -> CloseResult<Self> {
        let mut columns = BTreeSet::new();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            match to_json(record)? {
                Value::Object(map) => {
                    columns.extend(map.keys().cloned());
                    rows.push(map);
                }
                other => {
                    return Err(CloseError::Report(format!(
                        "table rows must be objects, got {other}"
                    )))
                }
            }
        }
        Ok(Self {
            columns: columns.into_iter().collect(),
            rows,
        })
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

    /// Cell text for every row, in column order
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(|col| cell_text(row.get(col)))
                .collect()
        })
    }
}

/// Flat text for a cell; nested values become compact JSON
fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> CloseResult<Value> {
    serde_json::to_value(value).map_err(|e| CloseError::Report(e.to_string()))
}

fn ensure_parent(path: &Path) -> CloseResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Pretty-printed JSON document
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> CloseResult<()> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value).map_err(|e| CloseError::Report(e.to_string()))?;
    fs::write(path, text)?;
    tracing::debug!(file = %path.display(), "wrote json");
    Ok(())
}

pub fn write_csv(table: &Table, path: &Path) -> CloseResult<()> {
    ensure_parent(path)?;
    let report_err = |e: csv::Error| CloseError::Report(format!("{}: {e}", path.display()));

    if table.columns().is_empty() {
        fs::write(path, "")?;
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    writer.write_record(table.columns()).map_err(report_err)?;
    for record in table.records() {
        writer.write_record(&record).map_err(report_err)?;
    }
    writer.flush()?;
    tracing::debug!(file = %path.display(), rows = table.len(), "wrote csv");
    Ok(())
}

/// Single-worksheet workbook with a bold header row
pub fn write_xlsx(table: &Table, sheet_name: &str, path: &Path) -> CloseResult<()> {
    ensure_parent(path)?;
    let report_err =
        |e: rust_xlsxwriter::XlsxError| CloseError::Report(format!("{}: {e}", path.display()));

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name).map_err(report_err)?;

    for (col, name) in table.columns().iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, name, &header)
            .map_err(report_err)?;
    }
    for (row, record) in table.records().enumerate() {
        for (col, text) in record.iter().enumerate() {
            worksheet
                .write_string(row as u32 + 1, col as u16, text)
                .map_err(report_err)?;
        }
    }

    workbook.save(path).map_err(report_err)?;
    tracing::debug!(file = %path.display(), rows = table.len(), "wrote xlsx");
    Ok(())
}

/// A titled page with each section rendered as escaped pretty JSON
pub fn write_html(title: &str, sections: &[(&str, Value)], path: &Path) -> CloseResult<()> {
    ensure_parent(path)?;
    let mut body = vec![
        "<html><body>".to_string(),
        format!("<h1>{}</h1>", escape_html(title)),
    ];
    for (heading, value) in sections {
        let pretty =
            serde_json::to_string_pretty(value).map_err(|e| CloseError::Report(e.to_string()))?;
        body.push(format!("<h2>{}</h2>", escape_html(heading)));
        body.push(format!("<pre>{}</pre>", escape_html(&pretty)));
    }
    body.push("</body></html>".to_string());

    fs::write(path, body.join("\n"))?;
    tracing::debug!(file = %path.display(), "wrote html");
    Ok(())
}

/// Serialize a section for [`write_html`]
pub fn section<T: Serialize + ?Sized>(value: &T) -> CloseResult<Value> {
    to_json(value)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
