//! Dataset files (CSV or JSON) loaded into structured records.

use async_trait::async_trait;
use riskscan_core::{DatasetError, DatasetRef, DatasetSource, Record, RecordRow};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self, DatasetError> {
        let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Format::Csv),
            Some("json") => Ok(Format::Json),
            _ => Err(DatasetError::Unsupported(path.display().to_string())),
        }
    }
}

/// Reads datasets from the local filesystem; the reference locator is a path.
#[derive(Debug, Default, Clone)]
pub struct FileDatasetSource;

#[async_trait]
impl DatasetSource for FileDatasetSource {
    async fn load(&self, reference: &DatasetRef) -> Result<Vec<RecordRow>, DatasetError> {
        let path = PathBuf::from(&reference.locator);
        let format = Format::from_path(&path)?;
        let rows = tokio::task::spawn_blocking(move || load_path(&path, format))
            .await
            .map_err(|e| DatasetError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;
        let bad = rows.iter().filter(|r| r.is_err()).count();
        debug!(locator = %reference.locator, rows = rows.len(), bad, "dataset loaded");
        Ok(rows)
    }
}

pub fn load_path(path: &Path, format: Format) -> Result<Vec<RecordRow>, DatasetError> {
    let file = std::fs::File::open(path)?;
    match format {
        Format::Csv => parse_csv(file),
        Format::Json => {
            let mut text = String::new();
            std::io::BufReader::new(file).read_to_string(&mut text)?;
            parse_json(&text)
        }
    }
}

/// Header row names the fields; each cell is typed as integer, float, bool, or string.
///
/// A row with the wrong number of fields is kept as a `Malformed` entry.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RecordRow>, DatasetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers().map_err(malformed)?.clone();
    if headers.is_empty() {
        return Err(DatasetError::Malformed("missing header row".into()));
    }
    let mut out = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(DatasetError::Io(e.into())),
            Err(e) => {
                out.push(Err(malformed(e)));
                continue;
            }
        };
        if row.len() != headers.len() {
            out.push(Err(DatasetError::Malformed(format!(
                "row {}: expected {} fields, found {}",
                i + 1,
                headers.len(),
                row.len()
            ))));
            continue;
        }
        let mut rec = Record::new();
        for (name, cell) in headers.iter().zip(row.iter()) {
            rec.insert(name.to_string(), typed_cell(cell));
        }
        out.push(Ok(rec));
    }
    Ok(out)
}

/// An array of objects, or an object holding that array under `records` or `data`.
pub fn parse_json(text: &str) -> Result<Vec<RecordRow>, DatasetError> {
    let v: Value = serde_json::from_str(text).map_err(malformed)?;
    let rows = match v {
        Value::Array(rows) => rows,
        Value::Object(mut obj) => match obj.remove("records").or_else(|| obj.remove("data")) {
            Some(Value::Array(rows)) => rows,
            _ => return Err(DatasetError::Malformed("expected an array of records".into())),
        },
        _ => return Err(DatasetError::Malformed("expected an array of records".into())),
    };
    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| match row {
            Value::Object(rec) => Ok(rec),
            other => {
                Err(DatasetError::Malformed(format!("row {} is not an object: {}", i + 1, other)))
            }
        })
        .collect();
    Ok(rows)
}

fn typed_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

fn malformed(e: impl std::fmt::Display) -> DatasetError {
    DatasetError::Malformed(e.to_string())
}
