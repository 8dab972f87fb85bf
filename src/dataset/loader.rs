//! CSV loader for model-ready tabular exports.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Dataset, FeatureMatrix};

/// Cell values read as missing, compared case-insensitively.
const MISSING_TOKENS: [&str; 5] = ["", "na", "nan", "null", "n/a"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
    #[error("dataset has no feature columns besides {0}")]
    NoFeatures(String),
    #[error("dataset has no rows")]
    Empty,
    #[error("line {line}, column {column}: cannot parse {value:?} as a number")]
    InvalidFeature {
        line: u64,
        column: String,
        value: String,
    },
    #[error("line {line}: invalid label {value:?} in column {column}")]
    InvalidLabel {
        line: u64,
        column: String,
        value: String,
    },
}

/// Load a headed CSV file, splitting `target` off as the label column.
pub fn load_csv(path: &Path, target: &str) -> Result<Dataset, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file, target)
}

/// Parse headed CSV from any reader. See [`load_csv`].
pub fn read_csv<R: Read>(reader: R, target: &str) -> Result<Dataset, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let mut seen = HashSet::new();
    for name in headers.iter() {
        if !seen.insert(name) {
            return Err(DatasetError::DuplicateColumn(name.to_string()));
        }
    }
    let target_idx = headers
        .iter()
        .position(|name| name == target)
        .ok_or_else(|| DatasetError::ColumnNotFound(target.to_string()))?;
    let feature_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != target_idx)
        .map(|(_, name)| name.to_string())
        .collect();
    if feature_names.is_empty() {
        return Err(DatasetError::NoFeatures(target.to_string()));
    }

    let mut features = FeatureMatrix::with_columns(feature_names.len());
    let mut labels = Vec::new();
    let mut row = Vec::with_capacity(feature_names.len());
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|pos| pos.line())
            .unwrap_or(idx as u64 + 2);
        row.clear();
        for (col_idx, cell) in record.iter().enumerate() {
            if col_idx == target_idx {
                let label = parse_label(cell).ok_or_else(|| DatasetError::InvalidLabel {
                    line,
                    column: target.to_string(),
                    value: cell.to_string(),
                })?;
                labels.push(label);
            } else {
                let value = parse_feature(cell).ok_or_else(|| DatasetError::InvalidFeature {
                    line,
                    column: headers.get(col_idx).unwrap_or_default().to_string(),
                    value: cell.to_string(),
                })?;
                row.push(value);
            }
        }
        features.push_row(&row);
    }
    if labels.is_empty() {
        return Err(DatasetError::Empty);
    }

    Ok(Dataset {
        feature_names,
        target: target.to_string(),
        features,
        labels,
    })
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS
        .iter()
        .any(|token| cell.eq_ignore_ascii_case(token))
}

fn parse_feature(cell: &str) -> Option<f32> {
    if is_missing(cell) {
        return Some(f32::NAN);
    }
    if cell.eq_ignore_ascii_case("true") {
        return Some(1.0);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Some(0.0);
    }
    cell.parse::<f32>().ok()
}

fn parse_label(cell: &str) -> Option<i64> {
    if is_missing(cell) {
        return None;
    }
    let value = cell.parse::<f64>().ok()?;
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    Some(value as i64)
}
