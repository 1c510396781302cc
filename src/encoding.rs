//! Binary encoding of scraped options tables.
//!
//! A scraped table is stored as a JSON document:
//!
//! ```text
//! {
//!   "Last Trade Date": ["2020-05-01 3:59PM EDT", ...],   one per row
//!   "Column Labels":   ["Strike", "Last Price", ...],    numeric columns only
//!   "Shape":           base64(int32 LE [rows, cols]),
//!   "Table":           base64(float16 LE [rows * cols]), row-major
//! }
//! ```
//!
//! The `Contract Name` column is dropped and `Last Trade Date` is kept as
//! text. Every other cell is coerced to a number and quantized to half
//! precision. Empty cells and bare dashes become NaN.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;
use crate::types::Side;

/// Column dropped before encoding
pub const CONTRACT_NAME_COLUMN: &str = "Contract Name";

/// Column carried as text beside the numeric matrix
pub const LAST_TRADE_DATE_COLUMN: &str = "Last Trade Date";

/// A table as scraped: header labels and rows of cell text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawTable {
    /// Header labels, in page order
    pub columns: Vec<String>,
    /// Cell text, one vector per row
    pub rows: Vec<Vec<String>>,
}

/// The calls and puts tables of one expiration page; either may be absent
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawChainTables {
    /// First table on the page
    pub calls: Option<RawTable>,
    /// Second table on the page
    pub puts: Option<RawTable>,
}

impl RawChainTables {
    /// The table for `side`, if present
    pub fn side(&self, side: Side) -> Option<&RawTable> {
        match side {
            Side::Calls => self.calls.as_ref(),
            Side::Puts => self.puts.as_ref(),
        }
    }

    /// Whether neither side is present
    pub fn is_empty(&self) -> bool {
        self.calls.is_none() && self.puts.is_none()
    }
}

/// Coerce one cell to a number
///
/// Thousands separators, a trailing `%` and a leading `+` or `$` are
/// stripped; an empty cell or a bare `-` is NaN. Returns `None` when the
/// remainder is not a number.
pub fn parse_cell(cell: &str) -> Option<f32> {
    let cleaned: String = cell.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return Some(f32::NAN);
    }
    let cleaned = cleaned.strip_suffix('%').unwrap_or(&cleaned);
    let cleaned = cleaned.strip_prefix('+').unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix('$').unwrap_or(cleaned);
    cleaned.parse::<f32>().ok()
}

/// Persisted form of one side of a chain
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedTable {
    /// Last trade timestamps as scraped, one per row
    #[serde(rename = "Last Trade Date")]
    pub last_trade_date: Vec<String>,
    /// Labels of the numeric columns
    #[serde(rename = "Column Labels")]
    pub column_labels: Vec<String>,
    /// base64 of `[rows, cols]` as little-endian int32
    #[serde(rename = "Shape")]
    pub shape: String,
    /// base64 of the row-major matrix as little-endian float16
    #[serde(rename = "Table")]
    pub table: String,
}

impl EncodedTable {
    /// Encode a scraped table
    pub fn encode(raw: &RawTable) -> Result<Self, EncodeError> {
        let width = raw.columns.len();
        let date_idx = raw
            .columns
            .iter()
            .position(|c| c == LAST_TRADE_DATE_COLUMN)
            .ok_or_else(|| EncodeError::MissingColumn(LAST_TRADE_DATE_COLUMN.to_string()))?;
        let name_idx = raw.columns.iter().position(|c| c == CONTRACT_NAME_COLUMN);

        let numeric: Vec<usize> = (0..width)
            .filter(|idx| *idx != date_idx && Some(*idx) != name_idx)
            .collect();
        let column_labels: Vec<String> =
            numeric.iter().map(|idx| raw.columns[*idx].clone()).collect();

        let mut last_trade_date = Vec::with_capacity(raw.rows.len());
        let mut matrix = Vec::with_capacity(raw.rows.len() * numeric.len() * 2);
        for (row_idx, row) in raw.rows.iter().enumerate() {
            if row.len() != width {
                return Err(EncodeError::RaggedRow {
                    row: row_idx,
                    expected: width,
                    found: row.len(),
                });
            }
            last_trade_date.push(row[date_idx].clone());
            for idx in &numeric {
                let value = parse_cell(&row[*idx]).ok_or_else(|| EncodeError::MalformedCell {
                    row: row_idx,
                    column: raw.columns[*idx].clone(),
                    value: row[*idx].clone(),
                })?;
                matrix.extend_from_slice(&f16::from_f32(value).to_le_bytes());
            }
        }

        let rows = to_i32(raw.rows.len())?;
        let cols = to_i32(numeric.len())?;
        let mut shape = Vec::with_capacity(8);
        shape.extend_from_slice(&rows.to_le_bytes());
        shape.extend_from_slice(&cols.to_le_bytes());

        Ok(Self {
            last_trade_date,
            column_labels,
            shape: STANDARD.encode(shape),
            table: STANDARD.encode(matrix),
        })
    }

    /// Serialize to the stored JSON document
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stored JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Decode the `(rows, cols)` shape
    pub fn shape(&self) -> Result<(usize, usize), EncodeError> {
        let bytes = STANDARD.decode(&self.shape)?;
        if bytes.len() != 8 {
            return Err(EncodeError::InvalidShape(format!(
                "expected 8 bytes, found {}",
                bytes.len()
            )));
        }
        let rows = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let cols = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let rows = usize::try_from(rows)
            .map_err(|_| EncodeError::InvalidShape(format!("negative row count {}", rows)))?;
        let cols = usize::try_from(cols)
            .map_err(|_| EncodeError::InvalidShape(format!("negative column count {}", cols)))?;
        Ok((rows, cols))
    }

    /// Decode back to a numeric matrix
    pub fn decode(&self) -> Result<DecodedTable, EncodeError> {
        let (rows, cols) = self.shape()?;
        let bytes = STANDARD.decode(&self.table)?;
        if bytes.len() % 2 != 0 || bytes.len() / 2 != rows * cols {
            return Err(EncodeError::ShapeMismatch {
                expected: rows * cols,
                found: bytes.len() / 2,
            });
        }
        if self.column_labels.len() != cols {
            return Err(EncodeError::ShapeMismatch {
                expected: cols,
                found: self.column_labels.len(),
            });
        }
        let values = bytes
            .chunks_exact(2)
            .map(|pair| f16::from_le_bytes([pair[0], pair[1]]).to_f32())
            .collect();

        Ok(DecodedTable {
            last_trade_date: self.last_trade_date.clone(),
            column_labels: self.column_labels.clone(),
            rows,
            cols,
            values,
        })
    }
}

fn to_i32(n: usize) -> Result<i32, EncodeError> {
    i32::try_from(n).map_err(|_| EncodeError::InvalidShape(format!("dimension {} exceeds int32", n)))
}

/// A decoded table: row-major values with their labels
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTable {
    /// Last trade timestamps, one per row
    pub last_trade_date: Vec<String>,
    /// Labels of the numeric columns
    pub column_labels: Vec<String>,
    /// Number of rows
    pub rows: usize,
    /// Number of numeric columns
    pub cols: usize,
    /// Row-major values, `rows * cols` long
    pub values: Vec<f32>,
}

impl DecodedTable {
    /// Value at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.values.get(row * self.cols + col).copied()
    }

    /// All values of the column labelled `label`
    pub fn column(&self, label: &str) -> Option<Vec<f32>> {
        let col = self.column_labels.iter().position(|l| l == label)?;
        Some((0..self.rows).filter_map(|row| self.get(row, col)).collect())
    }
}
