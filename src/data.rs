//! Dataset loading and cleaning using Polars
//!
//! Cleaning is a chain of explicit steps, each taking the previous
//! step's output by reference: parse the temporal columns, one-hot encode
//! the categorical columns, restrict to the numeric allow-list and fill
//! missing values with zero.

use crate::error::{PortfolioError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

pub const CUSTOMER_ID: &str = "Customer_ID";
pub const CHURN_LABEL: &str = "Churn_Label";
pub const CHURN_TIMEFRAME: &str = "Churn_Timeframe";
pub const AGE: &str = "Age";
pub const ACCOUNT_BALANCE: &str = "Account_Balance";
pub const LOAN_AMOUNT: &str = "Loan_Amount";
pub const CREDIT_SCORE: &str = "Credit_Score";
pub const ANNUAL_INCOME: &str = "Annual_Income";

/// Date-valued columns parsed into timestamps
pub const TEMPORAL_COLUMNS: [&str; 3] = [
    "Transaction_Date",
    "Account_Open_Date",
    "Last_Transaction_Date",
];

/// Categorical columns expanded into indicator columns
pub const CATEGORICAL_COLUMNS: [&str; 5] = [
    "Gender",
    "Account_Type",
    "Loan_Type",
    "Region",
    "Marital_Status",
];

/// Numeric and label columns kept for analysis, in output order
pub const ALLOW_LIST: [&str; 11] = [
    AGE,
    ACCOUNT_BALANCE,
    "Transaction_Amount",
    LOAN_AMOUNT,
    CREDIT_SCORE,
    ANNUAL_INCOME,
    "Customer_Service_Interactions",
    "Recent_Complaints",
    "Customer_Satisfaction_Score",
    CHURN_LABEL,
    CHURN_TIMEFRAME,
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Options controlling the cleaning chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningOptions {
    /// Append the indicator columns after the allow-list instead of
    /// discarding them. Off by default: the allow-list restriction is
    /// applied by column name and drops every indicator column.
    pub retain_indicators: bool,
}

/// A parsed date column. Empty cells are missing timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalColumn {
    pub name: String,
    pub values: Vec<Option<NaiveDateTime>>,
}

/// Binary indicator for one observed value of a categorical variable
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorColumn {
    /// `<Variable>_<Value>`, e.g. `Gender_Female`
    pub name: String,
    pub values: Vec<bool>,
}

/// A numeric column that may still contain missing values
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// What the cleaning chain did to the input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningSummary {
    pub rows: usize,
    /// Missing-value count per input column, before filling
    pub null_counts: Vec<(String, usize)>,
    /// Temporal columns that parsed successfully
    pub temporal_columns: Vec<String>,
    /// Indicator columns produced by one-hot encoding
    pub indicator_columns: Vec<String>,
    /// Indicator columns dropped by the allow-list restriction
    pub discarded_indicators: Vec<String>,
}

/// Analysis-ready table: named, row-aligned `f64` columns
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedDataset {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl CleanedDataset {
    /// Build from a row-major matrix whose columns follow `columns`
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(PortfolioError::Schema(format!(
                "{} column names for {} value columns",
                columns.len(),
                values.ncols()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Build from named, equally long columns
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map_or(0, |(_, values)| values.len());
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != n_rows) {
            return Err(PortfolioError::Schema(format!(
                "column {name} has {} rows, expected {n_rows}",
                values.len()
            )));
        }

        let col_refs: Vec<&[f64]> = columns.iter().map(|(_, v)| v.as_slice()).collect();
        let values = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| col_refs[c][r]);
        let names = columns.into_iter().map(|(name, _)| name).collect();
        Self::new(names, values)
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.position(name).map(|idx| self.values.column(idx))
    }

    /// Like [`column`](Self::column) but a missing column is a schema error
    pub fn require(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        self.column(name)
            .ok_or_else(|| PortfolioError::missing_column(name))
    }
}

/// Read the raw CSV into a DataFrame
pub fn load_raw(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| PortfolioError::load(path, e))?;

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| PortfolioError::load(path, e))
}

/// Load a CSV file and run the full cleaning chain over it
pub fn load_and_clean(
    path: &Path,
    options: &CleaningOptions,
) -> Result<(CleanedDataset, CleaningSummary)> {
    let df = load_raw(path)?;
    tracing::info!(path = %path.display(), rows = df.height(), columns = df.width(), "dataset loaded");
    clean_dataset(&df, options)
}

/// Run the cleaning chain over an in-memory frame
pub fn clean_dataset(
    df: &DataFrame,
    options: &CleaningOptions,
) -> Result<(CleanedDataset, CleaningSummary)> {
    let temporal = parse_temporal_columns(df)?;
    let indicators = encode_categoricals(df)?;

    let null_counts = null_counts(df);
    for (name, count) in &null_counts {
        tracing::debug!(column = %name, nulls = count, "missing values");
    }

    let restricted = restrict_to_allow_list(df, &indicators, options)?;
    let dataset = fill_missing(restricted)?;

    let indicator_columns: Vec<String> = indicators.iter().map(|c| c.name.clone()).collect();
    let discarded_indicators = if options.retain_indicators {
        Vec::new()
    } else {
        indicator_columns.clone()
    };
    if !discarded_indicators.is_empty() {
        tracing::warn!(
            count = discarded_indicators.len(),
            "indicator columns discarded by the allow-list restriction"
        );
    }

    let summary = CleaningSummary {
        rows: dataset.n_rows(),
        null_counts,
        temporal_columns: temporal.into_iter().map(|c| c.name).collect(),
        indicator_columns,
        discarded_indicators,
    };

    Ok((dataset, summary))
}

/// Parse the three date columns into timestamps
pub fn parse_temporal_columns(df: &DataFrame) -> Result<Vec<TemporalColumn>> {
    TEMPORAL_COLUMNS
        .iter()
        .map(|&name| {
            let values = string_values(df, name)?
                .into_iter()
                .enumerate()
                .map(|(row, cell)| match cell {
                    None => Ok(None),
                    Some(raw) if raw.trim().is_empty() => Ok(None),
                    Some(raw) => parse_timestamp(&raw).map(Some).ok_or(PortfolioError::Parse {
                        column: name.to_string(),
                        row,
                        value: raw,
                    }),
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(TemporalColumn {
                name: name.to_string(),
                values,
            })
        })
        .collect()
}

/// Parse a single date or datetime string
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// One-hot encode the categorical columns.
///
/// One indicator per distinct observed value, sorted within each
/// variable, so the resulting schema depends on the data.
pub fn encode_categoricals(df: &DataFrame) -> Result<Vec<IndicatorColumn>> {
    let mut indicators = Vec::new();

    for &variable in &CATEGORICAL_COLUMNS {
        let cells = string_values(df, variable)?;
        let levels: BTreeSet<&str> = cells.iter().flatten().map(String::as_str).collect();

        for level in levels {
            indicators.push(IndicatorColumn {
                name: format!("{variable}_{level}"),
                values: cells.iter().map(|c| c.as_deref() == Some(level)).collect(),
            });
        }
    }

    Ok(indicators)
}

/// Keep only the allow-list columns, cast to `f64`.
///
/// The indicator columns are appended only when
/// `options.retain_indicators` is set; by default they are dropped here.
pub fn restrict_to_allow_list(
    df: &DataFrame,
    indicators: &[IndicatorColumn],
    options: &CleaningOptions,
) -> Result<Vec<NumericColumn>> {
    let mut columns = ALLOW_LIST
        .iter()
        .map(|&name| {
            Ok(NumericColumn {
                name: name.to_string(),
                values: numeric_values(df, name)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if options.retain_indicators {
        columns.extend(indicators.iter().map(|indicator| NumericColumn {
            name: indicator.name.clone(),
            values: indicator
                .values
                .iter()
                .map(|&set| Some(if set { 1.0 } else { 0.0 }))
                .collect(),
        }));
    }

    Ok(columns)
}

/// Replace every missing value with zero
pub fn fill_missing(columns: Vec<NumericColumn>) -> Result<CleanedDataset> {
    CleanedDataset::from_columns(
        columns
            .into_iter()
            .map(|column| {
                let values = column.values.into_iter().map(|v| v.unwrap_or(0.0)).collect();
                (column.name, values)
            })
            .collect(),
    )
}

fn null_counts(df: &DataFrame) -> Vec<(String, usize)> {
    df.get_columns()
        .iter()
        .map(|column| (column.name().to_string(), column.null_count()))
        .collect()
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PortfolioError::missing_column(name))?;
    let casted = column.cast(&DataType::String)?;
    let values = casted
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|cell| cell.map(str::to_string))
        .collect();
    Ok(values)
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PortfolioError::missing_column(name))?;
    let casted = column.cast(&DataType::Float64)?;
    let values: Vec<Option<f64>> = casted.as_materialized_series().f64()?.into_iter().collect();

    // A non-strict cast turns unparseable cells into nulls.
    if casted.null_count() > column.null_count() {
        let raw = string_values(df, name)?;
        let rejected = raw
            .into_iter()
            .zip(&values)
            .enumerate()
            .find_map(|(row, (cell, value))| match (cell, value) {
                (Some(cell), None) => Some((row, cell)),
                _ => None,
            });
        if let Some((row, value)) = rejected {
            return Err(PortfolioError::Parse {
                column: name.to_string(),
                row,
                value,
            });
        }
    }

    Ok(values)
}
