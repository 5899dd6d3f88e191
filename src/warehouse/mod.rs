// src/warehouse/mod.rs

//! Narrow interface to the warehouse.
//!
//! The engine and executors only ever see [`WarehouseClient`]; connection
//! handling, dialect and credentials live behind it. [`postgres`] provides an
//! adapter for warehouses speaking the Postgres wire protocol.

pub mod postgres;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::errors::WarehouseError;

pub use postgres::PostgresWarehouse;

/// A single cell returned by the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric cell greater than zero. `true` counts as 1; text and NULL are
    /// never positive.
    pub fn is_positive(&self) -> bool {
        match self {
            Value::Int(v) => *v > 0,
            Value::Float(v) => *v > 0.0,
            Value::Bool(v) => *v,
            Value::Null | Value::Text(_) => false,
        }
    }

    /// Parse a textual cell the way the simple query protocol delivers it.
    pub fn from_text(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Value::Null;
        };
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Int(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Value::Float(v);
        }
        match raw {
            "t" | "true" => Value::Bool(true),
            "f" | "false" => Value::Bool(false),
            other => Value::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Column names plus rows of cells, as returned by [`WarehouseClient::execute`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Result of a statement that produces no rows (DDL, INSERT, ...).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.push_row(row);
        self
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate `(column, value)` pairs of the first row, if any.
    pub fn first_row(&self) -> Option<impl Iterator<Item = (&str, &Value)>> {
        let row = self.rows.first()?;
        Some(self.columns.iter().map(String::as_str).zip(row.iter()))
    }
}

/// How a bulk load treats existing rows in the target relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Existing rows are removed in the same transaction as the load.
    #[default]
    Replace,
    Append,
}

/// Everything the warehouse needs to copy external data into a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoadRequest {
    pub source: String,
    pub target: String,
    /// Format clause, e.g. `JSON 's3://bucket/jsonpaths.json'`.
    pub format: Option<String>,
    pub mode: LoadMode,
    pub iam_role: Option<String>,
}

pub type WarehouseFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, WarehouseError>> + Send + 'a>>;

/// The warehouse as seen by executors.
///
/// Implementations must be shareable across concurrently running tasks.
pub trait WarehouseClient: Send + Sync {
    /// Run a statement and return whatever rows it produced.
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, RowSet>;

    /// Load data from an external location into `request.target`.
    ///
    /// Must return an error (never a partial success) when the source is
    /// unreachable or the warehouse rejects the load.
    fn bulk_load<'a>(&'a self, request: &'a BulkLoadRequest) -> WarehouseFuture<'a, ()>;
}
