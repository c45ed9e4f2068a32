//! Prepared-statement handle

use super::lifecycle::{Pool, QueryResults};
use crate::protocol::BindValue;
use crate::query::TableQuery;
use crate::value::Value;
use crate::Result;

/// Name and fixed inputs of a prepared statement
#[derive(Debug, Clone, PartialEq)]
pub struct PrepareOptions {
    /// Statement name, reused on every socket that has parsed it
    pub name: String,
    /// Values bound on every execution, overriding per-call values
    pub values: Option<Vec<Value>>,
    /// Parameter type OIDs; empty lets the server infer them
    pub types: Vec<u32>,
}

impl PrepareOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: None,
            types: Vec::new(),
        }
    }

    pub fn values(mut self, values: Vec<Value>) -> Self {
        self.values = Some(values);
        self
    }

    pub fn types(mut self, types: Vec<u32>) -> Self {
        self.types = types;
        self
    }
}

impl From<&str> for PrepareOptions {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PrepareOptions {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A pool paired with a statement name
///
/// The first execution on a socket parses the statement; later executions on
/// the same socket only bind and execute it.
#[derive(Debug, Clone)]
pub struct Prepared {
    pool: Pool,
    options: PrepareOptions,
}

impl Prepared {
    pub(crate) fn new(pool: Pool, options: PrepareOptions) -> Self {
        Self { pool, options }
    }

    pub fn options(&self) -> &PrepareOptions {
        &self.options
    }

    /// Execute `sql` with `params` (or the fixed values, when set)
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResults> {
        self.pool.run_prepared(&self.options, sql, params).await
    }

    /// Execute a built table query under this statement name
    pub async fn execute(&self, query: TableQuery) -> Result<QueryResults> {
        let (sql, params) = query.into_parts();
        self.pool.run_prepared(&self.options, &sql, &params).await
    }
}

/// Convert parameters to their Bind representation
///
/// Null binds as SQL NULL and bytes bind in binary format; everything else is
/// sent as text.
pub fn bind_values(values: &[Value]) -> Vec<BindValue> {
    values
        .iter()
        .map(|value| match value {
            Value::Null => BindValue::Null,
            Value::Bytes(b) => BindValue::Binary(b.clone()),
            Value::Text(s) => BindValue::Text(s.clone()),
            other => BindValue::Text(other.to_string()),
        })
        .collect()
}
