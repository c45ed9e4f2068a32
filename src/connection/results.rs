//! Result accumulator

use crate::error::{Error, Result};
use crate::protocol::FieldDescription;
use crate::value::{ResultType, Row, Value};
use bytes::Bytes;
use serde::Serialize;

/// Rows and metadata collected for one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names, in order
    pub fields: Vec<String>,
    /// Column types, parallel to `fields`
    #[serde(skip)]
    pub types: Vec<ResultType>,
    /// Decoded rows
    pub rows: Vec<Row>,
    /// Command tag (e.g. `INSERT 0 1`)
    pub status: String,
}

impl ResultSet {
    /// Record the columns of a RowDescription
    pub fn describe(&mut self, fields: &[FieldDescription]) -> Result<()> {
        for field in fields {
            let ty = ResultType::from_oid(field.type_oid).ok_or_else(|| {
                Error::Protocol(format!(
                    "column {:?} has unsupported type oid {}",
                    field.name, field.type_oid
                ))
            })?;
            self.fields.push(field.name.clone());
            self.types.push(ty);
        }
        Ok(())
    }

    /// Decode a DataRow against the recorded columns
    pub fn push_row(&mut self, columns: &[Option<Bytes>]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }

        let mut row = Row::new();
        for (i, column) in columns.iter().enumerate() {
            let (name, ty) = match (self.fields.get(i), self.types.get(i)) {
                (Some(name), Some(ty)) => (name, *ty),
                _ => {
                    return Err(Error::Protocol(format!(
                        "data row has {} columns but only {} were described",
                        columns.len(),
                        self.fields.len()
                    )))
                }
            };

            let value = match column {
                None => Value::Null,
                Some(raw) => {
                    let text = std::str::from_utf8(raw).map_err(|e| {
                        Error::Protocol(format!("column {:?} is not valid UTF-8: {}", name, e))
                    })?;
                    ty.decode(text)?
                }
            };
            row.set(name, value);
        }

        self.rows.push(row);
        Ok(())
    }

    /// Number of rows the command reported, parsed from the command tag
    pub fn rows_affected(&self) -> Option<u64> {
        self.status.rsplit(' ').next()?.parse().ok()
    }

    /// Hand the accumulated results over and start fresh
    pub fn take(&mut self) -> ResultSet {
        std::mem::take(self)
    }
}
