//! Table query builder

use super::filter::{append_filters, Filter};
use crate::value::Value;
use std::fmt;

/// Join flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        })
    }
}

/// Extra `table.column = value [OR table.column = other]` on a join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub column: String,
    pub value: Value,
    pub or: Option<Value>,
}

/// `<kind> JOIN <table> ON <base>.<primary_column> = <table>.<column>`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub column: String,
    /// Column on the base table; defaults to `column`
    pub primary_column: Option<String>,
    pub and: Option<JoinCondition>,
}

impl Join {
    pub fn new(kind: JoinKind, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            column: column.into(),
            primary_column: None,
            and: None,
        }
    }

    pub fn primary_column(mut self, column: impl Into<String>) -> Self {
        self.primary_column = Some(column.into());
        self
    }

    pub fn and(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and = Some(JoinCondition {
            column: column.into(),
            value: value.into(),
            or: None,
        });
        self
    }

    /// Alternative value for the `and` condition; ignored without one
    pub fn or(mut self, value: impl Into<Value>) -> Self {
        if let Some(cond) = &mut self.and {
            cond.or = Some(value.into());
        }
        self
    }
}

/// SQL text plus its ordered parameters, built up one clause at a time
///
/// ```ignore
/// let query = TableQuery::new("todos")
///     .select(&["id", "name"])
///     .filter(&[Filter::new().eq("id", 10)]);
/// assert_eq!(query.sql(), "SELECT id, name FROM todos WHERE id = $1;");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    table: String,
    sql: String,
    params: Vec<Value>,
}

impl TableQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.sql, self.params)
    }

    /// `SELECT <columns> FROM <table>`; no columns selects `*`
    pub fn select(mut self, columns: &[&str]) -> Self {
        let columns = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        self.sql = format!("SELECT {} FROM {}", columns, self.table);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        let mut extra = String::new();
        if let Some(cond) = join.and {
            self.params.push(cond.value);
            let first = format!("{}.{} = ${}", join.table, cond.column, self.params.len());
            extra = match cond.or {
                Some(other) => {
                    self.params.push(other);
                    format!(
                        " AND ({} OR {}.{} = ${})",
                        first,
                        join.table,
                        cond.column,
                        self.params.len()
                    )
                }
                None => format!(" AND {}", first),
            };
        }

        let primary = join.primary_column.as_deref().unwrap_or(&join.column);
        self.sql.push_str(&format!(
            " {} JOIN {} ON {}.{} = {}.{}{}",
            join.kind, join.table, self.table, primary, join.table, join.column, extra
        ));
        self
    }

    /// Finish a select, update or delete with its WHERE clause
    pub fn filter(mut self, filters: &[Filter]) -> Self {
        append_filters(&mut self.sql, filters, &mut self.params);
        self
    }

    /// Complete `INSERT INTO <table> (...) VALUES (...);`
    pub fn insert<I, C, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: AsRef<str>,
        V: Into<Value>,
    {
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();
        for (column, value) in row {
            self.params.push(value.into());
            columns.push(column.as_ref().to_string());
            placeholders.push(format!("${}", self.params.len()));
        }
        self.sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        self
    }

    /// `UPDATE <table> SET ...`; follow with [`TableQuery::filter`]
    pub fn update<I, C, V>(mut self, set: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: AsRef<str>,
        V: Into<Value>,
    {
        let mut assignments = Vec::new();
        for (column, value) in set {
            self.params.push(value.into());
            assignments.push(format!("{} = ${}", column.as_ref(), self.params.len()));
        }
        self.sql = format!("UPDATE {} SET {}", self.table, assignments.join(", "));
        self
    }

    /// `DELETE FROM <table>`; follow with [`TableQuery::filter`]
    pub fn delete(mut self) -> Self {
        self.sql = format!("DELETE FROM {}", self.table);
        self
    }
}

/// Whether `name` is a plain SQL identifier (letters, digits, underscore; no leading digit)
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        let query = TableQuery::new("todos").select(&[]).filter(&[]);
        assert_eq!(query.sql(), "SELECT * FROM todos;");
        assert!(query.params().is_empty());
    }

    #[test]
    fn test_select_columns_with_filter() {
        let query = TableQuery::new("todos")
            .select(&["id", "name"])
            .filter(&[Filter::new().eq("id", "10")]);
        assert_eq!(query.sql(), "SELECT id, name FROM todos WHERE id = $1;");
        assert_eq!(query.params(), &[Value::Text("10".into())]);
    }

    #[test]
    fn test_insert() {
        let query = TableQuery::new("todos").insert([
            ("id", Value::from("10")),
            ("name", Value::from("milk")),
            ("done", Value::from(false)),
        ]);
        assert_eq!(
            query.sql(),
            "INSERT INTO todos (id, name, done) VALUES ($1, $2, $3);"
        );
        assert_eq!(query.params().len(), 3);
    }

    #[test]
    fn test_update() {
        let (sql, params) = TableQuery::new("todos")
            .update([("done", true), ("archived", false)])
            .filter(&[Filter::new().eq("id", 10)])
            .into_parts();
        assert_eq!(
            sql,
            "UPDATE todos SET done = $1, archived = $2 WHERE id = $3;"
        );
        assert_eq!(params[2], Value::Int(10));
    }

    #[test]
    fn test_delete() {
        let query = TableQuery::new("todos")
            .delete()
            .filter(&[Filter::new().eq("id", 1), Filter::new().eq("id", 2)]);
        assert_eq!(query.sql(), "DELETE FROM todos WHERE id = $1 OR id = $2;");
    }

    #[test]
    fn test_join_with_condition() {
        let query = TableQuery::new("todos")
            .select(&["todos.id", "users.name"])
            .join(
                Join::new(JoinKind::Left, "users", "id")
                    .primary_column("user_id")
                    .and("active", true)
                    .or(Value::Null),
            )
            .filter(&[Filter::new().eq("todos.done", false)]);
        assert_eq!(
            query.sql(),
            "SELECT todos.id, users.name FROM todos LEFT JOIN users ON todos.user_id = users.id \
             AND (users.active = $1 OR users.active = $2) WHERE todos.done = $3;"
        );
        assert_eq!(query.params().len(), 3);
    }

    #[test]
    fn test_join_defaults_primary_column() {
        let query = TableQuery::new("todos")
            .select(&[])
            .join(Join::new(JoinKind::Inner, "tags", "todo_id"))
            .filter(&[]);
        assert_eq!(
            query.sql(),
            "SELECT * FROM todos INNER JOIN tags ON todos.todo_id = tags.todo_id;"
        );
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("todos"));
        assert!(is_identifier("_audit_log2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("todos; DROP TABLE users"));
        assert!(!is_identifier(""));
    }
}
