//! WHERE-clause filters

use crate::value::Value;

/// One conjunction of conditions
///
/// Terms inside a filter are joined with `AND`; several filters passed together
/// are joined with `OR`. Column names are written as given, so a joined query
/// can use `table.column`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    terms: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Eq(String, Value),
    IsNull(String),
    IsNotNull(String),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = $n`
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(Term::Eq(column.into(), value.into()));
        self
    }

    /// `column IS NULL`
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.terms.push(Term::IsNull(column.into()));
        self
    }

    /// `column IS NOT NULL`
    pub fn is_not_null(mut self, column: impl Into<String>) -> Self {
        self.terms.push(Term::IsNotNull(column.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Append ` WHERE ...;` (or just `;`) to `sql`, pushing bound values onto `params`
pub(crate) fn append_filters(sql: &mut String, filters: &[Filter], params: &mut Vec<Value>) {
    let mut groups = Vec::new();

    for filter in filters.iter().filter(|f| !f.is_empty()) {
        let mut conditions = Vec::with_capacity(filter.terms.len());
        for term in &filter.terms {
            match term {
                Term::Eq(column, value) => {
                    params.push(value.clone());
                    conditions.push(format!("{} = ${}", column, params.len()));
                }
                Term::IsNull(column) => conditions.push(format!("{} IS NULL", column)),
                Term::IsNotNull(column) => conditions.push(format!("{} IS NOT NULL", column)),
            }
        }
        groups.push(conditions.join(" AND "));
    }

    // AND binds tighter than OR, so no parentheses are needed
    if !groups.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&groups.join(" OR "));
    }
    sql.push(';');
}
