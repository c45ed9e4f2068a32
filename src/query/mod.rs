//! Query builder
//!
//! Produces parameterized SQL text (`$1`, `$2`, ...) and the matching ordered
//! parameter list. Execute the result with [`Pool::execute`](crate::Pool::execute)
//! or through a prepared handle.

mod filter;
mod table;

pub use filter::Filter;
pub use table::{is_identifier, Join, JoinCondition, JoinKind, TableQuery};
