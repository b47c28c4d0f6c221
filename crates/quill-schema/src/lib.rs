//! Typed table schema declarations and DDL emission.
//!
//! A [`TableSpec`] is an ordered list of named, codec-carrying columns with
//! primary-key / uniqueness / default / nullability flags. A [`Schema`] is
//! an ordered set of tables. Declaration validates invariants up front;
//! [`Schema::ddl`] renders `CREATE TABLE` statements in declaration order.

mod column;
mod ddl;
mod table;

pub use column::{Column, ColumnSpec};
pub use ddl::DdlOptions;
pub use table::{Schema, TableSpec};
