//! SQL emission for quill.
//!
//! [`Emitter`] walks a query tree and produces an [`Operation`]: SQL text,
//! an ordered named-parameter map, and a result-reconstruction plan.
//! Derived queries referenced more than once (or promoted, or used as
//! subquery predicates) are hoisted into `WITH` common table expressions;
//! join aliases are rewritten to fresh `t_*` identifiers.
//!
//! Emission is stateless beyond the id generator: re-emitting the same tree
//! with the same generator state yields byte-identical output.

mod dml;
mod emit;
mod op;
mod sqlfmt;

pub use emit::{Emitter, QueryExt};
pub use op::{Operation, OperationKind, Params};
pub use sqlfmt::format_sql;
