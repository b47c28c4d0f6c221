//! Expression and query tree types for quill.
//!
//! This crate defines the immutable trees the builder constructs and the
//! emitter lowers: the expression algebra ([`Expr`]), the query algebra
//! ([`Query`] with identity-tracked sharing), the result-reconstruction
//! plan ([`Plan`]), and the alias/CTE id generator ([`IdGen`]).
//!
//! Values here are deeply immutable; every builder operation returns a
//! fresh value. Sharing a derived query between two call sites (a join and
//! a subquery predicate, say) is expressed by cloning it — clones keep the
//! same [`QueryId`], which is what the emitter's CTE hoisting keys on.

mod bag;
mod expr;
mod ident;
mod plan;
mod query;

pub use bag::ColumnBag;
pub use expr::{AggregateFn, BinaryOp, Expr, Qualifier, UnaryOp};
pub use ident::IdGen;
pub use plan::{Cardinality, JsonShape, Plan};
pub use query::{
    Join, JoinKind, LimitSpec, OutputColumn, Projection, Query, QueryId, QuerySource, Selection,
    SortDirection, TableRef,
};
