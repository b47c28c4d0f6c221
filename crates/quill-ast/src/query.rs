use std::sync::atomic::{AtomicU64, Ordering};

use quill_error::{QuillError, Result};
use quill_schema::TableSpec;
use quill_types::Value;

use crate::bag::ColumnBag;
use crate::expr::Expr;
use crate::plan::JsonShape;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(0);

/// Stable identity token, assigned once per constructed query value.
///
/// Clones share the token; every builder operation mints a new one. CTE
/// hoisting counts references by this token, so the same derived query used
/// in a join and in a subquery predicate materializes once. Being a plain
/// integer rather than a pointer, identity survives serialization.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct QueryId(u64);

impl QueryId {
    fn next() -> Self {
        Self(NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ---------------------------------------------------------------------------
// Supporting nodes
// ---------------------------------------------------------------------------

/// One column of a query's output schema.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputColumn {
    pub name: String,
    pub codec: quill_types::Codec,
    /// Set when the column carries a JSON-aggregated document whose nested
    /// shape the shaper must preserve across query boundaries.
    pub shape: Option<JsonShape>,
}

/// A snapshot of a physical table: name plus output columns.
///
/// Queries hold this instead of a `TableSpec` reference so a query tree is
/// self-contained and serializable.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableRef {
    pub name: String,
    pub columns: Vec<OutputColumn>,
}

impl TableRef {
    fn from_spec(table: &TableSpec) -> Self {
        Self {
            name: table.name().to_owned(),
            columns: table
                .columns()
                .iter()
                .map(|c| OutputColumn {
                    name: c.name.clone(),
                    codec: c.codec,
                    shape: None,
                })
                .collect(),
        }
    }
}

/// What a query reads from.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum QuerySource {
    /// A physical table scan.
    Table(TableRef),
    /// Another query. When `promoted`, it is always materialized as a CTE.
    Derived { query: Box<Query>, promoted: bool },
}

/// Join flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    #[must_use]
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// One join: an aliased subquery and its ON condition.
///
/// The alias is the caller's name for the joined columns; the emitter
/// rewrites it to a fresh physical alias at lowering time.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub query: Query,
    pub alias: String,
    pub on: Expr,
}

/// Sort direction for ORDER BY terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn sql_keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// LIMIT with optional OFFSET; both sides are expressions so they can be
/// bound as externals.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LimitSpec {
    pub limit: Expr,
    pub offset: Option<Expr>,
}

/// One SELECT-list entry.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Projection {
    pub alias: String,
    pub expr: Expr,
}

/// The SELECT list.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Selection {
    /// Every column of the base source.
    Star,
    Explicit(Vec<Projection>),
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// An immutable query description.
///
/// Every builder operation returns a fresh value carrying a fresh
/// [`QueryId`]; the receiver is never changed. Clause order in the value is
/// irrelevant to the caller — the emitter lowers into canonical SQL clause
/// order.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Query {
    id: QueryId,
    pub source: QuerySource,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<(Expr, SortDirection)>,
    pub limit: Option<LimitSpec>,
    pub selection: Selection,
}

impl Query {
    /// `SELECT * FROM table` — the root of every chain.
    #[must_use]
    pub fn scan(table: &TableSpec) -> Self {
        Self::with_source(QuerySource::Table(TableRef::from_spec(table)))
    }

    /// Use another query as the source, promoting it to a CTE.
    #[must_use]
    pub fn from_query(query: Self) -> Self {
        Self::with_source(QuerySource::Derived {
            query: Box::new(query),
            promoted: true,
        })
    }

    fn with_source(source: QuerySource) -> Self {
        Self {
            id: QueryId::next(),
            source,
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            selection: Selection::Star,
        }
    }

    /// This value's identity token.
    #[must_use]
    pub const fn id(&self) -> QueryId {
        self.id
    }

    /// A derived copy with a fresh identity token.
    fn derive(&self) -> Self {
        let mut next = self.clone();
        next.id = QueryId::next();
        next
    }

    // -- introspection ------------------------------------------------------

    /// Columns exposed by the base source (before joins).
    #[must_use]
    pub fn source_columns(&self) -> Vec<OutputColumn> {
        match &self.source {
            QuerySource::Table(table) => table.columns.clone(),
            QuerySource::Derived { query, .. } => query.output_columns(),
        }
    }

    /// The query's output schema: one entry per result column.
    #[must_use]
    pub fn output_columns(&self) -> Vec<OutputColumn> {
        match &self.selection {
            Selection::Star => self.source_columns(),
            Selection::Explicit(projections) => projections
                .iter()
                .map(|p| OutputColumn {
                    name: p.alias.clone(),
                    codec: p.expr.codec(),
                    shape: p.expr.shape(),
                })
                .collect(),
        }
    }

    /// The column bag closures receive: base columns plus joined aliases.
    #[must_use]
    pub fn bag(&self) -> ColumnBag {
        ColumnBag::new(
            self.source_columns(),
            self.joins
                .iter()
                .map(|j| (j.alias.clone(), j.kind, j.query.output_columns()))
                .collect(),
        )
    }

    // -- chainable operations ----------------------------------------------

    /// Add a WHERE condition, AND-composed with any existing one.
    ///
    /// Aggregates are rejected here, at the introducing call.
    pub fn filter(&self, f: impl FnOnce(&ColumnBag) -> Result<Expr>) -> Result<Self> {
        let expr = f(&self.bag())?;
        if let Some(func) = expr.find_aggregate() {
            return Err(QuillError::illegal_aggregate(func, "WHERE"));
        }
        let mut next = self.derive();
        next.where_clause = Some(match next.where_clause.take() {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        Ok(next)
    }

    /// Convenience: AND of equality filters over base columns, with each
    /// value bound as a named parameter labeled by the column.
    pub fn and_filter_equal<N: AsRef<str>>(&self, pairs: Vec<(N, Value)>) -> Result<Self> {
        self.filter(|bag| {
            let mut combined: Option<Expr> = None;
            for (name, value) in pairs {
                let column = bag.col(name.as_ref())?;
                let external =
                    Expr::external_as(column.codec(), Some(name.as_ref().to_owned()), value)?;
                let clause = column.eq(external);
                combined = Some(match combined {
                    Some(existing) => existing.and(clause),
                    None => clause,
                });
            }
            combined.ok_or(QuillError::EmptyInList)
        })
    }

    /// Replace the selection with explicit projections.
    pub fn select(
        &self,
        f: impl FnOnce(&ColumnBag) -> Result<Vec<(String, Expr)>>,
    ) -> Result<Self> {
        let projections = f(&self.bag())?;
        for (i, (alias, _)) in projections.iter().enumerate() {
            if projections[..i].iter().any(|(a, _)| a == alias) {
                return Err(QuillError::DuplicateProjection {
                    alias: alias.clone(),
                });
            }
        }
        let mut next = self.derive();
        next.selection = Selection::Explicit(
            projections
                .into_iter()
                .map(|(alias, expr)| Projection { alias, expr })
                .collect(),
        );
        Ok(next)
    }

    /// Replace the GROUP BY key list.
    pub fn group_by(&self, f: impl FnOnce(&ColumnBag) -> Result<Vec<Expr>>) -> Result<Self> {
        let exprs = f(&self.bag())?;
        for expr in &exprs {
            if let Some(func) = expr.find_aggregate() {
                return Err(QuillError::illegal_aggregate(func, "GROUP BY"));
            }
        }
        let mut next = self.derive();
        next.group_by = exprs;
        Ok(next)
    }

    /// Set the HAVING condition. Requires GROUP BY by emission time.
    pub fn having(&self, f: impl FnOnce(&ColumnBag) -> Result<Expr>) -> Result<Self> {
        let expr = f(&self.bag())?;
        let mut next = self.derive();
        next.having = Some(expr);
        Ok(next)
    }

    /// Append an ORDER BY term.
    pub fn order_by(
        &self,
        f: impl FnOnce(&ColumnBag) -> Result<Expr>,
        direction: SortDirection,
    ) -> Result<Self> {
        let expr = f(&self.bag())?;
        let mut next = self.derive();
        next.order_by.push((expr, direction));
        Ok(next)
    }

    /// Set LIMIT.
    #[must_use]
    pub fn limit(&self, limit: Expr) -> Self {
        let mut next = self.derive();
        next.limit = Some(LimitSpec {
            limit,
            offset: None,
        });
        next
    }

    /// Set LIMIT with OFFSET.
    #[must_use]
    pub fn limit_offset(&self, limit: Expr, offset: Expr) -> Self {
        let mut next = self.derive();
        next.limit = Some(LimitSpec {
            limit,
            offset: Some(offset),
        });
        next
    }

    /// Append an inner join against `other` under `alias`.
    ///
    /// The ON closure sees the current bag extended with the new alias.
    pub fn inner_join(
        &self,
        other: &Self,
        alias: impl Into<String>,
        on: impl FnOnce(&ColumnBag) -> Result<Expr>,
    ) -> Result<Self> {
        self.join(JoinKind::Inner, other, alias.into(), on)
    }

    /// Append a left outer join against `other` under `alias`. Columns read
    /// through the alias become nullable.
    pub fn left_join(
        &self,
        other: &Self,
        alias: impl Into<String>,
        on: impl FnOnce(&ColumnBag) -> Result<Expr>,
    ) -> Result<Self> {
        self.join(JoinKind::Left, other, alias.into(), on)
    }

    fn join(
        &self,
        kind: JoinKind,
        other: &Self,
        alias: String,
        on: impl FnOnce(&ColumnBag) -> Result<Expr>,
    ) -> Result<Self> {
        if alias.is_empty() || self.joins.iter().any(|j| j.alias == alias) {
            return Err(QuillError::DuplicateAlias { alias });
        }
        let bag = ColumnBag::new(
            self.source_columns(),
            self.joins
                .iter()
                .map(|j| (j.alias.clone(), j.kind, j.query.output_columns()))
                .chain(std::iter::once((
                    alias.clone(),
                    kind,
                    other.output_columns(),
                )))
                .collect(),
        );
        let on_expr = on(&bag)?;
        if let Some(func) = on_expr.find_aggregate() {
            return Err(QuillError::illegal_aggregate(func, "ON"));
        }
        let mut next = self.derive();
        next.joins.push(Join {
            kind,
            query: other.clone(),
            alias,
            on: on_expr,
        });
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_schema::Column;
    use quill_types::Codec;

    fn users() -> TableSpec {
        TableSpec::declare(
            "users",
            vec![
                ("id", Column::integer().primary()),
                ("name", Column::text()),
            ],
        )
        .unwrap()
    }

    fn tasks() -> TableSpec {
        TableSpec::declare(
            "tasks",
            vec![
                ("id", Column::integer().primary()),
                ("title", Column::text()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn builders_leave_the_original_untouched() {
        let q = Query::scan(&users());
        let before = q.clone();
        let filtered = q.filter(|b| Ok(b.col("id")?.eq(Expr::int(1)))).unwrap();
        assert_eq!(q, before);
        assert_ne!(filtered.id(), q.id());
        assert!(filtered.where_clause.is_some());
    }

    #[test]
    fn clones_share_identity() {
        let q = Query::scan(&users());
        assert_eq!(q.id(), q.clone().id());
    }

    #[test]
    fn filter_composes_with_and() {
        let q = Query::scan(&users())
            .filter(|b| Ok(b.col("id")?.gt(Expr::int(0))))
            .unwrap()
            .filter(|b| Ok(b.col("name")?.ne(Expr::text(""))))
            .unwrap();
        let Some(Expr::Binary { op, .. }) = &q.where_clause else {
            panic!("expected combined where clause");
        };
        assert_eq!(*op, crate::expr::BinaryOp::And);
    }

    #[test]
    fn filter_rejects_aggregates() {
        let err = Query::scan(&users())
            .filter(|b| Ok(Expr::count(b.col("id")?).gt(Expr::int(1))))
            .unwrap_err();
        assert!(matches!(err, QuillError::IllegalAggregate { .. }));
    }

    #[test]
    fn filter_rejects_unknown_columns() {
        let err = Query::scan(&users())
            .filter(|b| Ok(b.col("nmae")?.eq(Expr::int(1))))
            .unwrap_err();
        assert!(matches!(err, QuillError::UnknownColumn { .. }));
    }

    #[test]
    fn select_rejects_duplicate_aliases() {
        let err = Query::scan(&users())
            .select(|b| {
                Ok(vec![
                    ("id".to_owned(), b.col("id")?),
                    ("id".to_owned(), b.col("name")?),
                ])
            })
            .unwrap_err();
        assert!(matches!(err, QuillError::DuplicateProjection { .. }));
    }

    #[test]
    fn output_columns_follow_selection() {
        let q = Query::scan(&users());
        let star: Vec<String> = q.output_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(star, vec!["id", "name"]);

        let projected = q
            .select(|b| Ok(vec![("user_id".to_owned(), b.col("id")?)]))
            .unwrap();
        let cols = projected.output_columns();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "user_id");
        assert_eq!(cols[0].codec, Codec::INTEGER);
    }

    #[test]
    fn join_exposes_alias_columns_nullable_on_left() {
        let q = Query::scan(&users())
            .left_join(&Query::scan(&tasks()), "t", |b| {
                Ok(b.col("id")?.eq(b.joined("t", "id")?))
            })
            .unwrap();
        let bag = q.bag();
        assert_eq!(bag.joined("t", "title").unwrap().codec(), Codec::TEXT.nullable());
        assert!(bag.joined("missing", "title").is_err());
    }

    #[test]
    fn duplicate_join_alias_rejected() {
        let t = Query::scan(&tasks());
        let q = Query::scan(&users())
            .inner_join(&t, "t", |b| Ok(b.col("id")?.eq(b.joined("t", "id")?)))
            .unwrap();
        let err = q
            .inner_join(&t, "t", |b| Ok(b.col("id")?.eq(b.joined("t", "id")?)))
            .unwrap_err();
        assert!(matches!(err, QuillError::DuplicateAlias { .. }));
    }

    #[test]
    fn and_filter_equal_builds_named_externals() {
        let q = Query::scan(&users())
            .and_filter_equal(vec![("name", Value::Text("Jane".to_owned()))])
            .unwrap();
        let where_clause = q.where_clause.expect("where clause");
        let mut found_label = None;
        fn walk(expr: &Expr, found: &mut Option<String>) {
            match expr {
                Expr::External { label, .. } => *found = label.clone(),
                Expr::Binary { lhs, rhs, .. } => {
                    walk(lhs, found);
                    walk(rhs, found);
                }
                _ => {}
            }
        }
        walk(&where_clause, &mut found_label);
        assert_eq!(found_label.as_deref(), Some("name"));
    }

    #[test]
    fn from_query_promotes() {
        let inner = Query::scan(&users());
        let outer = Query::from_query(inner.clone());
        match &outer.source {
            QuerySource::Derived { query, promoted } => {
                assert!(*promoted);
                assert_eq!(query.id(), inner.id());
            }
            QuerySource::Table(_) => panic!("expected derived source"),
        }
        let names: Vec<String> = outer.output_columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
