use std::collections::{HashMap, HashSet};

use quill_ast::{
    Cardinality, Expr, IdGen, JoinKind, JsonShape, Plan, Projection, Query, QueryId, QuerySource,
    Selection,
};
use quill_error::{QuillError, Result};
use quill_types::sql_ident::quote_ident;

use crate::op::{Operation, OperationKind, Params};

/// Lowers query trees into [`Operation`]s.
///
/// The emitter owns the id generator, so alias and CTE names are unique
/// within everything emitted through one instance. [`Emitter::deterministic`]
/// swaps in a counter-backed generator for byte-stable test output; a fresh
/// deterministic emitter starts the counter over.
#[derive(Debug, Default)]
pub struct Emitter {
    pub(crate) ids: IdGen,
}

impl Emitter {
    /// An emitter with random, unguessable identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: IdGen::random(),
        }
    }

    /// An emitter with counter-backed identifiers (`t_id0`, `cte_id1`, ...).
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            ids: IdGen::deterministic(),
        }
    }

    /// Lower a query to SQL text, parameters, and a reconstruction plan.
    pub fn emit(&mut self, query: &Query, cardinality: Cardinality) -> Result<Operation> {
        validate(query)?;
        let entries = collect_ctes(query);
        let mut cx = Cx {
            ids: &mut self.ids,
            cte_names: HashMap::new(),
            params: Params::new(),
        };
        let mut sql = emit_cte_prefix(&mut cx, &entries)?;
        let (root, plan) = emit_select(&mut cx, query)?;
        sql.push_str(&root);
        tracing::debug!(
            ctes = entries.len(),
            params = cx.params.len(),
            bytes = sql.len(),
            "emitted query"
        );
        Ok(Operation {
            kind: OperationKind::Query,
            sql,
            params: cx.params,
            plan: Some(plan),
            cardinality,
        })
    }
}

/// Terminal shapers: lower a [`Query`] into an [`Operation`] with the chosen
/// row-cardinality contract. Implemented for `Query`; bring the trait into
/// scope to chain `.all()` and friends off a builder chain.
pub trait QueryExt {
    /// Lower with an explicit emitter (deterministic ids, shared scope).
    fn emit_with(&self, emitter: &mut Emitter, cardinality: Cardinality) -> Result<Operation>;

    /// Any number of rows.
    fn all(&self) -> Result<Operation>;
    /// Exactly one row.
    fn one(&self) -> Result<Operation>;
    /// Zero or one row.
    fn maybe_one(&self) -> Result<Operation>;
    /// At least one row; the first is returned.
    fn first(&self) -> Result<Operation>;
    /// The first row when present.
    fn maybe_first(&self) -> Result<Operation>;
}

impl QueryExt for Query {
    fn emit_with(&self, emitter: &mut Emitter, cardinality: Cardinality) -> Result<Operation> {
        emitter.emit(self, cardinality)
    }

    fn all(&self) -> Result<Operation> {
        Emitter::new().emit(self, Cardinality::All)
    }

    fn one(&self) -> Result<Operation> {
        Emitter::new().emit(self, Cardinality::One)
    }

    fn maybe_one(&self) -> Result<Operation> {
        Emitter::new().emit(self, Cardinality::MaybeOne)
    }

    fn first(&self) -> Result<Operation> {
        Emitter::new().emit(self, Cardinality::First)
    }

    fn maybe_first(&self) -> Result<Operation> {
        Emitter::new().emit(self, Cardinality::MaybeFirst)
    }
}

// ---------------------------------------------------------------------------
// Emission context
// ---------------------------------------------------------------------------

pub(crate) struct Cx<'a> {
    pub(crate) ids: &'a mut IdGen,
    pub(crate) cte_names: HashMap<QueryId, String>,
    pub(crate) params: Params,
}

/// Alias scope of one SELECT: caller-visible names → physical aliases.
pub(crate) struct Scope {
    pub(crate) base_phys: String,
    aliases: Vec<(String, String)>,
    left: HashSet<String>,
}

impl Scope {
    pub(crate) fn bare(base_phys: impl Into<String>) -> Self {
        Self {
            base_phys: base_phys.into(),
            aliases: Vec::new(),
            left: HashSet::new(),
        }
    }

    fn physical(&self, alias: &str) -> Result<&str> {
        self.aliases
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, p)| p.as_str())
            .ok_or_else(|| QuillError::UnknownAlias {
                alias: alias.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// CTE collection and hoisting
// ---------------------------------------------------------------------------

pub(crate) struct CteEntry {
    query: Query,
    refs: usize,
    forced: bool,
}

/// Gather every derived query in the tree with its reference count, keyed by
/// identity, then keep the ones that become CTEs: referenced at least twice,
/// explicitly promoted, or used as a subquery predicate.
fn collect_ctes(root: &Query) -> Vec<CteEntry> {
    let mut entries = Vec::new();
    walk_query(root, &mut entries);
    entries.retain(|e| e.refs >= 2 || e.forced);
    entries
}

/// CTE entries arising from a bare expression (DML filters).
pub(crate) fn collect_ctes_from_expr(expr: &Expr) -> Vec<CteEntry> {
    let mut entries = Vec::new();
    for_each_subquery(expr, &mut |sq| record(sq, true, &mut entries));
    entries.retain(|e| e.refs >= 2 || e.forced);
    entries
}

fn walk_query(query: &Query, entries: &mut Vec<CteEntry>) {
    if let QuerySource::Derived {
        query: inner,
        promoted,
    } = &query.source
    {
        record(inner, *promoted, entries);
    }
    for join in &query.joins {
        record(&join.query, false, entries);
    }
    for expr in query_exprs(query) {
        for_each_subquery(expr, &mut |sq| record(sq, true, entries));
    }
}

fn record(query: &Query, forced: bool, entries: &mut Vec<CteEntry>) {
    if let Some(entry) = entries.iter_mut().find(|e| e.query.id() == query.id()) {
        entry.refs += 1;
        entry.forced |= forced;
    } else {
        entries.push(CteEntry {
            query: query.clone(),
            refs: 1,
            forced,
        });
        walk_query(query, entries);
    }
}

/// Emit the `WITH a AS (...), b AS (...) ` prefix in topological order, so a
/// CTE may reference an earlier one. Ties break on discovery order.
pub(crate) fn emit_cte_prefix(cx: &mut Cx<'_>, entries: &[CteEntry]) -> Result<String> {
    if entries.is_empty() {
        return Ok(String::new());
    }
    let in_set: HashSet<QueryId> = entries.iter().map(|e| e.query.id()).collect();
    let deps: Vec<HashSet<QueryId>> = entries
        .iter()
        .map(|e| {
            let mut out = HashSet::new();
            cte_deps(&e.query, &in_set, &mut out);
            out
        })
        .collect();

    let mut sql = String::from("WITH ");
    let mut emitted: HashSet<QueryId> = HashSet::new();
    let mut first = true;
    while emitted.len() < entries.len() {
        let next = (0..entries.len())
            .find(|&i| {
                !emitted.contains(&entries[i].query.id())
                    && deps[i].iter().all(|d| emitted.contains(d))
            })
            .expect("acyclic CTE graph");
        let entry = &entries[next];
        let name = cx.ids.fresh("cte");
        cx.cte_names.insert(entry.query.id(), name.clone());
        if !first {
            sql.push_str(", ");
        }
        first = false;
        sql.push_str(&name);
        sql.push_str(" AS (");
        let (body, _) = emit_select(cx, &entry.query)?;
        sql.push_str(&body);
        sql.push(')');
        emitted.insert(entry.query.id());
    }
    sql.push(' ');
    Ok(sql)
}

/// Which CTE names a query's body will reference. Recurses through inlined
/// derived queries but treats CTE members as opaque.
fn cte_deps(query: &Query, in_set: &HashSet<QueryId>, out: &mut HashSet<QueryId>) {
    let mut visit = |q: &Query| {
        if in_set.contains(&q.id()) {
            out.insert(q.id());
        } else {
            cte_deps(q, in_set, out);
        }
    };
    if let QuerySource::Derived { query: inner, .. } = &query.source {
        visit(inner);
    }
    for join in &query.joins {
        visit(&join.query);
    }
    for expr in query_exprs(query) {
        for_each_subquery(expr, &mut |sq| visit(sq));
    }
}

// ---------------------------------------------------------------------------
// SELECT emission
// ---------------------------------------------------------------------------

/// Emit one SELECT (no WITH prefix) and its reconstruction plan.
///
/// Clause text is appended in final SQL order, so parameters register in
/// first-use order.
fn emit_select(cx: &mut Cx<'_>, query: &Query) -> Result<(String, Plan)> {
    let joined = !query.joins.is_empty();

    // Physical aliases are assigned up front; the SELECT list references
    // them before the FROM clause text exists.
    let (base_phys, base_alias) = match &query.source {
        QuerySource::Table(table) => {
            if joined {
                let alias = cx.ids.fresh("t");
                (alias.clone(), Some(alias))
            } else {
                (table.name.clone(), None)
            }
        }
        QuerySource::Derived { .. } => {
            let alias = cx.ids.fresh("t");
            (alias.clone(), Some(alias))
        }
    };
    let mut scope = Scope::bare(base_phys);
    let mut join_phys = Vec::with_capacity(query.joins.len());
    for join in &query.joins {
        let phys = cx.ids.fresh("t");
        scope.aliases.push((join.alias.clone(), phys.clone()));
        if join.kind == JoinKind::Left {
            scope.left.insert(join.alias.clone());
        }
        join_phys.push(phys);
    }

    // SELECT list.
    let mut sql = String::from("SELECT ");
    let plan = match &query.selection {
        Selection::Star => {
            sql.push_str(&quote_ident(&scope.base_phys));
            sql.push_str(".*");
            let fields = query
                .source_columns()
                .into_iter()
                .map(|c| {
                    let field_plan = match c.shape {
                        Some(shape) => Plan::Json {
                            column: c.name.clone(),
                            shape,
                        },
                        None => Plan::Scalar {
                            column: c.name.clone(),
                            codec: c.codec,
                        },
                    };
                    (c.name, field_plan)
                })
                .collect();
            Plan::Record { fields }
        }
        Selection::Explicit(projections) => {
            let mut fields = Vec::with_capacity(projections.len());
            for (i, projection) in projections.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                let expr_sql = emit_expr(cx, &projection.expr, &scope)?;
                sql.push_str(&expr_sql);
                sql.push_str(" AS ");
                sql.push_str(&quote_ident(&projection.alias));
                fields.push((
                    projection.alias.clone(),
                    projection_plan(projection, &scope),
                ));
            }
            Plan::Record { fields }
        }
    };

    // FROM.
    sql.push_str(" FROM ");
    match &query.source {
        QuerySource::Table(table) => {
            sql.push_str(&quote_ident(&table.name));
            if let Some(alias) = &base_alias {
                sql.push_str(" AS ");
                sql.push_str(alias);
            }
        }
        QuerySource::Derived { query: inner, .. } => {
            let alias = base_alias.as_deref().expect("derived source is aliased");
            if let Some(name) = cx.cte_names.get(&inner.id()).cloned() {
                sql.push_str(&name);
            } else {
                let (body, _) = emit_select(cx, inner)?;
                sql.push('(');
                sql.push_str(&body);
                sql.push(')');
            }
            sql.push_str(" AS ");
            sql.push_str(alias);
        }
    }

    // JOIN clauses.
    for (join, phys) in query.joins.iter().zip(&join_phys) {
        sql.push(' ');
        sql.push_str(join.kind.sql_keyword());
        sql.push(' ');
        if let Some(name) = cx.cte_names.get(&join.query.id()).cloned() {
            sql.push_str(&name);
        } else {
            let (body, _) = emit_select(cx, &join.query)?;
            sql.push('(');
            sql.push_str(&body);
            sql.push(')');
        }
        sql.push_str(" AS ");
        sql.push_str(phys);
        sql.push_str(" ON ");
        let on_sql = emit_expr(cx, &join.on, &scope)?;
        sql.push_str(&on_sql);
    }

    // WHERE / GROUP BY / HAVING / ORDER BY / LIMIT, canonical order.
    if let Some(where_clause) = &query.where_clause {
        sql.push_str(" WHERE ");
        let text = emit_expr(cx, where_clause, &scope)?;
        sql.push_str(&text);
    }
    if !query.group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        for (i, expr) in query.group_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let text = emit_expr(cx, expr, &scope)?;
            sql.push_str(&text);
        }
    }
    if let Some(having) = &query.having {
        sql.push_str(" HAVING ");
        let text = emit_expr(cx, having, &scope)?;
        sql.push_str(&text);
    }
    if !query.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        for (i, (expr, direction)) in query.order_by.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let text = emit_expr(cx, expr, &scope)?;
            sql.push_str(&text);
            sql.push(' ');
            sql.push_str(direction.sql_keyword());
        }
    }
    if let Some(limit) = &query.limit {
        sql.push_str(" LIMIT ");
        let text = emit_expr(cx, &limit.limit, &scope)?;
        sql.push_str(&text);
        if let Some(offset) = &limit.offset {
            sql.push_str(" OFFSET ");
            let text = emit_expr(cx, offset, &scope)?;
            sql.push_str(&text);
        }
    }

    Ok((sql, plan))
}

/// Plan node for one explicit projection. Projections built entirely from
/// left-joined aliases are wrapped as nullable: a missing join row must
/// collapse the subtree to `null`, not to an object of NULL fields.
fn projection_plan(projection: &Projection, scope: &Scope) -> Plan {
    let mut qualifiers = Vec::new();
    projection.expr.collect_qualifiers(&mut qualifiers);
    let left_only = !qualifiers.is_empty()
        && qualifiers.iter().all(|q| {
            matches!(q, quill_ast::Qualifier::Alias(alias) if scope.left.contains(alias.as_str()))
        });

    let inner = match projection.expr.shape() {
        Some(shape) => Plan::Json {
            column: projection.alias.clone(),
            shape: if left_only {
                JsonShape::Nullable(Box::new(shape))
            } else {
                shape
            },
        },
        None => Plan::Scalar {
            column: projection.alias.clone(),
            codec: if left_only {
                projection.expr.codec().nullable()
            } else {
                projection.expr.codec()
            },
        },
    };
    if left_only {
        Plan::Nullable {
            inner: Box::new(inner),
        }
    } else {
        inner
    }
}

// ---------------------------------------------------------------------------
// Expression emission
// ---------------------------------------------------------------------------

pub(crate) fn emit_expr(cx: &mut Cx<'_>, expr: &Expr, scope: &Scope) -> Result<String> {
    match expr {
        Expr::Column {
            qualifier, column, ..
        } => {
            let physical = match qualifier {
                quill_ast::Qualifier::Base => scope.base_phys.as_str(),
                quill_ast::Qualifier::Alias(alias) => scope.physical(alias)?,
            };
            Ok(format!(
                "{}.{}",
                quote_ident(physical),
                quote_ident(column)
            ))
        }
        Expr::Literal { codec, value } => Ok(codec.serialize(value)?.to_string()),
        Expr::External {
            codec,
            label,
            value,
        } => {
            let cell = codec.serialize(value)?;
            let label = match label {
                Some(label) => {
                    cx.params.bind_shared(label, cell)?;
                    label.clone()
                }
                None => {
                    let label = format!("_{}", cx.ids.token());
                    cx.params.bind_fresh(label.clone(), cell);
                    label
                }
            };
            Ok(format!(":{label}"))
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = emit_operand(cx, lhs, scope)?;
            let right = emit_operand(cx, rhs, scope)?;
            Ok(format!("{left} {op} {right}"))
        }
        Expr::Unary { op, arg } => {
            let operand = emit_operand(cx, arg, scope)?;
            Ok(match op {
                quill_ast::UnaryOp::Not => format!("NOT {operand}"),
                quill_ast::UnaryOp::Neg => format!("-{operand}"),
                quill_ast::UnaryOp::IsNull => format!("{operand} IS NULL"),
                quill_ast::UnaryOp::IsNotNull => format!("{operand} IS NOT NULL"),
            })
        }
        Expr::InList { arg, list } => {
            let operand = emit_operand(cx, arg, scope)?;
            let mut items = Vec::with_capacity(list.len());
            for item in list {
                items.push(emit_expr(cx, item, scope)?);
            }
            Ok(format!("{operand} IN ({})", items.join(", ")))
        }
        Expr::InSubquery {
            arg,
            query,
            negated,
        } => {
            let operand = emit_operand(cx, arg, scope)?;
            let keyword = if *negated { "NOT IN" } else { "IN" };
            if let Some(name) = cx.cte_names.get(&query.id()).cloned() {
                Ok(format!("{operand} {keyword} {name}"))
            } else {
                // Bare-expression contexts run without CTE hoisting.
                let (body, _) = emit_select(cx, query)?;
                Ok(format!("{operand} {keyword} ({body})"))
            }
        }
        Expr::Aggregate {
            func,
            arg,
            distinct,
        } => match arg {
            None => Ok("count(*)".to_owned()),
            Some(arg) => {
                let operand = emit_expr(cx, arg, scope)?;
                if *distinct {
                    Ok(format!("{func}(DISTINCT {operand})"))
                } else {
                    Ok(format!("{func}({operand})"))
                }
            }
        },
        Expr::JsonObject { pairs } => {
            let mut parts = Vec::with_capacity(pairs.len() * 2);
            for (key, value) in pairs {
                parts.push(quill_types::SqlValue::Text(key.clone()).to_string());
                parts.push(emit_expr(cx, value, scope)?);
            }
            Ok(format!("json_object({})", parts.join(", ")))
        }
        Expr::JsonGroupArray { arg } => {
            let operand = emit_expr(cx, arg, scope)?;
            Ok(format!("json_group_array({operand})"))
        }
        Expr::Case { whens, else_expr } => {
            let mut sql = String::from("CASE");
            for (condition, value) in whens {
                sql.push_str(" WHEN ");
                sql.push_str(&emit_expr(cx, condition, scope)?);
                sql.push_str(" THEN ");
                sql.push_str(&emit_expr(cx, value, scope)?);
            }
            if let Some(else_expr) = else_expr {
                sql.push_str(" ELSE ");
                sql.push_str(&emit_expr(cx, else_expr, scope)?);
            }
            sql.push_str(" END");
            Ok(sql)
        }
        Expr::Raw { sql, .. } => Ok(sql.clone()),
    }
}

/// Emit a child expression, parenthesizing compound forms so precedence
/// survives the flat text.
fn emit_operand(cx: &mut Cx<'_>, expr: &Expr, scope: &Scope) -> Result<String> {
    let sql = emit_expr(cx, expr, scope)?;
    if matches!(expr, Expr::Binary { .. } | Expr::Unary { .. }) {
        Ok(format!("({sql})"))
    } else {
        Ok(sql)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural checks before any text is produced: HAVING requires GROUP BY,
/// aggregates only in SELECT/HAVING/ORDER BY of grouped queries, subquery
/// predicates project exactly one column. Applied recursively.
fn validate(query: &Query) -> Result<()> {
    let grouped = !query.group_by.is_empty();
    if query.having.is_some() && !grouped {
        return Err(QuillError::HavingWithoutGroupBy);
    }
    if let Some(where_clause) = &query.where_clause {
        reject_aggregate(where_clause, "WHERE")?;
    }
    for join in &query.joins {
        reject_aggregate(&join.on, "ON")?;
    }
    for expr in &query.group_by {
        reject_aggregate(expr, "GROUP BY")?;
    }
    if let Some(limit) = &query.limit {
        reject_aggregate(&limit.limit, "LIMIT")?;
        if let Some(offset) = &limit.offset {
            reject_aggregate(offset, "LIMIT")?;
        }
    }
    if !grouped {
        if let Selection::Explicit(projections) = &query.selection {
            for projection in projections {
                reject_aggregate(&projection.expr, "SELECT")?;
            }
        }
        for (expr, _) in &query.order_by {
            reject_aggregate(expr, "ORDER BY")?;
        }
    }

    for expr in query_exprs(query) {
        let mut status = Ok(());
        for_each_subquery(expr, &mut |sq| {
            if status.is_ok() {
                let arity = sq.output_columns().len();
                status = if arity == 1 {
                    validate(sq)
                } else {
                    Err(QuillError::SubqueryArity { count: arity })
                };
            }
        });
        status?;
    }
    if let QuerySource::Derived { query: inner, .. } = &query.source {
        validate(inner)?;
    }
    for join in &query.joins {
        validate(&join.query)?;
    }
    Ok(())
}

pub(crate) fn reject_aggregate(expr: &Expr, clause: &str) -> Result<()> {
    match expr.find_aggregate() {
        Some(func) => Err(QuillError::illegal_aggregate(func, clause)),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tree walks
// ---------------------------------------------------------------------------

/// Every expression a query holds directly, in emission order.
fn query_exprs(query: &Query) -> Vec<&Expr> {
    let mut out = Vec::new();
    if let Selection::Explicit(projections) = &query.selection {
        for projection in projections {
            out.push(&projection.expr);
        }
    }
    for join in &query.joins {
        out.push(&join.on);
    }
    if let Some(where_clause) = &query.where_clause {
        out.push(where_clause);
    }
    out.extend(query.group_by.iter());
    if let Some(having) = &query.having {
        out.push(having);
    }
    for (expr, _) in &query.order_by {
        out.push(expr);
    }
    if let Some(limit) = &query.limit {
        out.push(&limit.limit);
        if let Some(offset) = &limit.offset {
            out.push(offset);
        }
    }
    out
}

/// Visit every subquery predicate target in an expression tree. Does not
/// descend into the targets themselves.
fn for_each_subquery<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Query)) {
    match expr {
        Expr::InSubquery { arg, query, .. } => {
            f(query);
            for_each_subquery(arg, f);
        }
        Expr::Binary { lhs, rhs, .. } => {
            for_each_subquery(lhs, f);
            for_each_subquery(rhs, f);
        }
        Expr::Unary { arg, .. } | Expr::JsonGroupArray { arg } => for_each_subquery(arg, f),
        Expr::InList { arg, list } => {
            for_each_subquery(arg, f);
            for item in list {
                for_each_subquery(item, f);
            }
        }
        Expr::Aggregate { arg, .. } => {
            if let Some(arg) = arg {
                for_each_subquery(arg, f);
            }
        }
        Expr::JsonObject { pairs } => {
            for (_, value) in pairs {
                for_each_subquery(value, f);
            }
        }
        Expr::Case { whens, else_expr } => {
            for (condition, value) in whens {
                for_each_subquery(condition, f);
                for_each_subquery(value, f);
            }
            if let Some(else_expr) = else_expr {
                for_each_subquery(else_expr, f);
            }
        }
        Expr::Column { .. } | Expr::Literal { .. } | Expr::External { .. } | Expr::Raw { .. } => {}
    }
}
