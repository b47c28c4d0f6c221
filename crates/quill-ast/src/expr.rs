use std::fmt;

use chrono::{DateTime, Utc};
use quill_error::{QuillError, Result};
use quill_types::{Codec, Value};

use crate::plan::JsonShape;
use crate::query::Query;

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Null-aware equality, used when one operand is a literal NULL.
    Is,
    IsNot,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Logical
    And,
    Or,

    // String
    Concat,
}

impl BinaryOp {
    /// Whether the operator produces a boolean.
    #[must_use]
    pub const fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::Is
                | Self::IsNot
                | Self::And
                | Self::Or
        )
    }
}

/// `Display` renders the SQLite spelling. Equality is the SQLite-native `==`.
impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Is => "IS",
            Self::IsNot => "IS NOT",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Concat => "||",
        })
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    /// Logical NOT (prefix).
    Not,
    /// Numeric negation (prefix).
    Neg,
    /// `IS NULL` (postfix).
    IsNull,
    /// `IS NOT NULL` (postfix).
    IsNotNull,
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    GroupConcat,
}

impl fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::GroupConcat => "group_concat",
        })
    }
}

/// Which table a column reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Qualifier {
    /// The query's own source (base table or derived query).
    Base,
    /// A join alias introduced upstream in the same query.
    Alias(String),
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

/// An expression node.
///
/// Every node knows the [`Codec`] of the value it produces (see
/// [`Expr::codec`]), so the emitter can bind externals and the shaper can
/// parse results. Construction is by factory functions and combinators;
/// all of them return fresh values and validate only locally.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    /// A column of the base source or of a join alias.
    Column {
        qualifier: Qualifier,
        column: String,
        codec: Codec,
        /// Nested JSON shape when the column carries an aggregated document.
        shape: Option<JsonShape>,
    },
    /// A constant, inlined into the SQL text.
    Literal { codec: Codec, value: Value },
    /// A bound placeholder, emitted as a named parameter.
    External {
        codec: Codec,
        label: Option<String>,
        value: Value,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    InList {
        arg: Box<Expr>,
        list: Vec<Expr>,
    },
    /// `arg [NOT] IN <subquery>`; the subquery is held by value and shares
    /// identity with other uses of the same derived query.
    InSubquery {
        arg: Box<Expr>,
        query: Box<Query>,
        negated: bool,
    },
    Aggregate {
        func: AggregateFn,
        /// `None` is the `count(*)` sentinel.
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// `json_object('k1', v1, ...)`.
    JsonObject { pairs: Vec<(String, Expr)> },
    /// `json_group_array(arg)` — an aggregate.
    JsonGroupArray { arg: Box<Expr> },
    /// Searched CASE.
    Case {
        whens: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    /// Escape hatch: verbatim SQL with a declared result codec.
    Raw { sql: String, codec: Codec },
}

impl Expr {
    // -- literal constructors -----------------------------------------------

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::Literal {
            codec: Codec::INTEGER,
            value: Value::Int(value),
        }
    }

    #[must_use]
    pub fn real(value: f64) -> Self {
        Self::Literal {
            codec: Codec::REAL,
            value: Value::Real(value),
        }
    }

    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal {
            codec: Codec::TEXT,
            value: Value::Text(value.into()),
        }
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::Literal {
            codec: Codec::BOOLEAN,
            value: Value::Bool(value),
        }
    }

    #[must_use]
    pub fn date(value: DateTime<Utc>) -> Self {
        Self::Literal {
            codec: Codec::DATE,
            value: Value::Date(value),
        }
    }

    /// A typed NULL literal.
    #[must_use]
    pub fn null(codec: Codec) -> Self {
        Self::Literal {
            codec: codec.nullable(),
            value: Value::Null,
        }
    }

    /// A literal with an explicit codec. Fails when the value does not fit.
    pub fn literal(codec: Codec, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        codec.serialize(&value)?;
        Ok(Self::Literal { codec, value })
    }

    // -- externals ----------------------------------------------------------

    /// An anonymous external: bound at emission as a generated named
    /// parameter. Two anonymous externals never share a parameter slot.
    pub fn external(value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let codec = infer_codec(&value)?;
        Ok(Self::External {
            codec,
            label: None,
            value,
        })
    }

    /// A labeled external: emitted as `:label`. Equal labels share one slot;
    /// binding one label to two different values fails at emission.
    pub fn named_external(label: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let codec = infer_codec(&value)?;
        Ok(Self::External {
            codec,
            label: Some(label.into()),
            value,
        })
    }

    /// An external with an explicit codec (required for NULL values and
    /// nullable bindings).
    pub fn external_as(
        codec: Codec,
        label: Option<String>,
        value: impl Into<Value>,
    ) -> Result<Self> {
        let value = value.into();
        codec.serialize(&value)?;
        Ok(Self::External {
            codec,
            label,
            value,
        })
    }

    // -- comparison ---------------------------------------------------------

    /// Equality. Emits `==` unless one operand is a literal NULL, in which
    /// case it emits the null-aware `IS`. Note that `==` follows SQLite
    /// inline-equality semantics: comparing two NULL cells yields NULL, not
    /// true.
    #[must_use]
    pub fn eq(self, rhs: Self) -> Self {
        let op = if self.is_null_literal() || rhs.is_null_literal() {
            BinaryOp::Is
        } else {
            BinaryOp::Eq
        };
        self.binary(op, rhs)
    }

    /// Inequality; `IS NOT` when one operand is a literal NULL.
    #[must_use]
    pub fn ne(self, rhs: Self) -> Self {
        let op = if self.is_null_literal() || rhs.is_null_literal() {
            BinaryOp::IsNot
        } else {
            BinaryOp::Ne
        };
        self.binary(op, rhs)
    }

    #[must_use]
    pub fn lt(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    #[must_use]
    pub fn le(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    #[must_use]
    pub fn gt(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    #[must_use]
    pub fn ge(self, rhs: Self) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    // -- boolean logic ------------------------------------------------------

    /// Conjunction. `AND(x, TRUE)` collapses to `x`.
    #[must_use]
    pub fn and(self, rhs: Self) -> Self {
        if rhs.is_bool_literal(true) {
            return self;
        }
        if self.is_bool_literal(true) {
            return rhs;
        }
        self.binary(BinaryOp::And, rhs)
    }

    /// Disjunction. `OR(x, FALSE)` collapses to `x`.
    #[must_use]
    pub fn or(self, rhs: Self) -> Self {
        if rhs.is_bool_literal(false) {
            return self;
        }
        if self.is_bool_literal(false) {
            return rhs;
        }
        self.binary(BinaryOp::Or, rhs)
    }

    /// Logical negation, with double-NOT elision.
    #[must_use]
    pub fn not(self) -> Self {
        if let Self::Unary {
            op: UnaryOp::Not,
            arg,
        } = self
        {
            return *arg;
        }
        Self::Unary {
            op: UnaryOp::Not,
            arg: Box::new(self),
        }
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        Self::Unary {
            op: UnaryOp::IsNull,
            arg: Box::new(self),
        }
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        Self::Unary {
            op: UnaryOp::IsNotNull,
            arg: Box::new(self),
        }
    }

    // -- arithmetic ---------------------------------------------------------

    pub fn add(self, rhs: Self) -> Result<Self> {
        self.arith(BinaryOp::Add, rhs)
    }

    pub fn sub(self, rhs: Self) -> Result<Self> {
        self.arith(BinaryOp::Sub, rhs)
    }

    pub fn mul(self, rhs: Self) -> Result<Self> {
        self.arith(BinaryOp::Mul, rhs)
    }

    pub fn div(self, rhs: Self) -> Result<Self> {
        self.arith(BinaryOp::Div, rhs)
    }

    pub fn rem(self, rhs: Self) -> Result<Self> {
        self.arith(BinaryOp::Rem, rhs)
    }

    /// Numeric negation; numeric operand only.
    pub fn neg(self) -> Result<Self> {
        if !self.codec().is_numeric() {
            return Err(QuillError::OperandType {
                op: "-".to_owned(),
                expected: "numeric".to_owned(),
                actual: self.codec().to_string(),
            });
        }
        Ok(Self::Unary {
            op: UnaryOp::Neg,
            arg: Box::new(self),
        })
    }

    /// String concatenation (`||`); text operands only.
    pub fn concat(self, rhs: Self) -> Result<Self> {
        for side in [&self, &rhs] {
            if !side.codec().is_textual() {
                return Err(QuillError::OperandType {
                    op: "||".to_owned(),
                    expected: "text".to_owned(),
                    actual: side.codec().to_string(),
                });
            }
        }
        Ok(self.binary(BinaryOp::Concat, rhs))
    }

    // -- membership ---------------------------------------------------------

    /// `arg IN (a, b, ...)`. The list must be non-empty; a single-element
    /// list lowers to plain equality.
    pub fn in_list(self, mut list: Vec<Self>) -> Result<Self> {
        match list.len() {
            0 => Err(QuillError::EmptyInList),
            1 => Ok(self.eq(list.remove(0))),
            _ => Ok(Self::InList {
                arg: Box::new(self),
                list,
            }),
        }
    }

    /// `arg IN (SELECT ...)`. The subquery is hoisted to a CTE at emission.
    #[must_use]
    pub fn in_subquery(self, query: Query) -> Self {
        Self::InSubquery {
            arg: Box::new(self),
            query: Box::new(query),
            negated: false,
        }
    }

    /// `arg NOT IN (SELECT ...)`.
    #[must_use]
    pub fn not_in_subquery(self, query: Query) -> Self {
        Self::InSubquery {
            arg: Box::new(self),
            query: Box::new(query),
            negated: true,
        }
    }

    // -- aggregates ---------------------------------------------------------

    /// `count(*)`.
    #[must_use]
    pub fn count_star() -> Self {
        Self::Aggregate {
            func: AggregateFn::Count,
            arg: None,
            distinct: false,
        }
    }

    #[must_use]
    pub fn count(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Count, arg, false)
    }

    #[must_use]
    pub fn count_distinct(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Count, arg, true)
    }

    #[must_use]
    pub fn sum(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Sum, arg, false)
    }

    #[must_use]
    pub fn avg(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Avg, arg, false)
    }

    #[must_use]
    pub fn min(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Min, arg, false)
    }

    #[must_use]
    pub fn max(arg: Self) -> Self {
        Self::aggregate(AggregateFn::Max, arg, false)
    }

    #[must_use]
    pub fn group_concat(arg: Self) -> Self {
        Self::aggregate(AggregateFn::GroupConcat, arg, false)
    }

    #[must_use]
    pub fn aggregate(func: AggregateFn, arg: Self, distinct: bool) -> Self {
        Self::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct,
        }
    }

    // -- JSON constructors --------------------------------------------------

    /// `json_object('k1', v1, ...)` with a recorded nested shape.
    #[must_use]
    pub fn json_object<K: Into<String>>(pairs: Vec<(K, Self)>) -> Self {
        Self::JsonObject {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        }
    }

    /// `json_group_array(arg)` — aggregates matching rows into a JSON array.
    #[must_use]
    pub fn json_group_array(arg: Self) -> Self {
        Self::JsonGroupArray {
            arg: Box::new(arg),
        }
    }

    // -- control ------------------------------------------------------------

    /// Searched CASE. Requires at least one WHEN arm.
    pub fn case(whens: Vec<(Self, Self)>, else_expr: Option<Self>) -> Result<Self> {
        if whens.is_empty() {
            return Err(QuillError::OperandType {
                op: "CASE".to_owned(),
                expected: "at least one WHEN arm".to_owned(),
                actual: "none".to_owned(),
            });
        }
        Ok(Self::Case {
            whens,
            else_expr: else_expr.map(Box::new),
        })
    }

    /// Verbatim SQL with a declared result codec. Opaque to validation.
    #[must_use]
    pub fn raw(sql: impl Into<String>, codec: Codec) -> Self {
        Self::Raw {
            sql: sql.into(),
            codec,
        }
    }

    // -- introspection ------------------------------------------------------

    /// The codec of the value this expression produces.
    #[must_use]
    pub fn codec(&self) -> Codec {
        match self {
            Self::Column { codec, .. }
            | Self::Literal { codec, .. }
            | Self::External { codec, .. }
            | Self::Raw { codec, .. } => *codec,
            Self::Binary { op, lhs, rhs } => {
                if op.is_predicate() {
                    Codec::BOOLEAN
                } else if matches!(op, BinaryOp::Concat) {
                    Codec::TEXT
                } else if lhs.codec().kind() == quill_types::CodecKind::Real
                    || rhs.codec().kind() == quill_types::CodecKind::Real
                {
                    Codec::REAL
                } else {
                    Codec::INTEGER
                }
            }
            Self::Unary { op, arg } => match op {
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Codec::BOOLEAN,
                UnaryOp::Neg => arg.codec(),
            },
            Self::InList { .. } | Self::InSubquery { .. } => Codec::BOOLEAN,
            Self::Aggregate { func, arg, .. } => match func {
                AggregateFn::Count => Codec::INTEGER,
                AggregateFn::Avg => Codec::REAL.nullable(),
                AggregateFn::GroupConcat => Codec::TEXT.nullable(),
                AggregateFn::Sum | AggregateFn::Min | AggregateFn::Max => arg
                    .as_ref()
                    .map_or(Codec::INTEGER.nullable(), |a| a.codec().nullable()),
            },
            Self::JsonObject { .. } | Self::JsonGroupArray { .. } => Codec::JSON,
            Self::Case { whens, else_expr } => {
                let codec = whens[0].1.codec();
                if else_expr.is_some() {
                    codec
                } else {
                    codec.nullable()
                }
            }
        }
    }

    /// The nested JSON shape this expression produces, when it produces a
    /// structured document the shaper should decompose.
    #[must_use]
    pub fn shape(&self) -> Option<JsonShape> {
        match self {
            Self::Column { shape, .. } => shape.clone(),
            Self::JsonObject { pairs } => Some(JsonShape::Object(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            v.shape().unwrap_or(JsonShape::Scalar(v.codec())),
                        )
                    })
                    .collect(),
            )),
            Self::JsonGroupArray { arg } => Some(JsonShape::Array(Box::new(
                arg.shape().unwrap_or(JsonShape::Scalar(arg.codec())),
            ))),
            _ => None,
        }
    }

    /// Whether the tree contains an aggregate (including
    /// `json_group_array`). Subquery predicates open their own aggregation
    /// scope and are not descended into.
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        self.find_aggregate().is_some()
    }

    /// Name of the first aggregate in the tree, for error reporting.
    #[must_use]
    pub fn find_aggregate(&self) -> Option<String> {
        match self {
            Self::Aggregate { func, .. } => Some(func.to_string()),
            Self::JsonGroupArray { .. } => Some("json_group_array".to_owned()),
            Self::Column { .. }
            | Self::Literal { .. }
            | Self::External { .. }
            | Self::Raw { .. }
            | Self::InSubquery { .. } => None,
            Self::Binary { lhs, rhs, .. } => {
                lhs.find_aggregate().or_else(|| rhs.find_aggregate())
            }
            Self::Unary { arg, .. } => arg.find_aggregate(),
            Self::InList { arg, list } => arg
                .find_aggregate()
                .or_else(|| list.iter().find_map(Self::find_aggregate)),
            Self::JsonObject { pairs } => pairs.iter().find_map(|(_, v)| v.find_aggregate()),
            Self::Case { whens, else_expr } => whens
                .iter()
                .find_map(|(c, v)| c.find_aggregate().or_else(|| v.find_aggregate()))
                .or_else(|| else_expr.as_ref().and_then(|e| e.find_aggregate())),
        }
    }

    /// The join aliases this tree references (not descending into subquery
    /// predicates, which have their own scope).
    pub fn collect_qualifiers<'a>(&'a self, out: &mut Vec<&'a Qualifier>) {
        match self {
            Self::Column { qualifier, .. } => out.push(qualifier),
            Self::Literal { .. } | Self::External { .. } | Self::Raw { .. } => {}
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_qualifiers(out);
                rhs.collect_qualifiers(out);
            }
            Self::Unary { arg, .. } | Self::JsonGroupArray { arg } => arg.collect_qualifiers(out),
            Self::InList { arg, list } => {
                arg.collect_qualifiers(out);
                for item in list {
                    item.collect_qualifiers(out);
                }
            }
            Self::InSubquery { arg, .. } => arg.collect_qualifiers(out),
            Self::Aggregate { arg, .. } => {
                if let Some(arg) = arg {
                    arg.collect_qualifiers(out);
                }
            }
            Self::JsonObject { pairs } => {
                for (_, v) in pairs {
                    v.collect_qualifiers(out);
                }
            }
            Self::Case { whens, else_expr } => {
                for (c, v) in whens {
                    c.collect_qualifiers(out);
                    v.collect_qualifiers(out);
                }
                if let Some(e) = else_expr {
                    e.collect_qualifiers(out);
                }
            }
        }
    }

    fn binary(self, op: BinaryOp, rhs: Self) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    fn arith(self, op: BinaryOp, rhs: Self) -> Result<Self> {
        for side in [&self, &rhs] {
            if !side.codec().is_numeric() {
                return Err(QuillError::OperandType {
                    op: op.to_string(),
                    expected: "numeric".to_owned(),
                    actual: side.codec().to_string(),
                });
            }
        }
        Ok(self.binary(op, rhs))
    }

    fn is_null_literal(&self) -> bool {
        matches!(
            self,
            Self::Literal {
                value: Value::Null,
                ..
            }
        )
    }

    fn is_bool_literal(&self, expected: bool) -> bool {
        matches!(
            self,
            Self::Literal {
                value: Value::Bool(b),
                ..
            } if *b == expected
        )
    }
}

/// Infer the codec of a non-null value from its variant.
fn infer_codec(value: &Value) -> Result<Codec> {
    match value {
        Value::Bool(_) => Ok(Codec::BOOLEAN),
        Value::Int(_) => Ok(Codec::INTEGER),
        Value::Real(_) => Ok(Codec::REAL),
        Value::Text(_) => Ok(Codec::TEXT),
        Value::Date(_) => Ok(Codec::DATE),
        Value::Json(_) => Ok(Codec::JSON),
        Value::Null => Err(QuillError::codec(
            "null",
            "a NULL binding needs an explicit codec; use external_as",
        )),
    }
}
