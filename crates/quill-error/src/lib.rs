use thiserror::Error;

/// Primary error type for quill operations.
///
/// Structured variants for common cases, with a coarse [`ErrorKind`]
/// classification for callers that dispatch on error category rather than
/// on the exact variant.
#[derive(Error, Debug)]
pub enum QuillError {
    // === Schema declaration errors ===
    /// Duplicate column name inside one table declaration.
    #[error("duplicate column name in table {table}: {column}")]
    DuplicateColumn { table: String, column: String },

    /// Duplicate table name inside one schema declaration.
    #[error("duplicate table name: {name}")]
    DuplicateTable { name: String },

    /// A table was declared without any primary key column.
    #[error("table {table} has no primary key column")]
    NoPrimaryKey { table: String },

    /// A primary key column was declared nullable.
    #[error("primary key column {table}.{column} may not be nullable")]
    NullablePrimary { table: String, column: String },

    /// More than one auto-increment column in one table.
    #[error("table {table} declares more than one auto-increment column")]
    MultipleAutoColumns { table: String },

    /// Auto-increment on a column that is not an integer primary key.
    #[error("column {table}.{column} must be an integer primary key to auto-increment")]
    BadAutoColumn { table: String, column: String },

    /// Reference to a table the schema does not contain.
    #[error("no such table: {name}")]
    UnknownTable { name: String },

    // === Query construction errors ===
    /// Reference to a column not present in the current column bag.
    #[error("no such column: {name}")]
    UnknownColumn { name: String },

    /// Reference to a join alias that was never introduced.
    #[error("no such join alias: {alias}")]
    UnknownAlias { alias: String },

    /// A join alias that is empty or already taken in the same query.
    #[error("join alias {alias:?} is empty or already in use")]
    DuplicateAlias { alias: String },

    /// An aggregate expression outside SELECT/HAVING/ORDER BY of a grouped query.
    #[error("aggregate {func} is not allowed in {clause}")]
    IllegalAggregate { func: String, clause: String },

    /// HAVING without GROUP BY.
    #[error("HAVING requires GROUP BY")]
    HavingWithoutGroupBy,

    /// `IN ()` with no elements.
    #[error("IN list requires at least one element")]
    EmptyInList,

    /// Arithmetic on a non-numeric operand, concat on a non-text operand, etc.
    #[error("operator {op} requires {expected} operands, got {actual}")]
    OperandType {
        op: String,
        expected: String,
        actual: String,
    },

    /// Duplicate projection alias in one SELECT list.
    #[error("duplicate projection alias: {alias}")]
    DuplicateProjection { alias: String },

    /// A subquery used as an IN set must project exactly one column.
    #[error("IN subquery must project exactly one column, got {count}")]
    SubqueryArity { count: usize },

    /// INSERT with no value rows.
    #[error("INSERT requires at least one row of values")]
    EmptyInsert,

    /// UPDATE with no SET assignments.
    #[error("UPDATE requires at least one assignment")]
    EmptyAssignment,

    /// INSERT omits a column that has no default, is not nullable, and is
    /// not auto-generated.
    #[error("missing value for column {table}.{column}")]
    MissingValue { table: String, column: String },

    /// Multi-row INSERT where a later row names different columns.
    #[error("INSERT rows into {table} must all name the same columns")]
    RowShapeMismatch { table: String },

    // === Codec errors ===
    /// A value incompatible with its codec, at serialize or parse time.
    #[error("codec {codec}: {detail}")]
    Codec { codec: String, detail: String },

    /// The same explicit parameter label bound to two different values.
    #[error("parameter :{label} bound to conflicting values")]
    ParamConflict { label: String },

    // === Result shaping errors ===
    /// `one` / `first` on an empty result set.
    #[error("query returned no rows")]
    EmptyResult,

    /// `one` / `maybe_one` on more than one row.
    #[error("expected at most one row, got {count}")]
    TooManyResults { count: usize },

    /// A result row is missing a column the plan expects.
    #[error("result row has no column named {column}")]
    MissingResultColumn { column: String },

    // === Driver ===
    /// Anything raised by the driver surface, wrapped.
    #[error("driver error: {message}")]
    Driver { message: String },
}

/// Coarse error classification, one entry per row of the error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    UnknownColumn,
    IllegalAggregate,
    Codec,
    EmptyResult,
    TooManyResults,
    Driver,
}

impl QuillError {
    /// Classify this error into its taxonomy kind.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateColumn { .. }
            | Self::DuplicateTable { .. }
            | Self::NoPrimaryKey { .. }
            | Self::NullablePrimary { .. }
            | Self::MultipleAutoColumns { .. }
            | Self::BadAutoColumn { .. }
            | Self::UnknownTable { .. } => ErrorKind::Schema,
            Self::UnknownColumn { .. }
            | Self::UnknownAlias { .. }
            | Self::DuplicateAlias { .. }
            | Self::EmptyInList
            | Self::OperandType { .. }
            | Self::DuplicateProjection { .. }
            | Self::SubqueryArity { .. }
            | Self::EmptyInsert
            | Self::EmptyAssignment
            | Self::MissingValue { .. }
            | Self::RowShapeMismatch { .. } => ErrorKind::UnknownColumn,
            Self::IllegalAggregate { .. } | Self::HavingWithoutGroupBy => {
                ErrorKind::IllegalAggregate
            }
            Self::Codec { .. } | Self::ParamConflict { .. } => ErrorKind::Codec,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::TooManyResults { .. } | Self::MissingResultColumn { .. } => {
                ErrorKind::TooManyResults
            }
            Self::Driver { .. } => ErrorKind::Driver,
        }
    }

    /// Whether the error comes from building or emitting a query (as opposed
    /// to running or shaping one). Build errors always indicate a bug in the
    /// calling code, not in the data.
    pub const fn is_build_error(&self) -> bool {
        !matches!(
            self,
            Self::EmptyResult
                | Self::TooManyResults { .. }
                | Self::MissingResultColumn { .. }
                | Self::Driver { .. }
        )
    }

    /// Create an `UnknownColumn` error.
    pub fn unknown_column(name: impl Into<String>) -> Self {
        Self::UnknownColumn { name: name.into() }
    }

    /// Create an `UnknownTable` error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Create a `Codec` error.
    pub fn codec(codec: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Codec {
            codec: codec.into(),
            detail: detail.into(),
        }
    }

    /// Create a `Driver` error from any displayable driver failure.
    pub fn driver(message: impl std::fmt::Display) -> Self {
        Self::Driver {
            message: message.to_string(),
        }
    }

    /// Create an `IllegalAggregate` error.
    pub fn illegal_aggregate(func: impl Into<String>, clause: impl Into<String>) -> Self {
        Self::IllegalAggregate {
            func: func.into(),
            clause: clause.into(),
        }
    }
}

/// Result type alias using `QuillError`.
pub type Result<T> = std::result::Result<T, QuillError>;
