use quill_types::Codec;

/// A column under construction, before it gets a name.
///
/// Start from a typed constructor and chain modifiers; every modifier
/// returns a fresh value.
///
/// ```
/// use quill_schema::Column;
///
/// let id = Column::integer().primary().auto_increment();
/// let email = Column::text().unique();
/// let bio = Column::text().nullable();
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    codec: Codec,
    primary: bool,
    unique: bool,
    auto: bool,
    default_sql: Option<String>,
}

impl Column {
    const fn with_codec(codec: Codec) -> Self {
        Self {
            codec,
            primary: false,
            unique: false,
            auto: false,
            default_sql: None,
        }
    }

    #[must_use]
    pub const fn text() -> Self {
        Self::with_codec(Codec::TEXT)
    }

    #[must_use]
    pub const fn integer() -> Self {
        Self::with_codec(Codec::INTEGER)
    }

    #[must_use]
    pub const fn real() -> Self {
        Self::with_codec(Codec::REAL)
    }

    #[must_use]
    pub const fn boolean() -> Self {
        Self::with_codec(Codec::BOOLEAN)
    }

    #[must_use]
    pub const fn date() -> Self {
        Self::with_codec(Codec::DATE)
    }

    #[must_use]
    pub const fn json() -> Self {
        Self::with_codec(Codec::JSON)
    }

    /// Mark this column as (part of) the primary key.
    #[must_use]
    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Add a UNIQUE constraint.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make the column nullable. Nullable columns cannot be primary.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.codec = self.codec.nullable();
        self
    }

    /// Mark an integer primary key as auto-incrementing. DML builders may
    /// omit a value for it.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto = true;
        self
    }

    /// Attach a raw SQL default, emitted verbatim after `DEFAULT`.
    #[must_use]
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_sql = Some(sql.into());
        self
    }

    pub(crate) fn into_spec(self, name: impl Into<String>) -> ColumnSpec {
        ColumnSpec {
            name: name.into(),
            codec: self.codec,
            primary: self.primary,
            unique: self.unique,
            auto: self.auto,
            default_sql: self.default_sql,
        }
    }
}

/// A named column of a declared table.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub codec: Codec,
    pub primary: bool,
    pub unique: bool,
    pub auto: bool,
    pub default_sql: Option<String>,
}

impl ColumnSpec {
    /// Whether the column accepts NULL.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.codec.is_nullable()
    }
}
