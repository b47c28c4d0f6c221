use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use quill_error::{QuillError, Result};

use crate::value::{SqlValue, Value};

/// The six base codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CodecKind {
    Text,
    Integer,
    Real,
    /// Stored as INTEGER 0/1; parses 0/1 only.
    Boolean,
    /// Stored as ISO-8601 UTC text; strict parse.
    Date,
    /// Stored as canonical JSON text.
    Json,
}

/// How one column or expression value maps to a single SQL cell.
///
/// A codec is a value: copy it, flip it nullable, compare it. All standard
/// codecs are constants (`Codec::TEXT`, `Codec::INTEGER`, ...); nullable
/// variants come from [`Codec::nullable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Codec {
    kind: CodecKind,
    nullable: bool,
}

impl Codec {
    pub const TEXT: Self = Self::new(CodecKind::Text);
    pub const INTEGER: Self = Self::new(CodecKind::Integer);
    pub const REAL: Self = Self::new(CodecKind::Real);
    pub const BOOLEAN: Self = Self::new(CodecKind::Boolean);
    pub const DATE: Self = Self::new(CodecKind::Date);
    pub const JSON: Self = Self::new(CodecKind::Json);

    const fn new(kind: CodecKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    /// The nullable variant of this codec: accepts and produces NULL.
    #[must_use]
    pub const fn nullable(self) -> Self {
        Self {
            kind: self.kind,
            nullable: true,
        }
    }

    #[must_use]
    pub const fn kind(self) -> CodecKind {
        self.kind
    }

    #[must_use]
    pub const fn is_nullable(self) -> bool {
        self.nullable
    }

    /// Base codec name, without the nullability marker.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.kind {
            CodecKind::Text => "text",
            CodecKind::Integer => "integer",
            CodecKind::Real => "real",
            CodecKind::Boolean => "boolean",
            CodecKind::Date => "date",
            CodecKind::Json => "json",
        }
    }

    /// The SQL column type this codec maps to in DDL.
    #[must_use]
    pub const fn sql_type(self) -> &'static str {
        match self.kind {
            CodecKind::Integer | CodecKind::Boolean => "INTEGER",
            CodecKind::Real => "REAL",
            CodecKind::Text | CodecKind::Date | CodecKind::Json => "TEXT",
        }
    }

    /// Whether arithmetic operators apply to values of this codec.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self.kind, CodecKind::Integer | CodecKind::Real)
    }

    /// Whether `||` concatenation applies to values of this codec.
    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self.kind, CodecKind::Text)
    }

    /// Serialize an application value into a SQL cell.
    #[allow(clippy::cast_precision_loss)]
    pub fn serialize(self, value: &Value) -> Result<SqlValue> {
        if value.is_null() {
            return if self.nullable {
                Ok(SqlValue::Null)
            } else {
                Err(self.bad_value(value))
            };
        }
        match (self.kind, value) {
            (CodecKind::Text, Value::Text(s)) => Ok(SqlValue::Text(s.clone())),
            (CodecKind::Integer, Value::Int(i)) => Ok(SqlValue::Integer(*i)),
            (CodecKind::Real, Value::Real(r)) => Ok(SqlValue::Real(*r)),
            (CodecKind::Real, Value::Int(i)) => Ok(SqlValue::Real(*i as f64)),
            (CodecKind::Boolean, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
            (CodecKind::Date, Value::Date(d)) => Ok(SqlValue::Text(iso8601(d))),
            (CodecKind::Json, Value::Json(j)) => {
                let text = serde_json::to_string(j).map_err(|error| {
                    QuillError::codec(self.name(), format!("encode failed: {error}"))
                })?;
                Ok(SqlValue::Text(text))
            }
            _ => Err(self.bad_value(value)),
        }
    }

    /// Parse a SQL cell back into an application value.
    #[allow(clippy::cast_precision_loss)]
    pub fn parse(self, cell: &SqlValue) -> Result<Value> {
        if cell.is_null() {
            return if self.nullable {
                Ok(Value::Null)
            } else {
                Err(self.bad_cell(cell))
            };
        }
        match (self.kind, cell) {
            (CodecKind::Text, SqlValue::Text(s)) => Ok(Value::Text(s.clone())),
            (CodecKind::Integer, SqlValue::Integer(i)) => Ok(Value::Int(*i)),
            (CodecKind::Real, SqlValue::Real(r)) => Ok(Value::Real(*r)),
            (CodecKind::Real, SqlValue::Integer(i)) => Ok(Value::Real(*i as f64)),
            (CodecKind::Boolean, SqlValue::Integer(0)) => Ok(Value::Bool(false)),
            (CodecKind::Boolean, SqlValue::Integer(1)) => Ok(Value::Bool(true)),
            (CodecKind::Boolean, SqlValue::Integer(other)) => Err(QuillError::codec(
                self.name(),
                format!("expected 0 or 1, got {other}"),
            )),
            (CodecKind::Date, SqlValue::Text(s)) => DateTime::parse_from_rfc3339(s)
                .map(|d| Value::Date(d.with_timezone(&Utc)))
                .map_err(|error| {
                    QuillError::codec(self.name(), format!("invalid ISO-8601 text {s:?}: {error}"))
                }),
            (CodecKind::Json, SqlValue::Text(s)) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|error| {
                    QuillError::codec(self.name(), format!("invalid JSON text: {error}"))
                }),
            // SQLite JSON functions can hand back bare numbers for scalar
            // extractions; accept them.
            (CodecKind::Json, SqlValue::Integer(i)) => {
                Ok(Value::Json(serde_json::Value::from(*i)))
            }
            (CodecKind::Json, SqlValue::Real(r)) => Ok(Value::Json(serde_json::Value::from(*r))),
            _ => Err(self.bad_cell(cell)),
        }
    }

    fn bad_value(self, value: &Value) -> QuillError {
        QuillError::codec(
            self.name(),
            format!("cannot serialize {} value", value.type_name()),
        )
    }

    fn bad_cell(self, cell: &SqlValue) -> QuillError {
        QuillError::codec(
            self.name(),
            format!("cannot parse {} cell", cell.type_name()),
        )
    }
}

/// `Display` shows the base name plus a `?` marker for nullable variants.
impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        if self.nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

/// Canonical ISO-8601 rendering: millisecond precision, `Z` suffix.
fn iso8601(d: &DateTime<Utc>) -> String {
    d.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn boolean_round_trip() {
        let ser = Codec::BOOLEAN.serialize(&Value::Bool(true)).unwrap();
        assert_eq!(ser, SqlValue::Integer(1));
        assert_eq!(Codec::BOOLEAN.parse(&ser).unwrap(), Value::Bool(true));

        let ser = Codec::BOOLEAN.serialize(&Value::Bool(false)).unwrap();
        assert_eq!(ser, SqlValue::Integer(0));
        assert_eq!(Codec::BOOLEAN.parse(&ser).unwrap(), Value::Bool(false));
    }

    #[test]
    fn boolean_rejects_other_integers() {
        let err = Codec::BOOLEAN.parse(&SqlValue::Integer(7)).unwrap_err();
        assert_eq!(err.to_string(), "codec boolean: expected 0 or 1, got 7");
    }

    #[test]
    fn date_round_trip() {
        let d = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let ser = Codec::DATE.serialize(&Value::Date(d)).unwrap();
        assert_eq!(ser, SqlValue::Text("2024-03-01T12:30:00.000Z".to_owned()));
        assert_eq!(Codec::DATE.parse(&ser).unwrap(), Value::Date(d));
    }

    #[test]
    fn date_rejects_loose_text() {
        assert!(Codec::DATE
            .parse(&SqlValue::Text("yesterday".to_owned()))
            .is_err());
        assert!(Codec::DATE
            .parse(&SqlValue::Text("2024-03-01".to_owned()))
            .is_err());
    }

    #[test]
    fn json_round_trip() {
        let doc = serde_json::json!({"id": 1, "tags": ["a", "b"]});
        let ser = Codec::JSON.serialize(&Value::Json(doc.clone())).unwrap();
        assert_eq!(Codec::JSON.parse(&ser).unwrap(), Value::Json(doc));
    }

    #[test]
    fn json_accepts_bare_numbers() {
        assert_eq!(
            Codec::JSON.parse(&SqlValue::Integer(3)).unwrap(),
            Value::Json(serde_json::json!(3))
        );
    }

    #[test]
    fn nullability_is_enforced() {
        assert!(Codec::TEXT.serialize(&Value::Null).is_err());
        assert_eq!(
            Codec::TEXT.nullable().serialize(&Value::Null).unwrap(),
            SqlValue::Null
        );
        assert!(Codec::INTEGER.parse(&SqlValue::Null).is_err());
        assert_eq!(
            Codec::INTEGER.nullable().parse(&SqlValue::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn real_accepts_integer_cells() {
        assert_eq!(
            Codec::REAL.parse(&SqlValue::Integer(2)).unwrap(),
            Value::Real(2.0)
        );
    }

    #[test]
    fn sql_type_mapping() {
        assert_eq!(Codec::TEXT.sql_type(), "TEXT");
        assert_eq!(Codec::INTEGER.sql_type(), "INTEGER");
        assert_eq!(Codec::REAL.sql_type(), "REAL");
        assert_eq!(Codec::BOOLEAN.sql_type(), "INTEGER");
        assert_eq!(Codec::DATE.sql_type(), "TEXT");
        assert_eq!(Codec::JSON.sql_type(), "TEXT");
    }

    #[test]
    fn display_marks_nullable() {
        assert_eq!(Codec::TEXT.to_string(), "text");
        assert_eq!(Codec::TEXT.nullable().to_string(), "text?");
    }

    #[test]
    fn type_mismatch_is_codec_error() {
        let err = Codec::INTEGER.serialize(&Value::Text("x".to_owned())).unwrap_err();
        assert_eq!(err.kind(), quill_error::ErrorKind::Codec);
    }

    mod proptest_round_trip {
        use super::*;
        use proptest::prelude::*;

        fn arb_text() -> BoxedStrategy<String> {
            // Printable strings including quotes, to exercise escaping paths.
            prop::string::string_regex("[ -~]{0,24}")
                .expect("valid regex")
                .boxed()
        }

        proptest::proptest! {
            #[test]
            fn text_round_trip(s in arb_text()) {
                let v = Value::Text(s);
                let cell = Codec::TEXT.serialize(&v).unwrap();
                prop_assert_eq!(Codec::TEXT.parse(&cell).unwrap(), v);
            }

            #[test]
            fn integer_round_trip(n in any::<i64>()) {
                let v = Value::Int(n);
                let cell = Codec::INTEGER.serialize(&v).unwrap();
                prop_assert_eq!(Codec::INTEGER.parse(&cell).unwrap(), v);
            }

            #[test]
            fn real_round_trip(r in proptest::num::f64::NORMAL) {
                let v = Value::Real(r);
                let cell = Codec::REAL.serialize(&v).unwrap();
                prop_assert_eq!(Codec::REAL.parse(&cell).unwrap(), v);
            }

            #[test]
            fn date_round_trip(secs in 0i64..4_102_444_800, millis in 0u32..1000) {
                let d = chrono::DateTime::<Utc>::from_timestamp(secs, millis * 1_000_000).unwrap();
                let v = Value::Date(d);
                let cell = Codec::DATE.serialize(&v).unwrap();
                prop_assert_eq!(Codec::DATE.parse(&cell).unwrap(), v);
            }
        }
    }
}
