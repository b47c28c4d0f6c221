//! SQL identifier quoting.
//!
//! An identifier is emitted bare only when it is shaped like a plain
//! identifier *and* is not a reserved word; everything else is
//! double-quoted with `""` escaping.

/// Reserved words that would change meaning if emitted bare, even though
/// they are identifier-shaped. Matched case-insensitively.
const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "autoincrement", "between", "by", "case", "cast", "check",
    "collate", "create", "cross", "default", "delete", "desc", "distinct", "drop", "else", "end",
    "escape", "except", "exists", "foreign", "from", "group", "having", "in", "index", "inner",
    "insert", "intersect", "into", "is", "join", "key", "left", "like", "limit", "not", "null",
    "offset", "on", "or", "order", "outer", "primary", "references", "select", "set", "table",
    "then", "union", "unique", "update", "values", "when", "where", "with",
];

fn is_reserved(name: &str) -> bool {
    RESERVED.iter().any(|word| word.eq_ignore_ascii_case(name))
}

/// Whether the name must be double-quoted to survive as an identifier:
/// empty, not starting with a letter or underscore, containing anything
/// beyond ASCII alphanumerics and underscores, or a reserved word.
#[must_use]
pub fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return true;
    }
    if chars.any(|c| !(c.is_ascii_alphanumeric() || c == '_')) {
        return true;
    }
    is_reserved(name)
}

/// Render an identifier, quoting only when required.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    if needs_quoting(name) {
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push('"');
        for c in name.chars() {
            if c == '"' {
                quoted.push('"');
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    } else {
        name.to_owned()
    }
}
