//! Canonical SQL pretty-printer.
//!
//! [`format_sql`] normalizes whitespace so two semantically identical
//! emissions compare equal: each top-level clause on its own line, nested
//! clauses indented two spaces per subquery depth, single spaces elsewhere.
//! The formatter is idempotent: `format_sql(format_sql(s)) == format_sql(s)`.

/// Clause starters that begin a new line. Multi-word entries first so the
/// longest match wins.
const CLAUSE_KEYWORDS: [&str; 10] = [
    "INNER JOIN",
    "LEFT JOIN",
    "GROUP BY",
    "ORDER BY",
    "SELECT",
    "FROM",
    "WHERE",
    "HAVING",
    "LIMIT",
    "WITH",
];

/// Reformat a SQL string into the canonical clause-per-line layout.
#[must_use]
pub fn format_sql(sql: &str) -> String {
    let flat = normalize_whitespace(sql);
    let mut out = String::with_capacity(flat.len() + 64);
    let mut depth: usize = 0;
    let mut i = 0;

    while i < flat.len() {
        let ch = flat[i..].chars().next().expect("offset on char boundary");
        match ch {
            '\'' | '"' => {
                let end = skip_quoted(&flat, i, ch);
                out.push_str(&flat[i..end]);
                i = end;
            }
            '(' => {
                depth += 1;
                out.push(ch);
                i += 1;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                out.push(ch);
                i += 1;
            }
            _ => {
                if at_word_boundary(flat.as_bytes(), i) {
                    if let Some(keyword) = match_clause_keyword(&flat, i) {
                        if !out.is_empty() {
                            while out.ends_with(' ') {
                                out.pop();
                            }
                            out.push('\n');
                            for _ in 0..depth {
                                out.push_str("  ");
                            }
                        }
                        out.push_str(keyword);
                        i += keyword.len();
                        continue;
                    }
                }
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    out
}

/// Collapse all whitespace runs outside quotes into single spaces.
fn normalize_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    while i < sql.len() {
        let ch = sql[i..].chars().next().expect("offset on char boundary");
        match ch {
            '\'' | '"' => {
                let end = skip_quoted(sql, i, ch);
                out.push_str(&sql[i..end]);
                i = end;
            }
            c if c.is_whitespace() => {
                while i < sql.len()
                    && sql[i..]
                        .chars()
                        .next()
                        .is_some_and(char::is_whitespace)
                {
                    i += sql[i..].chars().next().expect("char present").len_utf8();
                }
                if !out.is_empty() && i < sql.len() {
                    out.push(' ');
                }
            }
            c => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Byte offset one past the end of the quoted token starting at `start`.
/// Doubled quote characters escape themselves.
fn skip_quoted(sql: &str, start: usize, quote: char) -> usize {
    let bytes = sql.as_bytes();
    let q = quote as u8;
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == q {
            if i + 1 < bytes.len() && bytes[i + 1] == q {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn at_word_boundary(bytes: &[u8], i: usize) -> bool {
    i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_')
}

fn match_clause_keyword(sql: &str, i: usize) -> Option<&'static str> {
    let rest = &sql[i..];
    CLAUSE_KEYWORDS.iter().copied().find(|keyword| {
        rest.starts_with(keyword)
            && rest[keyword.len()..]
                .bytes()
                .next()
                .map_or(true, |b| !(b.is_ascii_alphanumeric() || b == b'_'))
    })
}
