use std::fmt::Write as _;

use quill_types::sql_ident::quote_ident;

use crate::table::TableSpec;

/// Options for `CREATE TABLE` emission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DdlOptions {
    /// Emit `IF NOT EXISTS`.
    pub if_not_exists: bool,
    /// Emit the `STRICT` table option.
    pub strict: bool,
}

/// Render one `CREATE TABLE` statement.
///
/// A single primary column gets an inline `PRIMARY KEY`; a composite
/// primary key becomes a trailing `PRIMARY KEY(c1, c2)` clause.
pub(crate) fn create_table_sql(table: &TableSpec, options: &DdlOptions) -> String {
    let primaries = table.primary_columns();
    let inline_primary = primaries.len() == 1;

    let mut sql = String::from("CREATE TABLE ");
    if options.if_not_exists {
        sql.push_str("IF NOT EXISTS ");
    }
    sql.push_str(&quote_ident(table.name()));
    sql.push_str(" (");

    for (i, col) in table.columns().iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "{} {}", quote_ident(&col.name), col.codec.sql_type());
        if col.primary && inline_primary {
            sql.push_str(" PRIMARY KEY");
            if col.auto {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if !col.is_nullable() && !(col.primary && inline_primary) {
            sql.push_str(" NOT NULL");
        }
        if col.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &col.default_sql {
            let _ = write!(sql, " DEFAULT {default}");
        }
    }

    if !inline_primary {
        sql.push_str(", PRIMARY KEY(");
        for (i, name) in primaries.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&quote_ident(name));
        }
        sql.push(')');
    }

    sql.push(')');
    if options.strict {
        sql.push_str(" STRICT");
    }
    sql
}
