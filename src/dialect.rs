//! SQL dialects: identifier quoting, parameter tokens, type names and the
//! statement shapes that differ between providers.

use crate::error::OrmError;
use crate::value::ValueKind;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Database provider whose SQL conventions are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
    #[serde(alias = "mssql")]
    SqlServer,
}

static ACTIVE_DIALECT: OnceCell<Dialect> = OnceCell::new();

/// Fix the process-wide dialect used by [`QueryBuilder::new`](crate::QueryBuilder::new).
///
/// The provider is chosen once at startup. A second call with a different
/// dialect is rejected so descriptors built earlier stay valid.
///
/// # Errors
///
/// Returns `OrmError::ConfigError` if another dialect was already activated.
pub fn set_active_dialect(dialect: Dialect) -> Result<(), OrmError> {
    let active = ACTIVE_DIALECT.get_or_init(|| dialect);
    if *active == dialect {
        Ok(())
    } else {
        Err(OrmError::ConfigError(format!(
            "dialect already set to {active}, cannot switch to {dialect}"
        )))
    }
}

/// Process-wide dialect, `Postgres` unless configured otherwise
pub fn active_dialect() -> Dialect {
    ACTIVE_DIALECT.get().copied().unwrap_or_default()
}

impl Dialect {
    /// Sigil that introduces a named parameter token
    pub fn parameter_sigil(self) -> char {
        match self {
            Dialect::Postgres => ':',
            Dialect::MySql | Dialect::SqlServer => '@',
        }
    }

    /// Quote an identifier, doubling any embedded closing quote
    pub fn escape_identifier(self, name: &str) -> String {
        let (open, close) = match self {
            Dialect::Postgres => ('"', '"'),
            Dialect::MySql => ('`', '`'),
            Dialect::SqlServer => ('[', ']'),
        };
        let mut quoted = String::with_capacity(name.len() + 2);
        quoted.push(open);
        for c in name.chars() {
            if c == close {
                quoted.push(close);
            }
            quoted.push(c);
        }
        quoted.push(close);
        quoted
    }

    /// Parameter name for `name`: `c<name>` for anonymous constants, `p<name>` otherwise
    pub fn parameter_name(name: &str, anonymous: bool) -> String {
        if anonymous {
            format!("c{name}")
        } else {
            format!("p{name}")
        }
    }

    /// Placeholder token as it appears in SQL text
    pub fn parameter_token(self, name: &str, anonymous: bool) -> String {
        self.token_for(&Self::parameter_name(name, anonymous))
    }

    /// Token for an already-prefixed parameter name
    pub fn token_for(self, parameter_name: &str) -> String {
        format!("{}{}", self.parameter_sigil(), parameter_name)
    }

    /// Column type name for a value kind
    pub fn sql_type(self, kind: ValueKind) -> &'static str {
        match (self, kind) {
            (Dialect::Postgres, ValueKind::String) => "VARCHAR",
            (Dialect::MySql, ValueKind::String) => "VARCHAR",
            (Dialect::SqlServer, ValueKind::String) => "NVARCHAR",
            (_, ValueKind::Int16) => "SMALLINT",
            (Dialect::Postgres, ValueKind::Int32) => "INTEGER",
            (_, ValueKind::Int32) => "INT",
            (_, ValueKind::Int64) => "BIGINT",
            (Dialect::Postgres, ValueKind::Decimal) => "NUMERIC",
            (_, ValueKind::Decimal) => "DECIMAL",
            (Dialect::Postgres, ValueKind::Double) => "DOUBLE PRECISION",
            (Dialect::MySql, ValueKind::Double) => "DOUBLE",
            (Dialect::SqlServer, ValueKind::Double) => "FLOAT",
            (Dialect::Postgres, ValueKind::DateTime) => "TIMESTAMP",
            (Dialect::MySql, ValueKind::DateTime) => "DATETIME",
            (Dialect::SqlServer, ValueKind::DateTime) => "DATETIME2",
            (Dialect::Postgres, ValueKind::Boolean) => "BOOLEAN",
            (Dialect::MySql, ValueKind::Boolean) => "TINYINT(1)",
            (Dialect::SqlServer, ValueKind::Boolean) => "BIT",
            (Dialect::Postgres, ValueKind::Guid) => "UUID",
            (Dialect::MySql, ValueKind::Guid) => "CHAR(36)",
            (Dialect::SqlServer, ValueKind::Guid) => "UNIQUEIDENTIFIER",
        }
    }

    /// Case-insensitive LIKE between two rendered operands
    pub fn like(self, receiver: &str, pattern: &str) -> String {
        match self {
            Dialect::Postgres => format!("({receiver} ILIKE {pattern})"),
            Dialect::MySql | Dialect::SqlServer => {
                format!("(LOWER({receiver}) LIKE LOWER({pattern}))")
            }
        }
    }

    /// Append pagination to a SELECT. Zero means "not set".
    pub fn paginate(self, sql: &mut String, has_order_by: bool, offset: u64, limit: u64) {
        match self {
            Dialect::Postgres => {
                if offset > 0 {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
                if limit > 0 {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
            }
            Dialect::MySql => {
                if limit > 0 {
                    sql.push_str(&format!(" LIMIT {limit}"));
                } else if offset > 0 {
                    sql.push_str(&format!(" LIMIT {}", u64::MAX));
                }
                if offset > 0 {
                    sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
            Dialect::SqlServer => {
                if offset == 0 && limit == 0 {
                    return;
                }
                if !has_order_by {
                    sql.push_str(" ORDER BY (SELECT NULL)");
                }
                sql.push_str(&format!(" OFFSET {offset} ROWS"));
                if limit > 0 {
                    sql.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
            }
        }
    }

    /// Statement returning the next value of a sequence
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnsupportedDialect` for MySQL, which has no sequences.
    pub fn next_sequence_value(self, sequence: &str) -> Result<String, OrmError> {
        match self {
            Dialect::Postgres => Ok(format!(
                "SELECT nextval('{}')",
                self.escape_identifier(sequence).replace('\'', "''")
            )),
            Dialect::SqlServer => Ok(format!(
                "SELECT NEXT VALUE FOR {}",
                self.escape_identifier(sequence)
            )),
            Dialect::MySql => Err(OrmError::UnsupportedDialect(format!(
                "sequence '{sequence}' cannot be used with MySQL"
            ))),
        }
    }

    /// How generated column values are read back after an insert
    pub fn identity_fetch(self) -> IdentityFetch {
        match self {
            Dialect::Postgres => IdentityFetch::Returning,
            Dialect::SqlServer => IdentityFetch::OutputInserted,
            Dialect::MySql => IdentityFetch::LastInsertId,
        }
    }
}

/// Strategy for reading auto-generated values after an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityFetch {
    /// `INSERT ... RETURNING "col"` yields a row
    Returning,
    /// `INSERT ... OUTPUT INSERTED.[col] VALUES ...` yields a row
    OutputInserted,
    /// Follow-up `SELECT LAST_INSERT_ID()` scalar; single column only
    LastInsertId,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
            Dialect::SqlServer => "sqlserver",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier_per_dialect() {
        assert_eq!(Dialect::Postgres.escape_identifier("users"), "\"users\"");
        assert_eq!(Dialect::MySql.escape_identifier("users"), "`users`");
        assert_eq!(Dialect::SqlServer.escape_identifier("users"), "[users]");
        assert_eq!(Dialect::Postgres.escape_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_parameter_tokens() {
        assert_eq!(Dialect::Postgres.parameter_token("0", true), ":c0");
        assert_eq!(Dialect::Postgres.parameter_token("id", false), ":pid");
        assert_eq!(Dialect::MySql.parameter_token("id", false), "@pid");
        assert_eq!(Dialect::SqlServer.parameter_token("3", true), "@c3");
    }

    #[test]
    fn test_sql_types() {
        assert_eq!(Dialect::Postgres.sql_type(ValueKind::String), "VARCHAR");
        assert_eq!(Dialect::Postgres.sql_type(ValueKind::Int32), "INTEGER");
        assert_eq!(Dialect::Postgres.sql_type(ValueKind::DateTime), "TIMESTAMP");
        assert_eq!(Dialect::SqlServer.sql_type(ValueKind::Boolean), "BIT");
        assert_eq!(Dialect::MySql.sql_type(ValueKind::Int64), "BIGINT");
    }

    #[test]
    fn test_pagination_order() {
        let mut sql = String::from("SELECT 1");
        Dialect::Postgres.paginate(&mut sql, false, 20, 10);
        assert_eq!(sql, "SELECT 1 OFFSET 20 LIMIT 10");

        let mut sql = String::from("SELECT 1");
        Dialect::MySql.paginate(&mut sql, false, 20, 10);
        assert_eq!(sql, "SELECT 1 LIMIT 10 OFFSET 20");

        let mut sql = String::from("SELECT 1");
        Dialect::SqlServer.paginate(&mut sql, false, 0, 5);
        assert_eq!(sql, "SELECT 1 ORDER BY (SELECT NULL) OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY");

        let mut sql = String::from("SELECT 1");
        Dialect::Postgres.paginate(&mut sql, false, 0, 0);
        assert_eq!(sql, "SELECT 1");
    }

    #[test]
    fn test_sequences() {
        assert_eq!(
            Dialect::Postgres.next_sequence_value("seq_users").unwrap(),
            "SELECT nextval('\"seq_users\"')"
        );
        assert!(Dialect::MySql.next_sequence_value("seq_users").is_err());
    }

    #[test]
    fn test_like_is_case_insensitive() {
        assert_eq!(Dialect::Postgres.like("\"name\"", ":c0"), "(\"name\" ILIKE :c0)");
        assert_eq!(
            Dialect::MySql.like("`name`", "@c0"),
            "(LOWER(`name`) LIKE LOWER(@c0))"
        );
    }

    #[test]
    fn test_deserialize_dialect_names() {
        let d: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(d, Dialect::Postgres);
        let d: Dialect = serde_json::from_str("\"mssql\"").unwrap();
        assert_eq!(d, Dialect::SqlServer);
    }
}
