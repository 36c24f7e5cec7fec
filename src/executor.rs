//! Statement execution.
//!
//! [`Executor`] is the seam between the query layer and a live connection.
//! Statements carry named parameters (`:c0`, `:pname`); each executor maps
//! them onto whatever its driver expects.

use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::query::value_conversion::{row_to_record, with_converted_params};
use crate::value::{display_value, Record, ValueKind};
use may_postgres::Client;
use sea_query::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

static LOG_SQL: AtomicBool = AtomicBool::new(true);

/// Turn statement logging under `pingorm::sql` on or off
pub fn set_log_sql(enabled: bool) {
    LOG_SQL.store(enabled, Ordering::Relaxed);
}

/// Log a statement at debug level unless disabled by configuration
pub fn log_statement(statement: &Statement) {
    if LOG_SQL.load(Ordering::Relaxed) {
        log::debug!(target: "pingorm::sql", "{statement}");
    }
}

/// One named parameter of a [`Statement`]
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub value: Value,
    pub kind: ValueKind,
}

/// SQL text with its named parameters, in binding order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<BoundParameter>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    /// Add a parameter; its kind is taken from the value
    pub fn bind(&mut self, name: String, value: Value) -> &mut Self {
        let kind = ValueKind::of(&value);
        self.parameters.push(BoundParameter { name, value, kind });
        self
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.bind(name.into(), value);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(|p| format!("{}={}", p.name, display_value(&p.value)))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " [{params}]")?;
        }
        Ok(())
    }
}

/// Trait for executing statements against a connection
///
/// Implemented by [`MayPostgresExecutor`], by sessions and transactions
/// (which delegate to their connection), and by
/// [`MockExecutor`](crate::testing::MockExecutor) in tests.
pub trait Executor {
    /// Dialect the connection speaks
    fn dialect(&self) -> Dialect;

    /// Run a query and materialize every row
    ///
    /// # Errors
    ///
    /// Returns `OrmError` if the statement fails or a row cannot be decoded.
    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError>;

    /// Run a statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `OrmError` if the statement fails.
    fn execute(&self, statement: &Statement) -> Result<u64, OrmError>;

    /// First column of the first row, or `None` when no row comes back
    ///
    /// # Errors
    ///
    /// Returns `OrmError` if the statement fails.
    fn query_scalar(&self, statement: &Statement) -> Result<Option<Value>, OrmError> {
        Ok(self
            .query_all(statement)?
            .into_iter()
            .next()
            .and_then(|record| record.into_values().into_iter().next()))
    }

    /// Run parameterless SQL such as `BEGIN` or `SAVEPOINT sp_1`
    ///
    /// # Errors
    ///
    /// Returns `OrmError` if the statement fails.
    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        self.execute(&Statement::new(sql)).map(|_| ())
    }
}

impl<T: Executor + ?Sized> Executor for &T {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError> {
        (**self).query_all(statement)
    }

    fn execute(&self, statement: &Statement) -> Result<u64, OrmError> {
        (**self).execute(statement)
    }

    fn query_scalar(&self, statement: &Statement) -> Result<Option<Value>, OrmError> {
        (**self).query_scalar(statement)
    }

    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        (**self).execute_raw(sql)
    }
}

impl<T: Executor + ?Sized> Executor for std::sync::Arc<T> {
    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError> {
        (**self).query_all(statement)
    }

    fn execute(&self, statement: &Statement) -> Result<u64, OrmError> {
        (**self).execute(statement)
    }

    fn query_scalar(&self, statement: &Statement) -> Result<Option<Value>, OrmError> {
        (**self).query_scalar(statement)
    }

    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        (**self).execute_raw(sql)
    }
}

/// Rewrite `:name` parameters to Postgres `$n` positions.
///
/// Returns the rewritten SQL and the parameter names in position order. A
/// name used twice keeps its first position. `::` casts and anything inside
/// single or double quotes are left alone.
///
/// # Errors
///
/// Returns `OrmError::QueryError` if the SQL names a parameter the statement
/// does not bind.
pub fn to_positional(statement: &Statement) -> Result<(String, Vec<&str>), OrmError> {
    let sql = &statement.sql;
    let mut out = String::with_capacity(sql.len());
    let mut order: Vec<&str> = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((index, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            ':' if matches!(chars.peek(), Some((_, ':'))) => {
                out.push_str("::");
                chars.next();
            }
            ':' if matches!(chars.peek(), Some((_, n)) if n.is_ascii_alphabetic() || *n == '_') => {
                let start = index + 1;
                let mut end = start;
                while let Some((i, n)) = chars.peek().copied() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        end = i + n.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];
                let bound = statement.parameter(name).ok_or_else(|| {
                    OrmError::QueryError(format!("parameter ':{name}' is not bound"))
                })?;
                let position = match order.iter().position(|n| *n == bound.name) {
                    Some(position) => position,
                    None => {
                        order.push(bound.name.as_str());
                        order.len() - 1
                    }
                };
                out.push('$');
                out.push_str(&(position + 1).to_string());
            }
            _ => out.push(c),
        }
    }
    Ok((out, order))
}

/// Executor over a `may_postgres::Client`
#[derive(Clone)]
pub struct MayPostgresExecutor {
    client: Client,
}

impl MayPostgresExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    fn run<R>(
        &self,
        statement: &Statement,
        f: impl FnOnce(&Client, &str, &[&dyn may_postgres::types::ToSql]) -> Result<R, OrmError>,
    ) -> Result<R, OrmError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(&statement.sql).entered();

        log_statement(statement);

        let start = Instant::now();
        let result = to_positional(statement).and_then(|(sql, order)| {
            let values = order
                .iter()
                .filter_map(|name| statement.parameter(name).map(|p| &p.value))
                .collect::<Vec<_>>();
            with_converted_params(&values, |params| f(&self.client, &sql, params))
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(duration);

        if let Err(err) = &result {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
            log::error!(target: "pingorm::sql", "{err} while executing {}", statement.sql);
        }
        result
    }
}

impl Executor for MayPostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError> {
        self.run(statement, |client, sql, params| {
            client
                .query(sql, params)?
                .iter()
                .map(row_to_record)
                .collect()
        })
    }

    fn execute(&self, statement: &Statement) -> Result<u64, OrmError> {
        self.run(statement, |client, sql, params| Ok(client.execute(sql, params)?))
    }

    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        self.run(&Statement::new(sql), |client, sql, params| {
            client.execute(sql, params)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(sql: &str, names: &[&str]) -> Statement {
        let mut statement = Statement::new(sql);
        for (i, name) in names.iter().enumerate() {
            statement.bind((*name).to_string(), Value::Int(Some(i as i32)));
        }
        statement
    }

    #[test]
    fn test_rewrites_named_parameters_in_order() {
        let s = statement(
            "SELECT * FROM \"users\" WHERE ((\"id\" = :c0) AND (\"name\" = :pname))",
            &["c0", "pname"],
        );
        let (sql, order) = to_positional(&s).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE ((\"id\" = $1) AND (\"name\" = $2))"
        );
        assert_eq!(order, vec!["c0", "pname"]);
    }

    #[test]
    fn test_repeated_name_reuses_position() {
        let s = statement("SELECT :p0, :p1, :p0", &["p0", "p1"]);
        let (sql, order) = to_positional(&s).unwrap();
        assert_eq!(sql, "SELECT $1, $2, $1");
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_casts_and_literals_untouched() {
        let s = statement("SELECT ':c0', \"a:b\", x::int FROM t WHERE y = :c0", &["c0"]);
        let (sql, _) = to_positional(&s).unwrap();
        assert_eq!(sql, "SELECT ':c0', \"a:b\", x::int FROM t WHERE y = $1");
    }

    #[test]
    fn test_prefix_names_are_distinct() {
        let s = statement("WHERE a IN (:pids0, :pids1) AND b = :pids", &["pids0", "pids1", "pids"]);
        let (sql, order) = to_positional(&s).unwrap();
        assert_eq!(sql, "WHERE a IN ($1, $2) AND b = $3");
        assert_eq!(order, vec!["pids0", "pids1", "pids"]);
    }

    #[test]
    fn test_unbound_parameter_is_an_error() {
        let s = statement("SELECT :missing", &[]);
        let err = to_positional(&s).unwrap_err();
        assert!(err.to_string().contains("':missing' is not bound"));
    }

    #[test]
    fn test_statement_display_lists_parameters() {
        let s = Statement::new("SELECT :c0").with("c0", Value::String(Some("Matt".to_string())));
        assert_eq!(s.parameters[0].kind, ValueKind::String);
        assert!(s.to_string().starts_with("SELECT :c0 ["));
        assert!(s.to_string().contains("c0="));
    }
}
