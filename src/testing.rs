//! In-memory executor for tests.
//!
//! [`MockExecutor`] records every statement it receives and answers from a
//! queue of canned responses. Transaction control (`execute_raw`) is recorded
//! but never consumes a response.

use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::executor::{Executor, Statement};
use crate::value::Record;
use parking_lot::Mutex;
use sea_query::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
enum Response {
    Rows(Vec<Record>),
    Affected(u64),
    Error(String),
}

#[derive(Debug, Default)]
pub struct MockExecutor {
    dialect: Dialect,
    statements: Mutex<Vec<Statement>>,
    responses: Mutex<VecDeque<Response>>,
}

impl MockExecutor {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn push_rows(&self, rows: Vec<Record>) {
        self.responses.lock().push_back(Response::Rows(rows));
    }

    /// Queue a one-row, one-column result
    pub fn push_scalar(&self, value: Value) {
        let mut record = Record::new();
        record.push("value", value);
        self.push_rows(vec![record]);
    }

    pub fn push_affected(&self, count: u64) {
        self.responses.lock().push_back(Response::Affected(count));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.responses.lock().push_back(Response::Error(message.into()));
    }

    /// Every statement received so far, oldest first
    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.statements.lock().last().cloned()
    }

    /// SQL text of every statement received so far
    pub fn sql_log(&self) -> Vec<String> {
        self.statements.lock().iter().map(|s| s.sql.clone()).collect()
    }

    fn next(&self, statement: &Statement) -> Option<Response> {
        self.statements.lock().push(statement.clone());
        self.responses.lock().pop_front()
    }
}

impl Executor for MockExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError> {
        match self.next(statement) {
            Some(Response::Rows(rows)) => Ok(rows),
            Some(Response::Affected(_)) | None => Ok(Vec::new()),
            Some(Response::Error(message)) => Err(OrmError::QueryError(message)),
        }
    }

    fn execute(&self, statement: &Statement) -> Result<u64, OrmError> {
        match self.next(statement) {
            Some(Response::Affected(count)) => Ok(count),
            Some(Response::Rows(rows)) => Ok(rows.len() as u64),
            None => Ok(0),
            Some(Response::Error(message)) => Err(OrmError::QueryError(message)),
        }
    }

    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        self.statements.lock().push(Statement::new(sql));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responses_are_consumed_in_order() {
        let executor = MockExecutor::new(Dialect::Postgres);
        executor.push_affected(3);
        executor.push_error("boom");

        assert_eq!(executor.execute(&Statement::new("UPDATE t SET a = 1")).unwrap(), 3);
        let err = executor.execute(&Statement::new("DELETE FROM t")).unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(executor.execute(&Statement::new("DELETE FROM t")).unwrap(), 0);
        assert_eq!(executor.statements().len(), 3);
    }

    #[test]
    fn test_raw_statements_do_not_consume_responses() {
        let executor = MockExecutor::new(Dialect::Postgres);
        executor.push_scalar(Value::BigInt(Some(9)));
        executor.execute_raw("BEGIN").unwrap();
        let value = executor.query_scalar(&Statement::new("SELECT 9")).unwrap();
        assert_eq!(value, Some(Value::BigInt(Some(9))));
        assert_eq!(executor.sql_log(), vec!["BEGIN", "SELECT 9"]);
    }
}
