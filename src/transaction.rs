//! Transactions over a [`Session`].
//!
//! - `BEGIN` / `COMMIT` / `ROLLBACK` in the session's dialect
//! - Isolation levels on the outermost transaction
//! - Nesting through savepoints (`sp_1`, `sp_2`, ...)
//! - Rollback on drop when neither `commit` nor `rollback` was called

use crate::adapter::EntityTracker;
use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::executor::{Executor, Statement};
use crate::session::Session;
use crate::value::Record;
use sea_query::Value;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read uncommitted (PostgreSQL treats it as read committed)
    ReadUncommitted,
    /// Read committed (default)
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// A control or data statement failed
    Execution(OrmError),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Nested transaction error
    NestedTransactionError(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::Execution(e) => write!(f, "Transaction error: {e}"),
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::NestedTransactionError(s) => {
                write!(f, "Nested transaction error: {s}")
            }
        }
    }
}

impl std::error::Error for TransactionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransactionError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OrmError> for TransactionError {
    fn from(err: OrmError) -> Self {
        TransactionError::Execution(err)
    }
}

impl From<TransactionError> for OrmError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Execution(e) => e,
            TransactionError::TransactionClosed => {
                OrmError::Other("Transaction closed".to_string())
            }
            TransactionError::NestedTransactionError(s) => OrmError::Other(s),
        }
    }
}

fn savepoint_name(level: usize) -> String {
    format!("sp_{level}")
}

fn begin_sql(dialect: Dialect, isolation: Option<IsolationLevel>) -> Vec<String> {
    let set = isolation.map(|level| format!("SET TRANSACTION ISOLATION LEVEL {}", level.to_sql()));
    match dialect {
        // Postgres scopes SET TRANSACTION to the transaction already open
        Dialect::Postgres => std::iter::once("BEGIN".to_string()).chain(set).collect(),
        Dialect::MySql => set.into_iter().chain(["START TRANSACTION".to_string()]).collect(),
        Dialect::SqlServer => set.into_iter().chain(["BEGIN TRANSACTION".to_string()]).collect(),
    }
}

fn savepoint_sql(dialect: Dialect, level: usize) -> String {
    match dialect {
        Dialect::SqlServer => format!("SAVE TRANSACTION {}", savepoint_name(level)),
        _ => format!("SAVEPOINT {}", savepoint_name(level)),
    }
}

fn finish_sql(dialect: Dialect, level: usize, commit: bool) -> Option<String> {
    match (dialect, level, commit) {
        (Dialect::SqlServer, 0, true) => Some("COMMIT TRANSACTION".to_string()),
        (Dialect::SqlServer, 0, false) => Some("ROLLBACK TRANSACTION".to_string()),
        (_, 0, true) => Some("COMMIT".to_string()),
        (_, 0, false) => Some("ROLLBACK".to_string()),
        // SQL Server has no savepoint release; the savepoint ends with the transaction
        (Dialect::SqlServer, _, true) => None,
        (Dialect::SqlServer, _, false) => {
            Some(format!("ROLLBACK TRANSACTION {}", savepoint_name(level)))
        }
        (_, _, true) => Some(format!("RELEASE SAVEPOINT {}", savepoint_name(level))),
        (_, _, false) => Some(format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(level))),
    }
}

/// A database transaction on one session.
///
/// Beginning a transaction while another is open on the same session opens a
/// savepoint instead. Inner transactions must finish before outer ones.
///
/// Dropping a transaction that was neither committed nor rolled back rolls it
/// back and logs an error.
///
/// # Examples
///
/// ```no_run
/// use pingorm::{OrmError, SessionFactory};
///
/// # fn main() -> Result<(), OrmError> {
/// let factory = SessionFactory::from_config()?;
/// let transaction = factory.begin("default")?;
/// // statements executed through `transaction` or the session share the transaction
/// transaction.commit()?;
/// # Ok(())
/// # }
/// ```
pub struct Transaction {
    session: Arc<Session>,
    level: usize,
    closed: bool,
    tracker: Option<Arc<dyn EntityTracker>>,
}

impl Transaction {
    /// Begin a transaction (or a savepoint if one is already open)
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::Execution` if the control statement fails.
    pub fn begin(
        session: Arc<Session>,
        tracker: Option<Arc<dyn EntityTracker>>,
    ) -> Result<Self, TransactionError> {
        Self::start(session, None, tracker)
    }

    /// Begin an outermost transaction with an isolation level
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::NestedTransactionError` if a transaction is
    /// already open on the session.
    pub fn begin_with_isolation(
        session: Arc<Session>,
        isolation: IsolationLevel,
        tracker: Option<Arc<dyn EntityTracker>>,
    ) -> Result<Self, TransactionError> {
        Self::start(session, Some(isolation), tracker)
    }

    fn start(
        session: Arc<Session>,
        isolation: Option<IsolationLevel>,
        tracker: Option<Arc<dyn EntityTracker>>,
    ) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span(session.key()).entered();

        let level = session.enter_transaction();
        let result = if level == 0 {
            begin_sql(session.dialect(), isolation)
                .iter()
                .try_for_each(|sql| session.execute_raw(sql))
                .map_err(TransactionError::from)
        } else if isolation.is_some() {
            Err(TransactionError::NestedTransactionError(
                "isolation level can only be set on the outermost transaction".to_string(),
            ))
        } else {
            session
                .execute_raw(&savepoint_sql(session.dialect(), level))
                .map_err(TransactionError::from)
        };

        if let Err(err) = result {
            session.leave_transaction();
            return Err(err);
        }
        log::debug!("began transaction level {level} on '{}'", session.key());
        Ok(Self {
            session,
            level,
            closed: false,
            tracker,
        })
    }

    /// Open a savepoint inside this transaction
    ///
    /// # Errors
    ///
    /// Returns `TransactionError::Execution` if the savepoint cannot be created.
    pub fn begin_nested(&self) -> Result<Transaction, TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        Self::start(Arc::clone(&self.session), None, self.tracker.clone())
    }

    /// # Errors
    ///
    /// Returns `TransactionError::NestedTransactionError` while an inner
    /// transaction is still open, or `Execution` if `COMMIT` fails.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span(self.session.key()).entered();
        self.finish(true)
    }

    /// # Errors
    ///
    /// Returns `TransactionError::NestedTransactionError` while an inner
    /// transaction is still open, or `Execution` if `ROLLBACK` fails.
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span(self.session.key()).entered();
        self.finish(false)
    }

    /// Nesting level; 0 for the outermost transaction
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn finish(&mut self, commit: bool) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        if self.session.transaction_depth() != self.level + 1 {
            return Err(TransactionError::NestedTransactionError(format!(
                "transaction level {} finished while an inner transaction is open",
                self.level
            )));
        }
        self.closed = true;

        let result = match finish_sql(self.session.dialect(), self.level, commit) {
            Some(sql) => self.session.execute_raw(&sql),
            None => Ok(()),
        };
        self.session.leave_transaction();

        if self.level == 0 {
            let success = commit && result.is_ok();
            #[cfg(feature = "metrics")]
            METRICS.record_transaction(success);
            if let Some(tracker) = &self.tracker {
                tracker.after_completion(success);
            }
        }
        result.map_err(TransactionError::from)
    }
}

impl Executor for Transaction {
    fn dialect(&self) -> Dialect {
        self.session.dialect()
    }

    fn query_all(&self, statement: &Statement) -> Result<Vec<Record>, OrmError> {
        self.session.query_all(statement)
    }

    fn execute(&self, statement: &Statement) -> Result<u64, OrmError> {
        self.session.execute(statement)
    }

    fn query_scalar(&self, statement: &Statement) -> Result<Option<Value>, OrmError> {
        self.session.query_scalar(statement)
    }

    fn execute_raw(&self, sql: &str) -> Result<(), OrmError> {
        self.session.execute_raw(sql)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.finish(false) {
            log::warn!("rollback on drop failed for '{}': {err}", self.session.key());
            // keep the depth counter in step even when the savepoint order was violated
            if !self.closed {
                self.closed = true;
                self.session.leave_transaction();
            }
        }
        log::error!("Transaction disposed without commit.");
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.session.key())
            .field("level", &self.level)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Several transactions finished together, typically one per connection key
#[derive(Debug, Default)]
pub struct TransactionCollection {
    transactions: Vec<Transaction>,
}

impl TransactionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Commit in insertion order.
    ///
    /// Stops at the first failure; transactions not yet committed are rolled
    /// back as they drop.
    ///
    /// # Errors
    ///
    /// Returns the first commit error.
    pub fn commit(self) -> Result<(), TransactionError> {
        for transaction in self.transactions {
            transaction.commit()?;
        }
        Ok(())
    }

    /// Roll back every transaction, returning the first error
    ///
    /// # Errors
    ///
    /// Returns the first rollback error after attempting all of them.
    pub fn rollback(self) -> Result<(), TransactionError> {
        let mut first_error = None;
        for transaction in self.transactions {
            if let Err(err) = transaction.rollback() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
