//! Entity adapter: routed reads and transactional writes.
//!
//! [`EntityAdapter`] resolves the session for an entity's connection key on
//! every call, wraps each write in a transaction on that session, and tells
//! the factory's [`EntityTracker`] what happened.

use crate::error::OrmError;
use crate::mapper;
use crate::query::QueryBuilder;
use crate::schema::Entity;
use crate::session::{Session, SessionFactory};
use sea_query::Value;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Observer for entity changes, for cache invalidation and similar
///
/// Insert and delete notifications are sent before the statement runs;
/// `after_completion` follows the outermost transaction.
pub trait EntityTracker: Send + Sync {
    fn entity_inserted(&self, _entity: &dyn Any) {}

    fn entity_deleted(&self, _entity: &dyn Any) {}

    fn after_completion(&self, _success: bool) {}
}

/// Reads and writes for one entity type through a [`SessionFactory`]
///
/// # Examples
///
/// ```no_run
/// use pingorm::{DataEntity, EntityAdapter, OrmError, SessionFactory};
///
/// #[derive(Debug, Default, Clone, DataEntity)]
/// #[connection_key = "main"]
/// #[table_name = "users"]
/// #[sequence_name = "seq_users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     pub first_name: String,
///     pub num_logins: i32,
/// }
///
/// # fn main() -> Result<(), OrmError> {
/// let factory = SessionFactory::from_config()?;
/// let users = EntityAdapter::<User>::new(&factory);
///
/// let mut user = User { first_name: "Matt".into(), ..Default::default() };
/// users.insert(&mut user)?;
///
/// let found = users.get(user.id)?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```
pub struct EntityAdapter<'f, E> {
    factory: &'f SessionFactory,
    _entity: PhantomData<fn() -> E>,
}

impl<'f, E: Entity> EntityAdapter<'f, E> {
    pub fn new(factory: &'f SessionFactory) -> Self {
        Self {
            factory,
            _entity: PhantomData,
        }
    }

    /// Connection key of `E`
    pub fn key(&self) -> &'static str {
        E::schema().key
    }

    /// # Errors
    ///
    /// Returns `OrmError` if the session cannot be opened.
    pub fn session(&self) -> Result<Arc<Session>, OrmError> {
        self.factory.session_for::<E>()
    }

    /// # Errors
    ///
    /// See [`mapper::get`].
    pub fn get(&self, id: impl Into<Value>) -> Result<Option<E>, OrmError> {
        mapper::get(&*self.session()?, id)
    }

    /// # Errors
    ///
    /// See [`mapper::get_partitioned`].
    pub fn get_partitioned(
        &self,
        id: impl Into<Value>,
        partition: impl Into<Value>,
    ) -> Result<Option<E>, OrmError> {
        mapper::get_partitioned(&*self.session()?, id, partition)
    }

    /// A query builder in the factory's dialect
    ///
    /// # Errors
    ///
    /// Returns a mapping error if `E`'s schema is invalid.
    pub fn query(&self) -> Result<QueryBuilder<E>, OrmError> {
        QueryBuilder::with_dialect(self.factory.dialect())
    }

    /// Run a query on the entity's session
    ///
    /// # Errors
    ///
    /// Returns the executor's error or a row conversion error.
    pub fn fetch_all(&self, query: &QueryBuilder<E>) -> Result<Vec<E>, OrmError> {
        query.to_list(&*self.session()?)
    }

    /// Run an UPDATE built with [`QueryBuilder::update`]
    ///
    /// # Errors
    ///
    /// Returns the executor's error.
    pub fn execute(&self, query: &QueryBuilder<E>) -> Result<u64, OrmError> {
        let session = self.session()?;
        let transaction = self.factory.begin_for::<E>()?;
        let affected = query.execute_non_query(&*session)?;
        transaction.commit()?;
        Ok(affected)
    }

    /// Insert inside a transaction; generated keys are written onto `entity`
    ///
    /// # Errors
    ///
    /// Returns the mapper's error; the transaction is rolled back.
    pub fn insert(&self, entity: &mut E) -> Result<u64, OrmError> {
        let session = self.session()?;
        if let Some(tracker) = self.factory.tracker() {
            tracker.entity_inserted(&*entity);
        }
        let transaction = self.factory.begin_for::<E>()?;
        let inserted = mapper::insert(&*session, entity)?;
        transaction.commit()?;
        Ok(inserted)
    }

    /// # Errors
    ///
    /// Returns the mapper's error; the transaction is rolled back.
    pub fn update(&self, entity: &E) -> Result<u64, OrmError> {
        let session = self.session()?;
        let transaction = self.factory.begin_for::<E>()?;
        let updated = mapper::update(&*session, entity)?;
        transaction.commit()?;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns the mapper's error; the transaction is rolled back.
    pub fn delete(&self, entity: &E) -> Result<u64, OrmError> {
        let session = self.session()?;
        if let Some(tracker) = self.factory.tracker() {
            tracker.entity_deleted(entity);
        }
        let transaction = self.factory.begin_for::<E>()?;
        let deleted = mapper::delete(&*session, entity)?;
        transaction.commit()?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, OrmConfig};
    use crate::dialect::Dialect;
    use crate::session::BoxExecutor;
    use crate::testing::MockExecutor;
    use crate::tests_cfg::User;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl EntityTracker for Recorder {
        fn entity_inserted(&self, entity: &dyn Any) {
            if let Some(user) = entity.downcast_ref::<User>() {
                self.events.lock().push(format!("inserted {}", user.first_name));
            }
        }

        fn entity_deleted(&self, entity: &dyn Any) {
            if let Some(user) = entity.downcast_ref::<User>() {
                self.events.lock().push(format!("deleted {}", user.id));
            }
        }

        fn after_completion(&self, success: bool) {
            self.events.lock().push(format!("completed {success}"));
        }
    }

    fn factory(mock: Arc<MockExecutor>) -> SessionFactory {
        SessionFactory::new(
            OrmConfig::default().with_connection("tests", "postgres://u:p@localhost/tests"),
        )
        .with_connector(move |_: &str, _: &ConnectionConfig| -> Result<BoxExecutor, OrmError> {
            Ok(Box::new(Arc::clone(&mock)))
        })
    }

    #[test]
    fn test_insert_runs_in_transaction_and_notifies() {
        let mock = Arc::new(MockExecutor::new(Dialect::Postgres));
        mock.push_scalar(Value::BigInt(Some(1)));
        mock.push_affected(1);
        let factory = factory(Arc::clone(&mock));
        let recorder = Arc::new(Recorder::default());
        factory.set_tracker(recorder.clone());

        let users = EntityAdapter::<User>::new(&factory);
        let mut user = User {
            first_name: "Matt".to_string(),
            ..Default::default()
        };
        assert_eq!(users.insert(&mut user).unwrap(), 1);
        assert_eq!(user.id, 1);

        let log = mock.sql_log();
        assert_eq!(log.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
        assert_eq!(
            *recorder.events.lock(),
            vec!["inserted Matt".to_string(), "completed true".to_string()]
        );
    }

    #[test]
    fn test_failed_delete_rolls_back() {
        let mock = Arc::new(MockExecutor::new(Dialect::Postgres));
        mock.push_error("deadlock detected");
        let factory = factory(Arc::clone(&mock));
        let recorder = Arc::new(Recorder::default());
        factory.set_tracker(recorder.clone());

        let users = EntityAdapter::<User>::new(&factory);
        let user = User {
            id: 4,
            ..Default::default()
        };
        assert!(users.delete(&user).is_err());
        assert_eq!(mock.sql_log().last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(
            *recorder.events.lock(),
            vec!["deleted 4".to_string(), "completed false".to_string()]
        );
    }

    #[test]
    fn test_query_uses_factory_dialect() {
        let mock = Arc::new(MockExecutor::new(Dialect::Postgres));
        let factory = factory(Arc::clone(&mock));
        let users = EntityAdapter::<User>::new(&factory);
        let query = users.query().unwrap().filter(User::NUM_LOGINS.gt(3)).unwrap();
        assert!(users.fetch_all(&query).unwrap().is_empty());
        assert_eq!(users.key(), "tests");
        assert_eq!(
            mock.last_statement().unwrap().sql,
            "SELECT \"id\",\"first_name\",\"last_name\",\"num_logins\",\"home_city\",\"home_zip\" FROM \"users\" WHERE (\"num_logins\" > :c0)"
        );
    }
}
