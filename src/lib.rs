//! # pingorm
//!
//! Typed expression-to-SQL query builder and entity mapper for PostgreSQL,
//! MySQL and SQL Server, executing over `may_postgres`.
//!
//! - Entities describe their table once with `#[derive(DataEntity)]`
//! - Predicates, orderings and assignments are typed [`Expr`] trees compiled
//!   to dialect SQL with named parameters
//! - [`CompiledQuery`] captures a statement shape once and re-binds it per call
//! - [`SessionFactory`] routes entities to connections by key, with
//!   savepoint-nested [`Transaction`]s
//!
//! ```
//! use pingorm::{DataEntity, Dialect, QueryBuilder};
//!
//! #[derive(Debug, Default, Clone, DataEntity)]
//! #[table_name = "users"]
//! pub struct User {
//!     #[primary_key]
//!     pub id: i64,
//!     pub first_name: String,
//!     pub num_logins: i32,
//! }
//!
//! # fn main() -> Result<(), pingorm::OrmError> {
//! let query = QueryBuilder::<User>::with_dialect(Dialect::Postgres)?
//!     .filter(User::FIRST_NAME.starts_with("Ma"))?
//!     .order_by_desc(User::NUM_LOGINS)?
//!     .take(10);
//! assert_eq!(
//!     query.to_sql(),
//!     "SELECT \"id\",\"first_name\",\"num_logins\" FROM \"users\" \
//!      WHERE (\"first_name\" ILIKE :c0) ORDER BY \"num_logins\" DESC LIMIT 10"
//! );
//! # Ok(())
//! # }
//! ```

extern crate self as pingorm;

pub mod adapter;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod mapper;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod query;
pub mod schema;
pub mod session;
pub mod transaction;
pub mod value;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

#[cfg(test)]
mod tests_cfg;

pub use pingorm_derive::{ColumnGroup, DataEntity};
pub use sea_query::Value;

pub use adapter::{EntityAdapter, EntityTracker};
pub use config::{ConnectionConfig, OrmConfig};
pub use connection::{connect, ConnectionError};
pub use dialect::{active_dialect, set_active_dialect, Dialect};
pub use error::OrmError;
pub use executor::{BoundParameter, Executor, MayPostgresExecutor, Statement};
pub use query::{
    arg, contains, list, lit, Arg, CompiledQuery, Expr, Field, List, QueryBuilder, Rows,
};
pub use schema::{
    Catalog, ColumnDescriptor, ColumnGroup, Entity, EntitySchema, TableDescriptor,
};
pub use session::{
    Connector, CoroutineKeyStorage, KeyStorage, PostgresConnector, Session, SessionFactory,
    StaticKeyStorage,
};
pub use transaction::{IsolationLevel, Transaction, TransactionCollection, TransactionError};
pub use value::{ColumnValue, Record, ValueKind};
