//! Fluent query builder.
//!
//! A builder accumulates a WHERE clause, ORDER BY terms, SET assignments and
//! pagination for one entity type. Each call compiles its expression right
//! away, so a bad predicate fails at the call that introduced it.

use super::compiler::{Compiler, Fragment};
use super::expr::{Expr, Field, Node};
use super::params::{replace_token, ParameterTable};
use crate::dialect::{active_dialect, Dialect};
use crate::error::OrmError;
use crate::executor::{Executor, Statement};
use crate::schema::{Entity, TableDescriptor};
use crate::value::{as_i64, Bound, ColumnValue, Record};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Clause text and parameters of one query
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct QueryState {
    pub where_clause: String,
    pub order_by: String,
    pub update: String,
    pub parameters: ParameterTable,
    pub next_constant: usize,
    pub limit: u64,
    pub offset: u64,
}

impl QueryState {
    /// Replace a parameter token in every clause that can hold one
    pub fn rewrite_token(&mut self, token: &str, replacement: &str) {
        self.where_clause = replace_token(&self.where_clause, token, replacement);
        self.update = replace_token(&self.update, token, replacement);
    }
}

fn append(clause: &mut String, separator: &str, term: &str) {
    if !clause.is_empty() {
        clause.push_str(separator);
    }
    clause.push_str(term);
}

/// Query over entity `E`.
///
/// ```
/// use pingorm::{DataEntity, Dialect, QueryBuilder};
///
/// #[derive(Debug, Default, Clone, DataEntity)]
/// #[table_name = "users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     pub last_name: String,
///     pub num_logins: i32,
/// }
///
/// let query = QueryBuilder::<User>::with_dialect(Dialect::Postgres)?
///     .filter(User::NUM_LOGINS.gt(3))?
///     .order_by(User::LAST_NAME)?
///     .take(10);
/// assert_eq!(
///     query.to_sql(),
///     "SELECT \"id\",\"last_name\",\"num_logins\" FROM \"users\" \
///      WHERE (\"num_logins\" > :c0) ORDER BY \"last_name\" LIMIT 10"
/// );
/// # Ok::<(), pingorm::OrmError>(())
/// ```
pub struct QueryBuilder<E: Entity> {
    table: Arc<TableDescriptor>,
    pub(crate) state: QueryState,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for QueryBuilder<E> {
    fn clone(&self) -> Self {
        Self::from_parts(Arc::clone(&self.table), self.state.clone())
    }
}

impl<E: Entity> fmt::Debug for QueryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("entity", &self.table.entity)
            .field("dialect", &self.table.dialect)
            .field("state", &self.state)
            .finish()
    }
}

impl<E: Entity> QueryBuilder<E> {
    /// Builder for the active dialect
    ///
    /// # Errors
    ///
    /// Returns a mapping error if `E` has an invalid schema.
    pub fn new() -> Result<Self, OrmError> {
        Self::with_dialect(active_dialect())
    }

    /// # Errors
    ///
    /// Returns a mapping error if `E` has an invalid schema.
    pub fn with_dialect(dialect: Dialect) -> Result<Self, OrmError> {
        Ok(Self::from_parts(E::descriptor_for(dialect)?, QueryState::default()))
    }

    pub(crate) fn from_parts(table: Arc<TableDescriptor>, state: QueryState) -> Self {
        Self {
            table,
            state,
            _entity: PhantomData,
        }
    }

    pub(crate) fn table_arc(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    pub fn table(&self) -> &TableDescriptor {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.table.dialect
    }

    fn compile(&mut self, node: &Node) -> Result<Fragment, OrmError> {
        Compiler::new(
            &self.table,
            &mut self.state.parameters,
            &mut self.state.next_constant,
        )
        .compile(node)
    }

    /// AND a predicate into the WHERE clause
    ///
    /// # Errors
    ///
    /// Returns a compile error for unsupported operators, methods or
    /// properties.
    pub fn filter(mut self, predicate: Expr<E, bool>) -> Result<Self, OrmError> {
        let group = self.compile(predicate.node())?.into_group();
        append(&mut self.state.where_clause, " AND ", &group);
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` if the field is not mapped.
    pub fn order_by<V>(self, field: Field<E, V>) -> Result<Self, OrmError> {
        self.push_order(field, false)
    }

    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` if the field is not mapped.
    pub fn order_by_desc<V>(self, field: Field<E, V>) -> Result<Self, OrmError> {
        self.push_order(field, true)
    }

    fn push_order<V>(mut self, field: Field<E, V>, descending: bool) -> Result<Self, OrmError> {
        let column = self.table.quoted_column(field.parent(), field.property())?;
        let term = if descending {
            format!("{column} DESC")
        } else {
            column
        };
        append(&mut self.state.order_by, ", ", &term);
        Ok(self)
    }

    /// Add `column = value` to the SET list; the query becomes an UPDATE
    ///
    /// # Errors
    ///
    /// Returns a compile error if the value expression cannot be lowered.
    pub fn update<V>(
        mut self,
        field: Field<E, V>,
        value: impl Into<Expr<E, V>>,
    ) -> Result<Self, OrmError> {
        let column = self.table.quoted_column(field.parent(), field.property())?;
        let value = self.compile(value.into().node())?;
        append(&mut self.state.update, ", ", &format!("{column} = {}", value.sql));
        Ok(self)
    }

    /// Assign a constant by property name
    ///
    /// # Errors
    ///
    /// Returns `OrmError::UnmappedProperty` if the property is not mapped.
    pub fn update_property<V: ColumnValue>(
        mut self,
        property: &str,
        value: V,
    ) -> Result<Self, OrmError> {
        let column = self.table.quoted_column(None, property)?;
        let value = self.compile(&Node::Constant(Bound::One(value.to_value())))?;
        append(&mut self.state.update, ", ", &format!("{column} = {}", value.sql));
        Ok(self)
    }

    /// Limit the number of rows; zero clears the limit
    #[must_use]
    pub fn take(mut self, count: u64) -> Self {
        self.state.limit = count;
        self
    }

    /// Skip rows; zero clears the offset
    #[must_use]
    pub fn skip(mut self, count: u64) -> Self {
        self.state.offset = count;
        self
    }

    pub fn is_update(&self) -> bool {
        !self.state.update.is_empty()
    }

    pub fn where_clause(&self) -> &str {
        &self.state.where_clause
    }

    pub fn order_by_clause(&self) -> &str {
        &self.state.order_by
    }

    pub fn update_clause(&self) -> &str {
        &self.state.update
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.state.parameters
    }

    fn push_where(&self, sql: &mut String) {
        if !self.state.where_clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.state.where_clause);
        }
    }

    /// Render the statement. Rendering does not change the builder.
    pub fn to_sql(&self) -> String {
        if self.is_update() {
            let mut sql = format!(
                "UPDATE {} SET {}",
                self.table.quoted_table(),
                self.state.update
            );
            self.push_where(&mut sql);
            return sql;
        }
        let mut sql = self.table.select_sql().to_string();
        self.push_where(&mut sql);
        let ordered = !self.state.order_by.is_empty();
        if ordered {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.state.order_by);
        }
        self.dialect()
            .paginate(&mut sql, ordered, self.state.offset, self.state.limit);
        sql
    }

    /// `SELECT COUNT(*)` over the WHERE clause; ordering and paging are ignored
    pub fn count_sql(&self) -> String {
        let mut sql = self.table.count_sql();
        self.push_where(&mut sql);
        sql
    }

    fn bind_statement(&self, sql: String) -> Result<Statement, OrmError> {
        let mut statement = Statement::new(sql);
        for parameter in self.state.parameters.iter() {
            statement.bind(parameter.name.clone(), parameter.bound_value()?);
        }
        Ok(statement)
    }

    /// The rendered SQL with its bound parameters
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ArgumentMismatch` if a list placeholder was never
    /// expanded.
    pub fn statement(&self) -> Result<Statement, OrmError> {
        self.bind_statement(self.to_sql())
    }

    fn check_dialect(&self, executor: &dyn Executor) -> Result<(), OrmError> {
        if executor.dialect() == self.dialect() {
            Ok(())
        } else {
            Err(OrmError::UnsupportedDialect(format!(
                "query for '{}' was built for {} but the executor speaks {}",
                self.table.entity,
                self.dialect(),
                executor.dialect()
            )))
        }
    }

    /// Number of matching rows
    ///
    /// # Errors
    ///
    /// Propagates execution errors.
    pub fn count(&self, executor: &dyn Executor) -> Result<u64, OrmError> {
        self.check_dialect(executor)?;
        let statement = self.bind_statement(self.count_sql())?;
        let value = executor.query_scalar(&statement)?;
        let count = value.as_ref().and_then(as_i64).unwrap_or(0);
        u64::try_from(count).map_err(|_| OrmError::ParseError(format!("invalid row count {count}")))
    }

    /// First matching entity, if any
    ///
    /// # Errors
    ///
    /// Propagates execution and row conversion errors.
    pub fn first_or_default(self, executor: &dyn Executor) -> Result<Option<E>, OrmError> {
        self.take(1).fetch(executor).next().transpose()
    }

    /// Add `predicate`, then return the first match
    ///
    /// # Errors
    ///
    /// Propagates compile, execution and row conversion errors.
    pub fn first_or_default_by(
        self,
        predicate: Expr<E, bool>,
        executor: &dyn Executor,
    ) -> Result<Option<E>, OrmError> {
        self.filter(predicate)?.first_or_default(executor)
    }

    /// Lazily run the query; the statement executes on the first `next()`
    pub fn fetch<'x>(&self, executor: &'x dyn Executor) -> Rows<'x, E> {
        let statement = self
            .check_dialect(executor)
            .and_then(|()| self.statement());
        Rows {
            pending: Some((executor, statement)),
            rows: Vec::new().into_iter(),
            _entity: PhantomData,
        }
    }

    /// # Errors
    ///
    /// Propagates execution and row conversion errors.
    pub fn to_list(&self, executor: &dyn Executor) -> Result<Vec<E>, OrmError> {
        self.fetch(executor).collect()
    }

    /// Run an UPDATE (or any statement) and return the affected row count
    ///
    /// # Errors
    ///
    /// Propagates execution errors.
    pub fn execute_non_query(&self, executor: &dyn Executor) -> Result<u64, OrmError> {
        self.check_dialect(executor)?;
        executor.execute(&self.statement()?)
    }
}

impl<E: Entity> fmt::Display for QueryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Lazy result set returned by [`QueryBuilder::fetch`]
pub struct Rows<'x, E: Entity> {
    pending: Option<(&'x dyn Executor, Result<Statement, OrmError>)>,
    rows: std::vec::IntoIter<Record>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Iterator for Rows<'_, E> {
    type Item = Result<E, OrmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((executor, statement)) = self.pending.take() {
            match statement.and_then(|statement| executor.query_all(&statement)) {
                Ok(records) => self.rows = records.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
        self.rows.next().map(|record| E::from_record(&record))
    }
}
