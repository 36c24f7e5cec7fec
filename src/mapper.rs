//! Entity persistence over an [`Executor`].
//!
//! Each operation takes its SQL from the entity's [`TableDescriptor`] and
//! binds values by template position, so nothing is parsed or rebuilt per
//! call. All functions are dialect-aware through the executor.

use crate::dialect::IdentityFetch;
use crate::error::OrmError;
use crate::executor::{Executor, Statement};
use crate::schema::{Entity, Template};
use crate::value::{cast_value, Record};
use sea_query::Value;

fn bind_template(template: &Template, values: &[Value]) -> Result<Statement, OrmError> {
    let mut statement = Statement::new(template.sql.clone());
    for (name, index) in &template.bindings {
        let value = values.get(*index).cloned().ok_or_else(|| {
            OrmError::ArgumentMismatch(format!("no value for column {index} ('{name}')"))
        })?;
        statement.bind(name.clone(), value);
    }
    Ok(statement)
}

/// Primary key value of an entity, resolved for the executor's dialect
///
/// # Errors
///
/// Returns `OrmError::CompositeKey` when the key spans several columns and
/// `OrmError::InvalidSchema` when there is no key.
pub fn get_id<E: Entity>(executor: &dyn Executor, entity: &E) -> Result<Value, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    let mut keys = table.primary_keys();
    match (keys.next(), keys.next()) {
        (Some((index, _)), None) => entity
            .to_values()
            .into_iter()
            .nth(index)
            .ok_or_else(|| OrmError::Other(format!("'{}' produced too few values", table.entity))),
        (Some(_), Some(_)) => Err(OrmError::CompositeKey(table.entity.to_string())),
        (None, _) => Err(OrmError::InvalidSchema(format!(
            "'{}' has no primary key",
            table.entity
        ))),
    }
}

/// Look up an entity by its primary key
///
/// # Errors
///
/// Returns `OrmError::PartitionKeyRequired` for partitioned tables (use
/// [`get_partitioned`]), a mapping error for composite keys, or the
/// executor's error.
pub fn get<E: Entity>(executor: &dyn Executor, id: impl Into<Value>) -> Result<Option<E>, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    if table.is_partitioned() {
        return Err(OrmError::PartitionKeyRequired(table.entity.to_string()));
    }
    fetch_by_key(executor, &[id.into()])
}

/// Look up an entity on a partitioned table by primary key and partition key
///
/// # Errors
///
/// Returns `OrmError::InvalidSchema` when the table has no partition key, a
/// mapping error for composite keys, or the executor's error.
pub fn get_partitioned<E: Entity>(
    executor: &dyn Executor,
    id: impl Into<Value>,
    partition: impl Into<Value>,
) -> Result<Option<E>, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    if !table.is_partitioned() {
        return Err(OrmError::InvalidSchema(format!(
            "'{}' has no partition key",
            table.entity
        )));
    }
    fetch_by_key(executor, &[id.into(), partition.into()])
}

fn fetch_by_key<E: Entity>(executor: &dyn Executor, keys: &[Value]) -> Result<Option<E>, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    let template = table.get_template()?;
    let mut statement = Statement::new(template.sql.clone());
    for ((name, index), value) in template.bindings.iter().zip(keys) {
        let kind = table.columns[*index].kind;
        statement.bind(name.clone(), cast_value(value, kind)?);
    }
    executor
        .query_all(&statement)?
        .first()
        .map(E::from_record)
        .transpose()
}

/// Insert an entity.
///
/// With a sequence, the next value is fetched and written into the primary
/// key first. Columns the database generates are read back onto `entity`.
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns `OrmError::UnsupportedDialect` when MySQL would need to read back
/// more than one generated column, or the executor's error.
pub fn insert<E: Entity>(executor: &dyn Executor, entity: &mut E) -> Result<u64, OrmError> {
    let dialect = executor.dialect();
    let table = E::descriptor_for(dialect)?;

    if let Some(sequence) = table.sequence {
        if let Some((_, pk)) = table.primary_keys().next() {
            let next = executor
                .query_scalar(&Statement::new(dialect.next_sequence_value(sequence)?))?
                .ok_or_else(|| {
                    OrmError::QueryError(format!("sequence '{sequence}' returned no value"))
                })?;
            entity.set_property(pk.parent, pk.property, &cast_value(&next, pk.kind)?)?;
        }
    }

    let statement = bind_template(table.insert_template(), &entity.to_values())?;
    let generated = table.generated_columns();
    if generated.is_empty() {
        return executor.execute(&statement);
    }

    match dialect.identity_fetch() {
        IdentityFetch::Returning | IdentityFetch::OutputInserted => {
            let rows = executor.query_all(&statement)?;
            if let Some(row) = rows.first() {
                write_generated(entity, &table.columns, generated, row)?;
            }
            Ok(rows.len() as u64)
        }
        IdentityFetch::LastInsertId => {
            if generated.len() > 1 {
                return Err(OrmError::UnsupportedDialect(format!(
                    "'{}' has {} generated columns; MySQL can only read back one",
                    table.entity,
                    generated.len()
                )));
            }
            let affected = executor.execute(&statement)?;
            let column = &table.columns[generated[0]];
            if let Some(id) =
                executor.query_scalar(&Statement::new("SELECT LAST_INSERT_ID()"))?
            {
                entity.set_property(column.parent, column.property, &cast_value(&id, column.kind)?)?;
            }
            Ok(affected)
        }
    }
}

fn write_generated<E: Entity>(
    entity: &mut E,
    columns: &[crate::schema::ColumnDescriptor],
    generated: &[usize],
    row: &Record,
) -> Result<(), OrmError> {
    for (position, &index) in generated.iter().enumerate() {
        let column = &columns[index];
        if let Some(value) = row.get(column.column).or_else(|| row.get_index(position)) {
            entity.set_property(column.parent, column.property, &cast_value(value, column.kind)?)?;
        }
    }
    Ok(())
}

/// Update every non-key column by primary (and partition) key
///
/// # Errors
///
/// Returns `OrmError::InvalidSchema` if the entity has nothing to update by,
/// or the executor's error.
pub fn update<E: Entity>(executor: &dyn Executor, entity: &E) -> Result<u64, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    let statement = bind_template(table.update_template()?, &entity.to_values())?;
    executor.execute(&statement)
}

/// Delete by primary (and partition) key
///
/// # Errors
///
/// Returns `OrmError::InvalidSchema` if the entity has no key, or the
/// executor's error.
pub fn delete<E: Entity>(executor: &dyn Executor, entity: &E) -> Result<u64, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    let statement = bind_template(table.delete_template()?, &entity.to_values())?;
    executor.execute(&statement)
}

/// Every row of the entity's table
///
/// # Errors
///
/// Returns the executor's error or a row conversion error.
pub fn select_all<E: Entity>(executor: &dyn Executor) -> Result<Vec<E>, OrmError> {
    let table = E::descriptor_for(executor.dialect())?;
    executor
        .query_all(&Statement::new(table.select_sql()))?
        .iter()
        .map(E::from_record)
        .collect()
}

fn raw_statement(sql: &str, parameters: &[(&str, Value)]) -> Statement {
    let mut statement = Statement::new(sql);
    for (name, value) in parameters {
        statement.bind((*name).to_string(), value.clone());
    }
    statement
}

/// Run hand-written SQL with named parameters, returning raw rows
///
/// # Errors
///
/// Returns the executor's error.
pub fn custom_query(
    executor: &dyn Executor,
    sql: &str,
    parameters: &[(&str, Value)],
) -> Result<Vec<Record>, OrmError> {
    executor.query_all(&raw_statement(sql, parameters))
}

/// # Errors
///
/// Returns the executor's error.
pub fn query_scalar(
    executor: &dyn Executor,
    sql: &str,
    parameters: &[(&str, Value)],
) -> Result<Option<Value>, OrmError> {
    executor.query_scalar(&raw_statement(sql, parameters))
}

/// # Errors
///
/// Returns the executor's error.
pub fn non_query(
    executor: &dyn Executor,
    sql: &str,
    parameters: &[(&str, Value)],
) -> Result<u64, OrmError> {
    executor.execute(&raw_statement(sql, parameters))
}
