//! Compiled queries: a builder run once against placeholder arguments and
//! then re-bound for every invocation.
//!
//! The compiled template is immutable. `invoke` clones it and patches the
//! clone, so one `CompiledQuery` can be shared across threads.

use super::builder::{QueryBuilder, QueryState};
use super::expr::Arg;
use super::params::Parameter;
use crate::dialect::Dialect;
use crate::error::OrmError;
use crate::schema::{Entity, TableDescriptor};
use crate::value::{Bound, ColumnValue};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

/// A value that can be passed to a compiled query
pub trait ArgValue: Sized {
    fn into_bound(self) -> Bound;
}

macro_rules! scalar_arg_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ArgValue for $ty {
                fn into_bound(self) -> Bound {
                    Bound::One(self.to_value())
                }
            }

            impl ArgValue for Option<$ty> {
                fn into_bound(self) -> Bound {
                    Bound::One(self.to_value())
                }
            }
        )+
    };
}

scalar_arg_value!(i16, i32, i64, f64, bool, String, NaiveDateTime, Decimal, Uuid);

impl<V: ColumnValue> ArgValue for Vec<V> {
    fn into_bound(self) -> Bound {
        Bound::Many(self.iter().map(ColumnValue::to_value).collect())
    }
}

/// Argument tuple of a compiled query, one to four elements
pub trait Arguments: Sized {
    /// Argument names, in tuple order
    type Names: Copy;
    /// Placeholder arguments handed to the build closure
    type Placeholders;

    fn names(names: &Self::Names) -> Vec<&'static str>;
    fn placeholders(names: &Self::Names) -> Self::Placeholders;
    fn into_bound(self) -> Vec<Bound>;
}

macro_rules! tuple_arguments {
    ($len:literal; $($ty:ident $index:tt),+) => {
        impl<$($ty: ArgValue),+> Arguments for ($($ty,)+) {
            type Names = [&'static str; $len];
            type Placeholders = ($(Arg<$ty>,)+);

            fn names(names: &Self::Names) -> Vec<&'static str> {
                names.to_vec()
            }

            fn placeholders(names: &Self::Names) -> Self::Placeholders {
                ($(Arg::placeholder(names[$index]),)+)
            }

            fn into_bound(self) -> Vec<Bound> {
                vec![$(self.$index.into_bound()),+]
            }
        }
    };
}

tuple_arguments!(1; A 0);
tuple_arguments!(2; A 0, B 1);
tuple_arguments!(3; A 0, B 1, C 2);
tuple_arguments!(4; A 0, B 1, C 2, D 3);

/// A query template re-bound per invocation.
///
/// ```
/// use pingorm::query::{Arg, CompiledQuery};
/// use pingorm::{DataEntity, Dialect, QueryBuilder};
///
/// #[derive(Debug, Default, Clone, DataEntity)]
/// #[table_name = "users"]
/// pub struct User {
///     #[primary_key]
///     pub id: i64,
///     pub num_logins: i32,
/// }
///
/// let by_id = CompiledQuery::<User, (i64,)>::compile(["id"], |(id,): (Arg<i64>,)| {
///     QueryBuilder::with_dialect(Dialect::Postgres)?.filter(User::ID.eq(id))
/// })?;
/// let query = by_id.invoke((7,))?;
/// assert!(query.to_sql().ends_with("WHERE (\"id\" = :pid)"));
/// # Ok::<(), pingorm::OrmError>(())
/// ```
pub struct CompiledQuery<E: Entity, A: Arguments> {
    table: Arc<TableDescriptor>,
    template: QueryState,
    names: Vec<&'static str>,
    _marker: PhantomData<fn(A) -> E>,
}

impl<E: Entity, A: Arguments> Clone for CompiledQuery<E, A> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            template: self.template.clone(),
            names: self.names.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity, A: Arguments> std::fmt::Debug for CompiledQuery<E, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("entity", &self.table.entity)
            .field("names", &self.names)
            .field("template", &self.template)
            .finish()
    }
}

impl<E: Entity, A: Arguments> CompiledQuery<E, A> {
    /// Run `build` once against placeholder arguments and keep the result
    ///
    /// # Errors
    ///
    /// Propagates any error raised while building, and rejects duplicate
    /// argument names.
    pub fn compile<F>(names: A::Names, build: F) -> Result<Self, OrmError>
    where
        F: FnOnce(A::Placeholders) -> Result<QueryBuilder<E>, OrmError>,
    {
        let list = A::names(&names);
        for (i, name) in list.iter().enumerate() {
            if list[..i].contains(name) {
                return Err(OrmError::ArgumentMismatch(format!(
                    "argument name '{name}' is used twice"
                )));
            }
        }
        let builder = build(A::placeholders(&names))?;
        log::debug!(
            target: "pingorm::query",
            "compiled query for '{}': {}",
            builder.table().entity,
            builder.to_sql()
        );
        Ok(Self {
            table: Arc::clone(builder.table_arc()),
            template: builder.state,
            names: list,
            _marker: PhantomData,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.table.dialect
    }

    /// SQL of the template, list arguments still unexpanded
    pub fn template_sql(&self) -> String {
        QueryBuilder::<E>::from_parts(Arc::clone(&self.table), self.template.clone()).to_sql()
    }

    /// A fresh builder with `args` bound.
    ///
    /// A list argument replaces its single token with one token per element
    /// (`NULL` when empty). Arguments that never reached the SQL are ignored.
    ///
    /// # Errors
    ///
    /// Returns `OrmError::ArgumentMismatch` when a list is passed for a scalar
    /// placeholder or the reverse, and `OrmError::ParameterConflict` when an
    /// expanded element name collides with another parameter.
    pub fn invoke(&self, args: A) -> Result<QueryBuilder<E>, OrmError> {
        let mut state = self.template.clone();
        let dialect = self.dialect();
        for (name, bound) in self.names.iter().zip(args.into_bound()) {
            let parameter_name = Dialect::parameter_name(name, false);
            let Some(index) = state.parameters.position(&parameter_name) else {
                continue;
            };
            let Some(slot) = state.parameters.get_mut(&parameter_name) else {
                continue;
            };
            match bound {
                Bound::One(value) => {
                    if slot.value.is_list() {
                        return Err(OrmError::ArgumentMismatch(format!(
                            "argument '{name}' is used as a list"
                        )));
                    }
                    slot.value = Bound::One(value);
                }
                Bound::Many(values) => {
                    if !slot.value.is_list() {
                        return Err(OrmError::ArgumentMismatch(format!(
                            "argument '{name}' is used as a scalar"
                        )));
                    }
                    let expanded: Vec<Parameter> = values
                        .into_iter()
                        .enumerate()
                        .map(|(i, value)| {
                            Parameter::new(format!("{parameter_name}{i}"), Bound::One(value), None)
                        })
                        .collect();
                    if let Some(taken) = expanded
                        .iter()
                        .find(|p| state.parameters.contains(&p.name))
                    {
                        return Err(OrmError::ParameterConflict(taken.name.clone()));
                    }
                    let tokens = if expanded.is_empty() {
                        "NULL".to_string()
                    } else {
                        expanded
                            .iter()
                            .map(|p| dialect.token_for(&p.name))
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    state.rewrite_token(&dialect.token_for(&parameter_name), &tokens);
                    state.parameters.splice(index, expanded);
                }
            }
        }
        Ok(QueryBuilder::from_parts(Arc::clone(&self.table), state))
    }
}
