//! Expression-to-SQL query building.
//!
//! # Architecture
//!
//! - **Expr**: typed expression front-end over an untyped [`Node`] tree
//! - **Compiler**: recursive lowering of nodes into SQL fragments
//! - **Params**: ordered, named parameter table with LIKE wrapping
//! - **Builder**: [`QueryBuilder`] with WHERE / ORDER BY / SET / paging
//! - **Compiled**: [`CompiledQuery`] templates re-bound per invocation
//! - **Value Conversion**: `sea_query::Value` to `may_postgres` parameters and back

pub mod builder;
pub(crate) mod compiler;
pub mod compiled;
pub mod expr;
pub mod params;

pub(crate) mod value_conversion;

#[doc(inline)]
pub use builder::{QueryBuilder, Rows};
#[doc(inline)]
pub use compiled::{ArgValue, Arguments, CompiledQuery};
#[doc(inline)]
pub use expr::{
    arg, contains, list, lit, Arg, BinaryOp, Evaluator, Expr, Field, List, Method, Node, UnaryOp,
};
#[doc(inline)]
pub use params::{LikeWrap, Parameter, ParameterTable};
