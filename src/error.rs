//! Error types shared by the catalog, the expression compiler and the executors.
//!
//! Mapping and compilation errors are raised synchronously from the call that
//! detects them. Execution errors are logged at the executor boundary and then
//! returned to the caller; nothing is swallowed into a default value.

use may_postgres::Error as PostgresError;
use std::fmt;

/// Error type for every fallible `pingorm` operation
#[derive(Debug)]
pub enum OrmError {
    /// The entity type has no table mapping
    UnmappedEntity(String),
    /// The property is not a mapped column of the entity
    UnmappedProperty {
        /// Entity type name
        entity: String,
        /// Property that failed to resolve
        property: String,
    },
    /// Id lookup attempted on an entity with a composite primary key
    CompositeKey(String),
    /// Id lookup on a partitioned table without a partition key
    PartitionKeyRequired(String),
    /// Schema declaration is inconsistent (for example two partition keys)
    InvalidSchema(String),
    /// Unary operator with no SQL lowering
    UnsupportedUnaryOperator(String),
    /// Binary operator with no SQL lowering
    UnsupportedBinaryOperator(String),
    /// Method call that is neither translatable nor foldable
    UnsupportedMethod(String),
    /// Expression node kind the compiler does not lower
    UnhandledExpression(String),
    /// The same parameter name was bound to two different values
    ParameterConflict(String),
    /// A compiled-query argument does not fit its placeholder
    ArgumentMismatch(String),
    /// The active dialect cannot express the requested statement
    UnsupportedDialect(String),
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Configuration error
    ConfigError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::UnmappedEntity(entity) => {
                write!(f, "Entity '{entity}' is not mapped to a table")
            }
            OrmError::UnmappedProperty { entity, property } => {
                write!(f, "Property '{property}' is not a mapped column of '{entity}'")
            }
            OrmError::CompositeKey(entity) => {
                write!(
                    f,
                    "Lookup by id is not supported for '{entity}' because it has multiple primary key columns"
                )
            }
            OrmError::PartitionKeyRequired(entity) => {
                write!(f, "A partition key is required to get '{entity}' by id")
            }
            OrmError::InvalidSchema(s) => write!(f, "Invalid schema: {s}"),
            OrmError::UnsupportedUnaryOperator(op) => {
                write!(f, "The unary operator '{op}' is not supported")
            }
            OrmError::UnsupportedBinaryOperator(op) => {
                write!(f, "The binary operator '{op}' is not supported")
            }
            OrmError::UnsupportedMethod(method) => {
                write!(f, "The method '{method}' is not supported")
            }
            OrmError::UnhandledExpression(kind) => {
                write!(f, "Unhandled expression type: '{kind}'")
            }
            OrmError::ParameterConflict(name) => {
                write!(f, "Parameter '{name}' is already bound to a different value")
            }
            OrmError::ArgumentMismatch(s) => write!(f, "Argument mismatch: {s}"),
            OrmError::UnsupportedDialect(s) => write!(f, "Unsupported by dialect: {s}"),
            OrmError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            OrmError::QueryError(s) => write!(f, "Query error: {s}"),
            OrmError::ParseError(s) => write!(f, "Parse error: {s}"),
            OrmError::ConfigError(s) => write!(f, "Configuration error: {s}"),
            OrmError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for OrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrmError::PostgresError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for OrmError {
    fn from(err: PostgresError) -> Self {
        OrmError::PostgresError(err)
    }
}

impl From<config::ConfigError> for OrmError {
    fn from(err: config::ConfigError) -> Self {
        OrmError::ConfigError(err.to_string())
    }
}

impl OrmError {
    /// Mapping errors: unmapped types/properties and unsupported id lookups
    pub fn is_mapping_error(&self) -> bool {
        matches!(
            self,
            OrmError::UnmappedEntity(_)
                | OrmError::UnmappedProperty { .. }
                | OrmError::CompositeKey(_)
                | OrmError::PartitionKeyRequired(_)
                | OrmError::InvalidSchema(_)
        )
    }

    /// Expression compilation errors
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            OrmError::UnsupportedUnaryOperator(_)
                | OrmError::UnsupportedBinaryOperator(_)
                | OrmError::UnsupportedMethod(_)
                | OrmError::UnhandledExpression(_)
                | OrmError::ParameterConflict(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_operator_message_names_operator() {
        let err = OrmError::UnsupportedBinaryOperator("Divide".to_string());
        assert_eq!(err.to_string(), "The binary operator 'Divide' is not supported");
        assert!(err.is_compile_error());
        assert!(!err.is_mapping_error());
    }

    #[test]
    fn test_unmapped_property_display() {
        let err = OrmError::UnmappedProperty {
            entity: "User".to_string(),
            property: "nickname".to_string(),
        };
        assert!(err.to_string().contains("nickname"));
        assert!(err.is_mapping_error());
    }

    #[test]
    fn test_unhandled_expression_display() {
        let err = OrmError::UnhandledExpression("Conditional".to_string());
        assert!(err.to_string().contains("Unhandled expression type"));
    }
}
