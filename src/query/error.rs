//! Error types raised by repository queries.
//!
//! Three kinds of failure originate here. Everything else is a `LifeError` from the
//! executor and is passed through untouched inside [`QueryError::Database`].

use crate::executor::LifeError;
use std::fmt;

/// Static programming mistakes detected while building a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// A modifying method declared a paged return type
    ModifyingPaging { method: String },
    /// A modifying method must return an affected-row count or nothing
    ModifyingReturnType { method: String },
    /// A read method declared a write-only return type
    ReadReturnType { method: String },
    /// A modifying method has no declared query text to run
    ModifyingWithoutQuery { method: String },
    /// A paged return type without a pageable parameter
    PagingWithoutPageable { method: String },
    /// More than one pageable/sort parameter, or both kinds at once
    DuplicateSpecialParameter { method: String },
    /// The same parameter name was declared twice
    DuplicateParameterName { method: String, name: String },
    /// Native queries are passed through verbatim and cannot be sorted or paged
    NativeDynamicSorting { method: String },
    /// The method name does not follow `find…By…`
    InvalidMethodName { method: String, reason: String },
    /// A derived query references a property the entity does not map
    UnknownProperty { method: String, property: String, entity: String },
    /// Lookup required a declared query but none was found
    NoDeclaredQuery { method: String },
    /// Two methods with the same name on one repository
    DuplicateMethod { method: String },
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::ModifyingPaging { method } => {
                write!(f, "Method '{method}' is modifying and cannot return a page")
            }
            ConstructionError::ModifyingReturnType { method } => {
                write!(
                    f,
                    "Modifying method '{method}' must return an affected row count or nothing"
                )
            }
            ConstructionError::ReadReturnType { method } => {
                write!(
                    f,
                    "Method '{method}' is not modifying but declares a write-only return type"
                )
            }
            ConstructionError::ModifyingWithoutQuery { method } => {
                write!(f, "Modifying method '{method}' needs a declared query")
            }
            ConstructionError::PagingWithoutPageable { method } => {
                write!(f, "Paging method '{method}' needs a pageable parameter")
            }
            ConstructionError::DuplicateSpecialParameter { method } => {
                write!(
                    f,
                    "Method '{method}' may declare at most one pageable or one sort parameter"
                )
            }
            ConstructionError::DuplicateParameterName { method, name } => {
                write!(f, "Method '{method}' declares parameter '{name}' more than once")
            }
            ConstructionError::NativeDynamicSorting { method } => {
                write!(
                    f,
                    "Native query method '{method}' cannot use dynamic sorting or pagination"
                )
            }
            ConstructionError::InvalidMethodName { method, reason } => {
                write!(f, "Cannot derive a query from method name '{method}': {reason}")
            }
            ConstructionError::UnknownProperty {
                method,
                property,
                entity,
            } => {
                write!(
                    f,
                    "No property '{property}' found on entity '{entity}' (method '{method}')"
                )
            }
            ConstructionError::NoDeclaredQuery { method } => {
                write!(f, "No declared or named query found for method '{method}'")
            }
            ConstructionError::DuplicateMethod { method } => {
                write!(f, "Method '{method}' is declared more than once")
            }
        }
    }
}

impl std::error::Error for ConstructionError {}

/// Per-call argument problems, detected before anything is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Non-special argument count differs from the query's placeholder count
    ParameterCount { placeholders: usize, arguments: usize },
    /// A pageable/sort slot received some other kind of argument
    SpecialParameter { index: usize, expected: &'static str },
    /// A placeholder in declared query text has no matching argument
    UnresolvedPlaceholder { placeholder: String },
    /// A dynamic sort names a property the entity does not map
    UnknownSortProperty { property: String },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingError::ParameterCount {
                placeholders,
                arguments,
            } => {
                write!(
                    f,
                    "Query declares {placeholders} placeholder(s) but {arguments} argument(s) were given"
                )
            }
            BindingError::SpecialParameter { index, expected } => {
                write!(f, "Argument {index} must be a {expected}")
            }
            BindingError::UnresolvedPlaceholder { placeholder } => {
                write!(f, "No argument bound to placeholder '{placeholder}'")
            }
            BindingError::UnknownSortProperty { property } => {
                write!(f, "Cannot sort by unknown property '{property}'")
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// Errors returned from `RepositoryQuery::execute`.
#[derive(Debug)]
pub enum QueryError {
    /// Arguments could not be bound; nothing was executed
    Binding(BindingError),
    /// A single-result query returned more than one row
    NonUniqueResult { count: usize },
    /// Error from the executor, unchanged
    Database(LifeError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::Binding(e) => write!(f, "Binding error: {e}"),
            QueryError::NonUniqueResult { count } => {
                write!(f, "Expected at most one result, got {count}")
            }
            QueryError::Database(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Binding(e) => Some(e),
            QueryError::NonUniqueResult { .. } => None,
            QueryError::Database(e) => Some(e),
        }
    }
}

impl From<BindingError> for QueryError {
    fn from(error: BindingError) -> Self {
        QueryError::Binding(error)
    }
}

impl From<LifeError> for QueryError {
    fn from(error: LifeError) -> Self {
        QueryError::Database(error)
    }
}
