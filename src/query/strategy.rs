//! Query resolution: which query a method runs.

use crate::executor::Statement;
use crate::metadata::EntityInformation;
use crate::named_queries::NamedQueries;
use crate::query::declared::{DeclaredQuery, DeclaredText};
use crate::query::derived::DerivedQuery;
use crate::query::error::{ConstructionError, QueryError};
use crate::query::method::QueryMethod;
use crate::query::parameters::BoundParameters;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where a method's query comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryLookupStrategy {
    /// Always derive from the method name
    Create,
    /// Require declared text or a named query
    UseDeclaredQuery,
    /// Declared text, then a named query, then derivation
    #[default]
    CreateIfNotFound,
}

impl FromStr for QueryLookupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "create" => Ok(QueryLookupStrategy::Create),
            "use-declared-query" => Ok(QueryLookupStrategy::UseDeclaredQuery),
            "create-if-not-found" => Ok(QueryLookupStrategy::CreateIfNotFound),
            other => Err(format!("Unknown query lookup strategy: {other}")),
        }
    }
}

impl fmt::Display for QueryLookupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryLookupStrategy::Create => "create",
            QueryLookupStrategy::UseDeclaredQuery => "use-declared-query",
            QueryLookupStrategy::CreateIfNotFound => "create-if-not-found",
        })
    }
}

/// A method's resolved query.
pub enum QueryStrategy {
    Derived(DerivedQuery),
    Declared(DeclaredQuery),
}

impl QueryStrategy {
    /// Picks and builds the query for `method`.
    ///
    /// # Errors
    ///
    /// `NoDeclaredQuery` when `UseDeclaredQuery` finds no text,
    /// `ModifyingWithoutQuery` when a modifying method would be derived,
    /// `NativeDynamicSorting` for a native named query on a sorted or paged method,
    /// and any parse error of a derived query.
    pub fn resolve(
        method: &QueryMethod,
        lookup: QueryLookupStrategy,
        named: &NamedQueries,
        entity: Arc<dyn EntityInformation>,
    ) -> Result<Self, ConstructionError> {
        let declared = || -> Option<DeclaredText> {
            method
                .declared()
                .or_else(|| named.lookup(entity.entity_name(), method.name()))
                .cloned()
        };

        let text = match lookup {
            QueryLookupStrategy::Create => None,
            QueryLookupStrategy::UseDeclaredQuery => Some(declared().ok_or_else(|| {
                ConstructionError::NoDeclaredQuery {
                    method: method.name().to_string(),
                }
            })?),
            QueryLookupStrategy::CreateIfNotFound => declared(),
        };

        match text {
            Some(text) => {
                if text.native && method.parameters().has_special() {
                    return Err(ConstructionError::NativeDynamicSorting {
                        method: method.name().to_string(),
                    });
                }
                log::debug!(
                    "{}.{} uses declared{} query",
                    entity.entity_name(),
                    method.name(),
                    if text.native { " native" } else { "" }
                );
                Ok(QueryStrategy::Declared(DeclaredQuery::new(text, entity)))
            }
            None if method.is_modifying() => Err(ConstructionError::ModifyingWithoutQuery {
                method: method.name().to_string(),
            }),
            None => {
                #[cfg(feature = "tracing")]
                let _span =
                    crate::metrics::tracing_helpers::derive_query_span(entity.entity_name(), method.name())
                        .entered();
                Ok(QueryStrategy::Derived(DerivedQuery::new(method.name(), entity)?))
            }
        }
    }

    pub fn placeholder_count(&self) -> usize {
        match self {
            QueryStrategy::Derived(q) => q.placeholder_count(),
            QueryStrategy::Declared(q) => q.placeholder_count(),
        }
    }

    pub fn create_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        match self {
            QueryStrategy::Derived(q) => q.create_query(bound),
            QueryStrategy::Declared(q) => q.create_query(bound),
        }
    }

    pub fn create_count_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        match self {
            QueryStrategy::Derived(q) => q.create_count_query(bound),
            QueryStrategy::Declared(q) => q.create_count_query(bound),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryStrategy::Derived(_) => "derived",
            QueryStrategy::Declared(q) if q.is_native() => "native",
            QueryStrategy::Declared(_) => "declared",
        }
    }
}

impl fmt::Debug for QueryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStrategy::Derived(q) => f.debug_tuple("Derived").field(q.tree()).finish(),
            QueryStrategy::Declared(q) => f.debug_tuple("Declared").field(q.text()).finish(),
        }
    }
}
