//! # Lifeguard Repository
//!
//! Repository query core for Lifeguard: turns declared repository methods into SQL
//! and runs them on a `may_postgres` session.
//!
//! A method is either derived from its name (`findByLastNameOrderByAgeDesc`) or
//! carries declared query text, inline or as a named query. Each call binds its
//! arguments, picks an execution by the method's cardinality (single, collection,
//! page, modifying) and returns a [`QueryResult`].
//!
//! See [README on GitHub](https://github.com/microscaler/lifeguard) for the wider ORM.

pub mod config;
pub mod connection;
pub mod domain;
pub mod executor;
pub mod metadata;
pub mod metrics;
pub mod named_queries;
pub mod query;
pub mod repository;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use domain::{Direction, Order, Page, Pageable, Sort};
pub use executor::{FromRow, IdentityCache, LifeError, LifeExecutor, PostgresExecutor, Statement, Window};
pub use metadata::{EntityInformation, EntityMetadata};
pub use named_queries::NamedQueries;
pub use query::{
    Argument, BindingError, ConstructionError, MethodSignature, Parameter, QueryError, QueryLookupStrategy,
    QueryResult, ReturnType,
};
pub use repository::{Repository, RepositoryBuilder, RepositoryQuery};
