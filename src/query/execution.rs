//! Execution of a resolved query, shaped by the method's cardinality.
//!
//! [`Execution`] is chosen per call from the method descriptor and consumed by a
//! single [`Execution::execute`]. Statements go to the session's [`LifeExecutor`];
//! its errors are returned unchanged.

use crate::domain::Page;
use crate::executor::{FromRow, IdentityCache, LifeError, LifeExecutor};
use crate::query::error::QueryError;
use crate::query::method::{Cardinality, QueryMethod};
use crate::query::parameters::BoundParameters;
use crate::query::strategy::QueryStrategy;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Shaped result of one repository call.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<M> {
    Single(Option<M>),
    Collection(Vec<M>),
    Page(Page<M>),
    /// Rows affected by a modifying statement
    Modified(u64),
}

impl<M> QueryResult<M> {
    pub fn into_single(self) -> Option<M> {
        match self {
            QueryResult::Single(model) => model,
            QueryResult::Collection(mut models) if models.len() == 1 => models.pop(),
            _ => None,
        }
    }

    /// Rows of any read shape as a vector.
    pub fn into_vec(self) -> Vec<M> {
        match self {
            QueryResult::Single(model) => model.into_iter().collect(),
            QueryResult::Collection(models) => models,
            QueryResult::Page(page) => page.into_content(),
            QueryResult::Modified(_) => Vec::new(),
        }
    }

    pub fn into_page(self) -> Option<Page<M>> {
        match self {
            QueryResult::Page(page) => Some(page),
            _ => None,
        }
    }

    pub fn affected_rows(&self) -> Option<u64> {
        match self {
            QueryResult::Modified(n) => Some(*n),
            _ => None,
        }
    }
}

/// How one call runs.
pub enum Execution<'s> {
    /// Zero or one row
    Single,
    /// All rows, windowed when a pageable was supplied
    Collection,
    /// Count first, then the requested window
    Paged,
    /// Write statement, then optionally clear the identity cache
    Modifying {
        clear_automatically: bool,
        cache: Option<&'s dyn IdentityCache>,
    },
}

impl<'s> Execution<'s> {
    /// Execution for `method` against `session`.
    ///
    /// The modifying variant receives the session's identity cache only when the
    /// method asks for clearing.
    pub fn for_method<S: LifeExecutor>(method: &QueryMethod, session: &'s S) -> Self {
        match method.cardinality() {
            Cardinality::Single => Execution::Single,
            Cardinality::Collection => Execution::Collection,
            Cardinality::Paging => Execution::Paged,
            Cardinality::Modifying => {
                let clear_automatically = method.clear_automatically();
                Execution::Modifying {
                    clear_automatically,
                    cache: if clear_automatically {
                        session.identity_cache()
                    } else {
                        None
                    },
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Execution::Single => "single",
            Execution::Collection => "collection",
            Execution::Paged => "paged",
            Execution::Modifying { .. } => "modifying",
        }
    }

    /// Runs the query and shapes the result. Nothing runs if the statements
    /// cannot be built.
    pub fn execute<S, M>(
        self,
        session: &S,
        strategy: &QueryStrategy,
        bound: &BoundParameters,
    ) -> Result<QueryResult<M>, QueryError>
    where
        S: LifeExecutor,
        M: FromRow<S::Row>,
    {
        match self {
            Execution::Single => {
                let statement = strategy.create_query(bound)?;
                let rows = session.query_all(&statement)?;
                match rows.len() {
                    0 => Ok(QueryResult::Single(None)),
                    1 => Ok(QueryResult::Single(Some(M::from_row(&rows[0])?))),
                    count => Err(QueryError::NonUniqueResult { count }),
                }
            }
            Execution::Collection => {
                let mut statement = strategy.create_query(bound)?;
                if let Some(pageable) = bound.pageable() {
                    statement = statement.with_window(pageable.window());
                }
                let rows = session.query_all(&statement)?;
                Ok(QueryResult::Collection(map_rows(&rows)?))
            }
            Execution::Paged => {
                let Some(pageable) = bound.pageable() else {
                    let statement = strategy.create_query(bound)?;
                    let rows = session.query_all(&statement)?;
                    return Ok(QueryResult::Page(Page::unpaged(map_rows(&rows)?)));
                };

                let primary = strategy.create_query(bound)?;
                let count = strategy.create_count_query(bound)?;
                let total = session.query_count(&count)?;
                if total == 0 || pageable.offset() >= total {
                    log::debug!(
                        "Page {} of size {} is past {total} row(s), skipping primary query",
                        pageable.page_index(),
                        pageable.page_size()
                    );
                    return Ok(QueryResult::Page(Page::new(Vec::new(), pageable, total)));
                }

                let rows = session.query_all(&primary.with_window(pageable.window()))?;
                Ok(QueryResult::Page(Page::new(map_rows(&rows)?, pageable, total)))
            }
            Execution::Modifying {
                clear_automatically,
                cache,
            } => {
                let statement = strategy.create_query(bound)?;
                let affected = session.execute(&statement)?;
                match cache {
                    Some(cache) => {
                        cache.clear_identity_cache();
                        #[cfg(feature = "metrics")]
                        METRICS.record_cache_clear();
                        log::debug!("Cleared identity cache after modifying query ({affected} row(s))");
                    }
                    None if clear_automatically => {
                        log::warn!("Modifying query asked to clear the identity cache but the session has none");
                    }
                    None => {}
                }
                Ok(QueryResult::Modified(affected))
            }
        }
    }
}

fn map_rows<R, M: FromRow<R>>(rows: &[R]) -> Result<Vec<M>, LifeError> {
    rows.iter().map(M::from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Pageable;
    use crate::metadata::{EntityInformation, EntityMetadata};
    use crate::named_queries::NamedQueries;
    use crate::query::method::{MethodSignature, ReturnType};
    use crate::query::parameters::{Argument, Parameter, ParameterBinder};
    use crate::query::strategy::QueryLookupStrategy;
    use crate::test_helpers::MockExecutor;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        last_name: String,
    }

    fn user() -> Arc<dyn EntityInformation> {
        Arc::new(EntityMetadata::builder("User", "users").column("lastName").build())
    }

    fn run(
        session: &MockExecutor,
        signature: MethodSignature,
        args: &[Argument],
    ) -> Result<QueryResult<User>, QueryError> {
        let method = QueryMethod::new(signature).unwrap();
        let strategy =
            QueryStrategy::resolve(&method, QueryLookupStrategy::CreateIfNotFound, &NamedQueries::new(), user())
                .unwrap();
        let bound = ParameterBinder::new(method.parameters()).bind(args, strategy.placeholder_count())?;
        Execution::for_method(&method, session).execute(session, &strategy, &bound)
    }

    fn five_users() -> MockExecutor {
        MockExecutor::with_rows((1..=5).map(|id| json!({ "id": id, "last_name": if id % 2 == 0 { "Lee" } else { "Kim" } })))
    }

    #[test]
    fn test_single_absent_and_non_unique() {
        let session = five_users();
        let signature = || MethodSignature::new("findByLastName", ReturnType::Entity).param(Parameter::positional());

        let absent = run(&session, signature(), &["Park".into()]).unwrap();
        assert_eq!(absent, QueryResult::Single(None));

        let err = run(&session, signature(), &["Lee".into()]).unwrap_err();
        assert!(matches!(err, QueryError::NonUniqueResult { count: 2 }));
    }

    #[test]
    fn test_paged_runs_count_then_window() {
        let session = five_users();
        let page = run(
            &session,
            MethodSignature::new("findAll", ReturnType::Page).param(Parameter::pageable()),
            &[Argument::Pageable(Pageable::new(1, 2).unwrap())],
        )
        .unwrap()
        .into_page()
        .unwrap();

        assert_eq!(page.content().len(), 2);
        assert_eq!(page.total_count(), 5);
        let statements = session.statements();
        assert!(statements[0].sql.starts_with("SELECT COUNT(*)"));
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_paged_past_end_skips_primary() {
        let session = five_users();
        let page = run(
            &session,
            MethodSignature::new("findAll", ReturnType::Page).param(Parameter::pageable()),
            &[Argument::Pageable(Pageable::new(7, 2).unwrap())],
        )
        .unwrap()
        .into_page()
        .unwrap();

        assert!(page.content().is_empty());
        assert_eq!(page.total_count(), 5);
        assert_eq!(session.statements().len(), 1);
    }

    #[test]
    fn test_modifying_clears_cache_before_returning() {
        let session = five_users();
        session.cache_all();
        assert_eq!(session.cached_count(), 5);

        let result = run(
            &session,
            MethodSignature::new("deleteAll", ReturnType::AffectedRows)
                .modifying(true)
                .query("DELETE FROM users"),
            &[],
        )
        .unwrap();

        assert_eq!(result.affected_rows(), Some(5));
        assert_eq!(session.cached_count(), 0);
        assert_eq!(session.cache_clears(), 1);
    }

    #[test]
    fn test_modifying_without_clear_keeps_cache() {
        let session = five_users();
        session.cache_all();
        run(
            &session,
            MethodSignature::new("deleteAll", ReturnType::AffectedRows)
                .modifying(false)
                .query("DELETE FROM users"),
            &[],
        )
        .unwrap();
        assert_eq!(session.cache_clears(), 0);
        assert_eq!(session.cached_count(), 5);
    }

    #[test]
    fn test_database_errors_pass_through() {
        let session = five_users();
        session.fail_next(LifeError::QueryError("relation \"users\" does not exist".into()));
        let err = run(
            &session,
            MethodSignature::new("findAll", ReturnType::Collection),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::Database(LifeError::QueryError(ref m)) if m.contains("does not exist")));
    }
}
