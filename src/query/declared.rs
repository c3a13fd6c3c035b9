//! Queries whose text is declared on the method or in a named-query file.
//!
//! The text is split into segments once, at construction. Each call renders it by
//! replacing `?N` and `:name` with Postgres `$k` placeholders in order of first
//! appearance; a repeated placeholder reuses its `$k` and a collection argument
//! expands to `$k, $k+1, ...` (an empty one to an empty subquery).

use crate::executor::Statement;
use crate::metadata::EntityInformation;
use crate::query::error::{BindingError, QueryError};
use crate::query::parameters::{BoundParameters, BoundValue};
use crate::query::rewrite::{self, Segment};
use sea_query::Value;
use std::sync::Arc;

/// Query text as declared for a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredText {
    pub query: String,
    pub count_query: Option<String>,
    pub native: bool,
}

impl DeclaredText {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count_query: None,
            native: false,
        }
    }
}

const EMPTY_LIST: &str = "SELECT NULL WHERE FALSE";

pub struct DeclaredQuery {
    text: DeclaredText,
    segments: Vec<Segment>,
    count_segments: Vec<Segment>,
    entity: Arc<dyn EntityInformation>,
}

impl DeclaredQuery {
    pub fn new(text: DeclaredText, entity: Arc<dyn EntityInformation>) -> Self {
        let segments = rewrite::parse_placeholders(&text.query);
        let count_text = match &text.count_query {
            Some(count) => count.clone(),
            None => rewrite::derive_count_query(&text.query),
        };
        let count_segments = rewrite::parse_placeholders(&count_text);
        Self {
            text,
            segments,
            count_segments,
            entity,
        }
    }

    pub fn text(&self) -> &DeclaredText {
        &self.text
    }

    pub fn is_native(&self) -> bool {
        self.text.native
    }

    /// Distinct placeholders in the primary text.
    pub fn placeholder_count(&self) -> usize {
        rewrite::placeholder_count(&self.segments)
    }

    /// Primary query. Non-native text gets the call's dynamic sort appended.
    pub fn create_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        let (sql, values) = render(&self.segments, bound)?;
        let sql = if self.text.native {
            sql
        } else {
            rewrite::apply_sorting(&sql, &bound.dynamic_sort(), self.entity.as_ref())?
        };
        Ok(Statement::new(sql, values))
    }

    pub fn create_count_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        let (sql, values) = render(&self.count_segments, bound)?;
        Ok(Statement::new(sql, values))
    }
}

fn render(segments: &[Segment], bound: &BoundParameters) -> Result<(String, Vec<Value>), BindingError> {
    let mut sql = String::new();
    let mut values = Vec::new();
    let mut rendered: Vec<(&Segment, String)> = Vec::new();

    for segment in segments {
        let binding = match segment {
            Segment::Text(text) => {
                sql.push_str(text);
                continue;
            }
            Segment::Positional(position) => bound.by_position(*position),
            Segment::Named(name) => bound.by_name(name),
        };

        if let Some((_, previous)) = rendered.iter().find(|(s, _)| *s == segment) {
            sql.push_str(previous);
            continue;
        }

        let binding = binding.ok_or_else(|| BindingError::UnresolvedPlaceholder {
            placeholder: match segment {
                Segment::Positional(position) => format!("?{position}"),
                Segment::Named(name) => format!(":{name}"),
                Segment::Text(text) => text.clone(),
            },
        })?;

        let placeholders = match &binding.value {
            BoundValue::Single(value) => {
                values.push(value.clone());
                format!("${}", values.len())
            }
            // empty subquery: IN is false and NOT IN true for every row
            BoundValue::List(list) if list.is_empty() => EMPTY_LIST.to_string(),
            BoundValue::List(list) => list
                .iter()
                .map(|value| {
                    values.push(value.clone());
                    format!("${}", values.len())
                })
                .collect::<Vec<_>>()
                .join(", "),
        };
        sql.push_str(&placeholders);
        rendered.push((segment, placeholders));
    }

    Ok((sql, values))
}
