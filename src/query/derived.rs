//! Queries derived from method names.
//!
//! A [`DerivedQuery`] holds the parsed [`PartTree`] and turns it into a
//! `sea_query::SelectStatement` per call. Parts consume bound values in declaration
//! order; an `OR` between groups becomes `Condition::any`, the parts of a group
//! `Condition::all`.

use crate::domain::{Direction, Order};
use crate::executor::{LifeError, Statement};
use crate::metadata::EntityInformation;
use crate::query::error::{BindingError, ConstructionError, QueryError};
use crate::query::parameters::{Binding, BoundParameters, BoundValue};
use crate::query::parser::{Part, PartKind, PartTree};
use crate::query::rewrite;
use crate::query::value_conversion::is_null;
use sea_query::{
    Condition, DynIden, Expr, ExprTrait, Func, Order as SqlOrder, PostgresQueryBuilder, Query,
    SelectStatement, Value,
};
use std::sync::Arc;

/// Query built from a parsed method name.
pub struct DerivedQuery {
    method: String,
    tree: PartTree,
    entity: Arc<dyn EntityInformation>,
}

impl DerivedQuery {
    /// Parses `method` against `entity`.
    ///
    /// # Errors
    ///
    /// `ConstructionError::InvalidMethodName` or `ConstructionError::UnknownProperty`.
    pub fn new(method: &str, entity: Arc<dyn EntityInformation>) -> Result<Self, ConstructionError> {
        let tree = PartTree::parse(method, entity.as_ref())?;
        log::debug!(
            "Derived query for {}.{}: {} part(s), distinct={}",
            entity.entity_name(),
            method,
            tree.parts().count(),
            tree.distinct
        );
        Ok(Self {
            method: method.to_string(),
            tree,
            entity,
        })
    }

    pub fn tree(&self) -> &PartTree {
        &self.tree
    }

    /// Values a call must bind: the sum of the parts' arities.
    pub fn placeholder_count(&self) -> usize {
        self.tree.arity()
    }

    /// Primary query: filter, static `OrderBy` then the call's dynamic sort.
    pub fn create_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        let mut select = self.select(bound)?;
        for order in &self.tree.order_by {
            self.order_by(&mut select, order)?;
        }
        for order in &bound.dynamic_sort() {
            self.order_by(&mut select, order)?;
        }
        let (sql, values) = select.build(PostgresQueryBuilder);
        Ok(Statement::new(sql, values.0))
    }

    /// Count query over the same filter and values.
    pub fn create_count_query(&self, bound: &BoundParameters) -> Result<Statement, QueryError> {
        let (sql, values) = self.select(bound)?.build(PostgresQueryBuilder);
        Ok(Statement::new(rewrite::derive_count_query(&sql), values.0))
    }

    fn select(&self, bound: &BoundParameters) -> Result<SelectStatement, QueryError> {
        let mut select = Query::select();
        select
            .column(sea_query::Asterisk)
            .from(DynIden::from(self.entity.table_name().to_string()));
        if self.tree.distinct {
            select.distinct();
        }

        if !self.tree.predicate.is_empty() {
            let mut args = Args {
                bindings: bound.bindings().iter(),
                consumed: 0,
                expected: self.placeholder_count(),
            };
            let mut any = Condition::any();
            for group in &self.tree.predicate {
                let mut all = Condition::all();
                for part in group {
                    all = all.add(self.condition(part, &mut args)?);
                }
                any = any.add(all);
            }
            select.cond_where(any);
        }
        Ok(select)
    }

    fn column(&self, property: &str) -> Result<DynIden, QueryError> {
        self.entity
            .column_for(property)
            .map(|c| DynIden::from(c.to_string()))
            .ok_or_else(|| {
                LifeError::QueryError(format!(
                    "Property '{property}' of method '{}' has no column",
                    self.method
                ))
                .into()
            })
    }

    fn condition(&self, part: &Part, args: &mut Args<'_>) -> Result<Expr, QueryError> {
        let col = Expr::col(self.column(&part.property)?);
        let ic = part.ignore_case;

        let expr = match part.kind {
            PartKind::SimpleProperty => {
                let value = args.single()?;
                if is_null(&value) {
                    col.is_null()
                } else {
                    lower_if(col, ic).eq(operand(value, ic))
                }
            }
            PartKind::NegatingSimpleProperty => {
                let value = args.single()?;
                if is_null(&value) {
                    col.is_not_null()
                } else {
                    lower_if(col, ic).ne(operand(value, ic))
                }
            }
            PartKind::LessThan | PartKind::Before => lower_if(col, ic).lt(operand(args.single()?, ic)),
            PartKind::LessThanEqual => lower_if(col, ic).lte(operand(args.single()?, ic)),
            PartKind::GreaterThan | PartKind::After => lower_if(col, ic).gt(operand(args.single()?, ic)),
            PartKind::GreaterThanEqual => lower_if(col, ic).gte(operand(args.single()?, ic)),
            PartKind::Between => {
                let low = operand(args.single()?, ic);
                let high = operand(args.single()?, ic);
                lower_if(col, ic).between(low, high)
            }
            PartKind::Like => lower_if(col, ic).like(pattern(part, args.single()?, ic, "", "")?.as_str()),
            PartKind::NotLike => {
                lower_if(col, ic).not_like(pattern(part, args.single()?, ic, "", "")?.as_str())
            }
            PartKind::StartingWith => {
                lower_if(col, ic).like(pattern(part, args.single()?, ic, "", "%")?.as_str())
            }
            PartKind::EndingWith => {
                lower_if(col, ic).like(pattern(part, args.single()?, ic, "%", "")?.as_str())
            }
            PartKind::Containing => {
                lower_if(col, ic).like(pattern(part, args.single()?, ic, "%", "%")?.as_str())
            }
            PartKind::In => lower_if(col, ic).is_in(args.list()?.into_iter().map(|v| operand(v, ic))),
            PartKind::NotIn => {
                lower_if(col, ic).is_not_in(args.list()?.into_iter().map(|v| operand(v, ic)))
            }
            PartKind::IsNull => col.is_null(),
            PartKind::IsNotNull => col.is_not_null(),
            PartKind::True => col.eq(true),
            PartKind::False => col.eq(false),
        };
        Ok(expr)
    }

    fn order_by(&self, select: &mut SelectStatement, order: &Order) -> Result<(), QueryError> {
        let column = self
            .entity
            .column_for(&order.property)
            .ok_or_else(|| BindingError::UnknownSortProperty {
                property: order.property.clone(),
            })?;
        let direction = match order.direction {
            Direction::Asc => SqlOrder::Asc,
            Direction::Desc => SqlOrder::Desc,
        };
        let column = DynIden::from(column.to_string());
        if order.ignore_case {
            select.order_by_expr(Func::lower(Expr::col(column)).into(), direction);
        } else {
            select.order_by(column, direction);
        }
        Ok(())
    }
}

/// Cursor over a call's bindings, consumed part by part.
struct Args<'a> {
    bindings: std::slice::Iter<'a, Binding>,
    consumed: usize,
    expected: usize,
}

impl Args<'_> {
    fn next(&mut self) -> Result<&BoundValue, BindingError> {
        let binding = self.bindings.next().ok_or(BindingError::ParameterCount {
            placeholders: self.expected,
            arguments: self.consumed,
        })?;
        self.consumed += 1;
        Ok(&binding.value)
    }

    fn single(&mut self) -> Result<Value, QueryError> {
        match self.next()? {
            BoundValue::Single(value) => Ok(value.clone()),
            BoundValue::List(_) => Err(LifeError::QueryError(
                "A collection argument was bound to a single-value predicate".to_string(),
            )
            .into()),
        }
    }

    fn list(&mut self) -> Result<Vec<Value>, QueryError> {
        Ok(match self.next()? {
            BoundValue::Single(value) => vec![value.clone()],
            BoundValue::List(values) => values.clone(),
        })
    }
}

fn lower_if(expr: Expr, ignore_case: bool) -> Expr {
    if ignore_case {
        Func::lower(expr).into()
    } else {
        expr
    }
}

fn operand(value: Value, ignore_case: bool) -> Expr {
    let expr = Expr::val(value);
    if ignore_case {
        Func::lower(expr).into()
    } else {
        expr
    }
}

/// LIKE pattern for a part. Wildcards in the argument are escaped unless the
/// operator is a raw `Like`/`NotLike`, whose argument already is a pattern.
fn pattern(part: &Part, value: Value, ignore_case: bool, prefix: &str, suffix: &str) -> Result<String, QueryError> {
    let text = match value {
        Value::String(Some(s)) => s.to_string(),
        Value::Char(Some(c)) => c.to_string(),
        other => {
            return Err(LifeError::QueryError(format!(
                "Property '{}' needs a text argument for {:?}, got {other:?}",
                part.property, part.kind
            ))
            .into())
        }
    };
    let text = if matches!(part.kind, PartKind::Like | PartKind::NotLike) {
        text
    } else {
        escape_like(&text)
    };
    let text = if ignore_case { text.to_lowercase() } else { text };
    Ok(format!("{prefix}{text}{suffix}"))
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pageable, Sort};
    use crate::metadata::EntityMetadata;
    use crate::query::parameters::{Argument, Parameter, ParameterBinder, Parameters};

    fn user() -> Arc<dyn EntityInformation> {
        Arc::new(
            EntityMetadata::builder("User", "users")
                .column("firstName")
                .column("lastName")
                .column("age")
                .column("active")
                .column("address.city")
                .build(),
        )
    }

    fn build(method: &str, params: Vec<Parameter>, args: &[Argument]) -> (Statement, Statement) {
        let query = DerivedQuery::new(method, user()).unwrap();
        let parameters = Parameters::new(method, params).unwrap();
        let bound = ParameterBinder::new(&parameters)
            .bind(args, query.placeholder_count())
            .unwrap();
        (
            query.create_query(&bound).unwrap(),
            query.create_count_query(&bound).unwrap(),
        )
    }

    #[test]
    fn test_simple_equality() {
        let (primary, _) = build("findByLastName", vec![Parameter::positional()], &["Lee".into()]);
        assert_eq!(primary.sql, r#"SELECT * FROM "users" WHERE "last_name" = $1"#);
        assert_eq!(primary.values, vec![Value::from("Lee")]);
    }

    #[test]
    fn test_and_or_groups() {
        let (primary, _) = build(
            "findByLastNameAndAgeGreaterThanOrActiveTrue",
            vec![Parameter::positional(), Parameter::positional()],
            &["Lee".into(), 30i32.into()],
        );
        assert!(primary.sql.contains(r#""last_name" = $1"#));
        assert!(primary.sql.contains(r#""age" > $2"#));
        assert!(primary.sql.contains(r#""active" = TRUE"#) || primary.sql.contains(r#""active" = $3"#));
        assert!(primary.sql.contains(" OR "));
    }

    #[test]
    fn test_null_equality_renders_is_null() {
        let (primary, _) = build("findByLastName", vec![Parameter::positional()], &[Argument::Null]);
        assert_eq!(primary.sql, r#"SELECT * FROM "users" WHERE "last_name" IS NULL"#);
        assert!(primary.values.is_empty());
    }

    #[test]
    fn test_containing_escapes_wildcards() {
        let (primary, _) = build("findByFirstNameContaining", vec![Parameter::positional()], &["50%".into()]);
        assert!(primary.sql.contains(r#""first_name" LIKE"#));
        assert_eq!(primary.values, vec![Value::from(r"%50\%%")]);
    }

    #[test]
    fn test_ignore_case_lowers_both_sides() {
        let (primary, _) = build("findByLastNameIgnoreCase", vec![Parameter::positional()], &["LEE".into()]);
        assert!(primary.sql.contains(r#"LOWER("last_name") = LOWER($1)"#));
    }

    #[test]
    fn test_in_with_list() {
        let (primary, _) = build(
            "findByAgeIn",
            vec![Parameter::positional()],
            &[Argument::List(vec![1i32.into(), 2i32.into(), 3i32.into()])],
        );
        assert!(primary.sql.contains(r#""age" IN ($1, $2, $3)"#));
        assert_eq!(primary.values.len(), 3);
    }

    #[test]
    fn test_static_and_dynamic_ordering() {
        let sort = Sort::by([Order::desc("firstName")]);
        let pageable = Pageable::with_sort(0, 10, sort).unwrap();
        let (primary, count) = build(
            "findByAgeOrderByLastNameAsc",
            vec![Parameter::positional(), Parameter::pageable()],
            &[20i32.into(), Argument::Pageable(pageable)],
        );
        assert!(primary.sql.ends_with(r#"ORDER BY "last_name" ASC, "first_name" DESC"#));
        assert!(!count.sql.contains("ORDER BY"));
    }

    #[test]
    fn test_count_shares_filter_text_and_values() {
        let (primary, count) = build(
            "findByLastNameAndAddressCity",
            vec![Parameter::positional(), Parameter::positional()],
            &["Lee".into(), "Oslo".into()],
        );
        let filter = &primary.sql[primary.sql.find(" FROM ").unwrap()..];
        assert_eq!(count.sql, format!("SELECT COUNT(*){filter}"));
        assert_eq!(count.values, primary.values);
    }

    #[test]
    fn test_distinct_count_wraps_primary() {
        let (primary, count) = build("findDistinctByLastName", vec![Parameter::positional()], &["Lee".into()]);
        assert!(primary.sql.starts_with("SELECT DISTINCT"));
        assert_eq!(count.sql, format!("SELECT COUNT(*) FROM ({}) AS count_subquery", primary.sql));
    }

    #[test]
    fn test_unknown_dynamic_sort_property() {
        let query = DerivedQuery::new("findByAge", user()).unwrap();
        let parameters = Parameters::new("findByAge", vec![Parameter::positional(), Parameter::sort()]).unwrap();
        let bound = ParameterBinder::new(&parameters)
            .bind(&[1i32.into(), Argument::Sort(Sort::by([Order::asc("nickname")]))], 1)
            .unwrap();
        let err = query.create_query(&bound).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Binding(BindingError::UnknownSortProperty { .. })
        ));
    }

    #[test]
    fn test_find_all_has_no_where() {
        let (primary, count) = build("findAll", vec![], &[]);
        assert_eq!(primary.sql, r#"SELECT * FROM "users""#);
        assert_eq!(count.sql, r#"SELECT COUNT(*) FROM "users""#);
    }
}
