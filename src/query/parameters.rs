//! Method parameters and per-call argument binding.
//!
//! A repository method declares an ordered list of [`Parameter`]s. Each is either a
//! bindable value (positional, or named for `:name` placeholders) or one of the
//! special kinds, pageable and sort. Special parameters are identified by their
//! declared kind, never by position, and are kept out of placeholder binding.

use crate::domain::{Pageable, Sort};
use crate::query::error::{BindingError, ConstructionError};
use sea_query::Value;

/// Runtime argument passed to `RepositoryQuery::execute`.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Value(Value),
    /// Collection argument, e.g. for `In` predicates
    List(Vec<Value>),
    Pageable(Pageable),
    Sort(Sort),
    /// Absent value: SQL `NULL` in a bindable slot, unpaged/unsorted in a special slot
    Null,
}

impl<T: Into<Value>> From<T> for Argument {
    fn from(value: T) -> Self {
        Argument::Value(value.into())
    }
}

/// Declared role of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Bindable,
    Pageable,
    Sort,
}

impl ParameterKind {
    pub fn is_special(self) -> bool {
        !matches!(self, ParameterKind::Bindable)
    }
}

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    kind: ParameterKind,
    name: Option<String>,
}

impl Parameter {
    /// Bindable parameter referenced as `?N` in declared queries.
    pub fn positional() -> Self {
        Self {
            kind: ParameterKind::Bindable,
            name: None,
        }
    }

    /// Bindable parameter referenced as `:name` in declared queries.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: ParameterKind::Bindable,
            name: Some(name.into()),
        }
    }

    pub fn pageable() -> Self {
        Self {
            kind: ParameterKind::Pageable,
            name: None,
        }
    }

    pub fn sort() -> Self {
        Self {
            kind: ParameterKind::Sort,
            name: None,
        }
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Validated parameter list of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    parameters: Vec<Parameter>,
    pageable_index: Option<usize>,
    sort_index: Option<usize>,
}

impl Parameters {
    pub(crate) fn new(method: &str, parameters: Vec<Parameter>) -> Result<Self, ConstructionError> {
        let mut pageable_index = None;
        let mut sort_index = None;
        let mut names: Vec<&str> = Vec::new();

        for (i, parameter) in parameters.iter().enumerate() {
            let slot = match parameter.kind {
                ParameterKind::Pageable => &mut pageable_index,
                ParameterKind::Sort => &mut sort_index,
                ParameterKind::Bindable => {
                    if let Some(name) = parameter.name() {
                        if names.contains(&name) {
                            return Err(ConstructionError::DuplicateParameterName {
                                method: method.to_string(),
                                name: name.to_string(),
                            });
                        }
                        names.push(name);
                    }
                    continue;
                }
            };
            if slot.replace(i).is_some() {
                return Err(ConstructionError::DuplicateSpecialParameter {
                    method: method.to_string(),
                });
            }
        }

        if pageable_index.is_some() && sort_index.is_some() {
            return Err(ConstructionError::DuplicateSpecialParameter {
                method: method.to_string(),
            });
        }

        Ok(Self {
            parameters,
            pageable_index,
            sort_index,
        })
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn has_pageable(&self) -> bool {
        self.pageable_index.is_some()
    }

    pub fn has_sort(&self) -> bool {
        self.sort_index.is_some()
    }

    pub fn has_special(&self) -> bool {
        self.has_pageable() || self.has_sort()
    }

    /// Parameters that bind to placeholders, in declaration order.
    pub fn bindable(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| !p.kind.is_special())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }
}

/// Value bound to one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Single(Value),
    List(Vec<Value>),
}

/// A non-special argument with its 1-based bindable position and optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub position: usize,
    pub name: Option<String>,
    pub value: BoundValue,
}

/// Result of binding one call's arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundParameters {
    bindings: Vec<Binding>,
    pageable: Option<Pageable>,
    sort: Option<Sort>,
}

impl BoundParameters {
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn by_position(&self, position: usize) -> Option<&Binding> {
        position
            .checked_sub(1)
            .and_then(|i| self.bindings.get(i))
    }

    pub fn by_name(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name.as_deref() == Some(name))
    }

    pub fn pageable(&self) -> Option<&Pageable> {
        self.pageable.as_ref()
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    /// Sort requested for this call: the pageable's sort, else the sort argument.
    pub fn dynamic_sort(&self) -> Sort {
        match (&self.pageable, &self.sort) {
            (Some(pageable), _) if pageable.sort().is_sorted() => pageable.sort().clone(),
            (_, Some(sort)) => sort.clone(),
            _ => Sort::unsorted(),
        }
    }
}

/// Binds a raw argument slice against a method's declared parameters.
#[derive(Debug, Clone, Copy)]
pub struct ParameterBinder<'p> {
    parameters: &'p Parameters,
}

impl<'p> ParameterBinder<'p> {
    pub fn new(parameters: &'p Parameters) -> Self {
        Self { parameters }
    }

    /// Splits `args` into placeholder bindings and special values.
    ///
    /// # Errors
    ///
    /// `BindingError::ParameterCount` when the number of non-special arguments is not
    /// `placeholders`; `BindingError::SpecialParameter` when a slot's argument is of
    /// the wrong kind. Value types are never checked here.
    pub fn bind(&self, args: &[Argument], placeholders: usize) -> Result<BoundParameters, BindingError> {
        let mut bound = BoundParameters::default();

        for (index, arg) in args.iter().enumerate() {
            let declared = self.parameters.get(index);
            match declared.map(Parameter::kind) {
                Some(ParameterKind::Pageable) => match arg {
                    Argument::Pageable(pageable) => bound.pageable = Some(pageable.clone()),
                    Argument::Null => {}
                    _ => {
                        return Err(BindingError::SpecialParameter {
                            index,
                            expected: "pageable",
                        })
                    }
                },
                Some(ParameterKind::Sort) => match arg {
                    Argument::Sort(sort) => bound.sort = Some(sort.clone()),
                    Argument::Null => {}
                    _ => {
                        return Err(BindingError::SpecialParameter {
                            index,
                            expected: "sort",
                        })
                    }
                },
                Some(ParameterKind::Bindable) | None => {
                    let value = match arg {
                        Argument::Value(value) => BoundValue::Single(value.clone()),
                        Argument::List(values) => BoundValue::List(values.clone()),
                        Argument::Null => BoundValue::Single(Value::String(None)),
                        Argument::Pageable(_) | Argument::Sort(_) => {
                            return Err(BindingError::SpecialParameter {
                                index,
                                expected: "bindable value",
                            })
                        }
                    };
                    bound.bindings.push(Binding {
                        position: bound.bindings.len() + 1,
                        name: declared.and_then(|p| p.name.clone()),
                        value,
                    });
                }
            }
        }

        if bound.bindings.len() != placeholders {
            return Err(BindingError::ParameterCount {
                placeholders,
                arguments: bound.bindings.len(),
            });
        }

        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Order;

    fn params(list: Vec<Parameter>) -> Parameters {
        Parameters::new("m", list).unwrap()
    }

    #[test]
    fn test_special_parameters_are_excluded_from_binding() {
        let p = params(vec![Parameter::named("lastName"), Parameter::pageable()]);
        let pageable = Pageable::new(1, 2).unwrap();
        let bound = ParameterBinder::new(&p)
            .bind(&[Argument::from("Lee"), Argument::Pageable(pageable.clone())], 1)
            .unwrap();

        assert_eq!(bound.len(), 1);
        assert_eq!(bound.by_name("lastName").unwrap().position, 1);
        assert_eq!(bound.pageable(), Some(&pageable));
    }

    #[test]
    fn test_special_parameter_found_by_kind_not_position() {
        let p = params(vec![Parameter::sort(), Parameter::positional()]);
        let sort = Sort::by([Order::desc("id")]);
        let bound = ParameterBinder::new(&p)
            .bind(&[Argument::Sort(sort.clone()), Argument::from(3i32)], 1)
            .unwrap();

        assert_eq!(bound.sort(), Some(&sort));
        assert_eq!(bound.by_position(1).unwrap().value, BoundValue::Single(Value::from(3i32)));
    }

    #[test]
    fn test_count_mismatch_is_binding_error() {
        let p = params(vec![Parameter::positional(), Parameter::positional()]);
        let err = ParameterBinder::new(&p).bind(&[Argument::from(1i32)], 2).unwrap_err();
        assert_eq!(
            err,
            BindingError::ParameterCount {
                placeholders: 2,
                arguments: 1
            }
        );
    }

    #[test]
    fn test_value_type_is_not_checked() {
        let p = params(vec![Parameter::named("age")]);
        let bound = ParameterBinder::new(&p).bind(&[Argument::from("not a number")], 1);
        assert!(bound.is_ok());
    }

    #[test]
    fn test_wrong_kind_in_special_slot() {
        let p = params(vec![Parameter::pageable()]);
        let err = ParameterBinder::new(&p).bind(&[Argument::from(1i32)], 0).unwrap_err();
        assert!(matches!(err, BindingError::SpecialParameter { index: 0, .. }));
    }

    #[test]
    fn test_null_special_means_absent() {
        let p = params(vec![Parameter::pageable()]);
        let bound = ParameterBinder::new(&p).bind(&[Argument::Null], 0).unwrap();
        assert!(bound.pageable().is_none());
    }

    #[test]
    fn test_dynamic_sort_prefers_pageable_sort() {
        let p = params(vec![Parameter::pageable()]);
        let sort = Sort::by([Order::asc("lastName")]);
        let pageable = Pageable::with_sort(0, 10, sort.clone()).unwrap();
        let bound = ParameterBinder::new(&p).bind(&[Argument::Pageable(pageable)], 0).unwrap();
        assert_eq!(bound.dynamic_sort(), sort);
    }

    #[test]
    fn test_duplicate_special_parameters_rejected() {
        let err = Parameters::new("m", vec![Parameter::pageable(), Parameter::pageable()]).unwrap_err();
        assert!(matches!(err, ConstructionError::DuplicateSpecialParameter { .. }));

        let err = Parameters::new("m", vec![Parameter::pageable(), Parameter::sort()]).unwrap_err();
        assert!(matches!(err, ConstructionError::DuplicateSpecialParameter { .. }));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = Parameters::new("m", vec![Parameter::named("a"), Parameter::named("a")]).unwrap_err();
        assert!(matches!(err, ConstructionError::DuplicateParameterName { .. }));
    }
}
