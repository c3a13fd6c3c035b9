//! Repository method descriptors.
//!
//! A [`MethodSignature`] is what a repository declares: name, parameters, return type
//! and annotations. [`QueryMethod::new`] validates it once and fixes its
//! [`Cardinality`]; the result is immutable and shared by every call.

use crate::query::declared::DeclaredText;
use crate::query::error::ConstructionError;
use crate::query::parameters::{Parameter, Parameters};

/// Declared return shape of a repository method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// Zero or one entity
    Entity,
    Collection,
    Page,
    /// Affected row count of a modifying statement
    AffectedRows,
    Unit,
}

/// How results of a method are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    Single,
    Collection,
    Paging,
    Modifying,
}

/// Declaration of a repository method.
#[derive(Debug, Clone)]
pub struct MethodSignature {
    name: String,
    parameters: Vec<Parameter>,
    return_type: ReturnType,
    modifying: bool,
    clear_automatically: bool,
    declared: Option<DeclaredText>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, return_type: ReturnType) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            return_type,
            modifying: false,
            clear_automatically: false,
            declared: None,
        }
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn params(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Marks the method as a write. With `clear_automatically` the session's identity
    /// cache is cleared after each execution.
    pub fn modifying(mut self, clear_automatically: bool) -> Self {
        self.modifying = true;
        self.clear_automatically = clear_automatically;
        self
    }

    /// Declares the query text.
    pub fn query(mut self, text: impl Into<String>) -> Self {
        let count_query = self.declared.take().and_then(|d| d.count_query);
        self.declared = Some(DeclaredText {
            query: text.into(),
            count_query,
            native: false,
        });
        self
    }

    /// Declares query text passed to the database as written.
    pub fn native_query(self, text: impl Into<String>) -> Self {
        let mut signature = self.query(text);
        if let Some(declared) = signature.declared.as_mut() {
            declared.native = true;
        }
        signature
    }

    /// Explicit count query for paging. Ignored unless query text is declared too.
    pub fn count_query(mut self, text: impl Into<String>) -> Self {
        let declared = self.declared.get_or_insert_with(|| DeclaredText::new(String::new()));
        declared.count_query = Some(text.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Validated, immutable method descriptor.
#[derive(Debug, Clone)]
pub struct QueryMethod {
    name: String,
    cardinality: Cardinality,
    return_type: ReturnType,
    parameters: Parameters,
    clear_automatically: bool,
    declared: Option<DeclaredText>,
}

impl QueryMethod {
    /// Validates `signature`.
    ///
    /// # Errors
    ///
    /// `ConstructionError` for contradictory declarations: paging or special
    /// parameters on a modifying method, return types that do not fit the method's
    /// kind, paging without a pageable parameter, sorting on native queries, and
    /// duplicate parameters.
    pub fn new(signature: MethodSignature) -> Result<Self, ConstructionError> {
        let MethodSignature {
            name,
            parameters,
            return_type,
            modifying,
            clear_automatically,
            declared,
        } = signature;

        let parameters = Parameters::new(&name, parameters)?;
        let declared = declared.filter(|d| !d.query.trim().is_empty());
        let method = || name.clone();

        let cardinality = if modifying {
            if return_type == ReturnType::Page || parameters.has_special() {
                return Err(ConstructionError::ModifyingPaging { method: method() });
            }
            if !matches!(return_type, ReturnType::AffectedRows | ReturnType::Unit) {
                return Err(ConstructionError::ModifyingReturnType { method: method() });
            }
            Cardinality::Modifying
        } else {
            match return_type {
                ReturnType::AffectedRows | ReturnType::Unit => {
                    return Err(ConstructionError::ReadReturnType { method: method() })
                }
                ReturnType::Page => {
                    if !parameters.has_pageable() {
                        return Err(ConstructionError::PagingWithoutPageable { method: method() });
                    }
                    Cardinality::Paging
                }
                ReturnType::Collection => Cardinality::Collection,
                ReturnType::Entity => Cardinality::Single,
            }
        };

        if declared.as_ref().is_some_and(|d| d.native) && parameters.has_special() {
            return Err(ConstructionError::NativeDynamicSorting { method: method() });
        }

        if clear_automatically && cardinality != Cardinality::Modifying {
            log::warn!("clear_automatically has no effect on read method '{name}'");
        }

        Ok(Self {
            name,
            cardinality,
            return_type,
            parameters,
            clear_automatically,
            declared,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn return_type(&self) -> ReturnType {
        self.return_type
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn is_modifying(&self) -> bool {
        self.cardinality == Cardinality::Modifying
    }

    /// Whether a modifying execution clears the identity cache.
    pub fn clear_automatically(&self) -> bool {
        self.clear_automatically && self.is_modifying()
    }

    pub fn declared(&self) -> Option<&DeclaredText> {
        self.declared.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinality_precedence() {
        let single = QueryMethod::new(MethodSignature::new("findByEmail", ReturnType::Entity).param(Parameter::positional())).unwrap();
        assert_eq!(single.cardinality(), Cardinality::Single);

        let collection = QueryMethod::new(
            MethodSignature::new("findByLastName", ReturnType::Collection)
                .param(Parameter::positional())
                .param(Parameter::pageable()),
        )
        .unwrap();
        assert_eq!(collection.cardinality(), Cardinality::Collection);

        let paging = QueryMethod::new(MethodSignature::new("findAll", ReturnType::Page).param(Parameter::pageable())).unwrap();
        assert_eq!(paging.cardinality(), Cardinality::Paging);

        let modifying = QueryMethod::new(
            MethodSignature::new("deactivate", ReturnType::AffectedRows)
                .modifying(true)
                .query("UPDATE users SET active = false"),
        )
        .unwrap();
        assert_eq!(modifying.cardinality(), Cardinality::Modifying);
        assert!(modifying.clear_automatically());
    }

    #[test]
    fn test_modifying_paging_is_rejected() {
        let err = QueryMethod::new(
            MethodSignature::new("deleteAll", ReturnType::Page)
                .param(Parameter::pageable())
                .modifying(false)
                .query("DELETE FROM users"),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::ModifyingPaging { .. }));

        let err = QueryMethod::new(
            MethodSignature::new("deleteSome", ReturnType::AffectedRows)
                .param(Parameter::sort())
                .modifying(false)
                .query("DELETE FROM users"),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::ModifyingPaging { .. }));
    }

    #[test]
    fn test_return_type_must_match_kind() {
        let err = QueryMethod::new(
            MethodSignature::new("touch", ReturnType::Collection)
                .modifying(false)
                .query("UPDATE users SET seen = now()"),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::ModifyingReturnType { .. }));

        let err = QueryMethod::new(MethodSignature::new("findAll", ReturnType::AffectedRows)).unwrap_err();
        assert!(matches!(err, ConstructionError::ReadReturnType { .. }));
    }

    #[test]
    fn test_page_requires_pageable() {
        let err = QueryMethod::new(MethodSignature::new("findAll", ReturnType::Page)).unwrap_err();
        assert!(matches!(err, ConstructionError::PagingWithoutPageable { .. }));
    }

    #[test]
    fn test_native_query_rejects_dynamic_sort() {
        let err = QueryMethod::new(
            MethodSignature::new("findAllNative", ReturnType::Collection)
                .param(Parameter::sort())
                .native_query("SELECT * FROM users"),
        )
        .unwrap_err();
        assert!(matches!(err, ConstructionError::NativeDynamicSorting { .. }));
    }

    #[test]
    fn test_count_query_before_query_is_kept() {
        let method = QueryMethod::new(
            MethodSignature::new("findActive", ReturnType::Page)
                .param(Parameter::pageable())
                .count_query("SELECT COUNT(*) FROM users WHERE active")
                .query("SELECT * FROM users WHERE active"),
        )
        .unwrap();
        let declared = method.declared().unwrap();
        assert_eq!(declared.query, "SELECT * FROM users WHERE active");
        assert_eq!(declared.count_query.as_deref(), Some("SELECT COUNT(*) FROM users WHERE active"));
    }

    #[test]
    fn test_clear_automatically_ignored_on_reads() {
        let method = QueryMethod::new(MethodSignature::new("findAll", ReturnType::Collection)).unwrap();
        assert!(!method.clear_automatically());
    }
}
