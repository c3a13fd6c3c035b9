//! Query derivation, resolution and execution for repository methods.
//!
//! # Architecture
//!
//! - **Method**: validated method descriptors (`QueryMethod`) and their cardinality
//! - **Parameters**: declared parameters and per-call binding (`ParameterBinder`)
//! - **Parser**: method-name grammar (`findDistinctByLastNameAndAgeGreaterThan…`)
//! - **Derived / Declared**: the two query sources, both producing a primary and a count statement
//! - **Strategy**: picks the source per method (`QueryLookupStrategy`)
//! - **Execution**: runs a statement and shapes the result by cardinality
//! - **Rewrite**: SQL text helpers for count derivation, aliases and sorting

pub mod declared;
pub mod derived;
pub mod error;
pub mod execution;
pub mod method;
pub mod parameters;
pub mod parser;
pub mod rewrite;
pub mod strategy;

// Value conversion utilities
pub(crate) mod value_conversion;

#[doc(inline)]
pub use declared::{DeclaredQuery, DeclaredText};
#[doc(inline)]
pub use derived::DerivedQuery;
#[doc(inline)]
pub use error::{BindingError, ConstructionError, QueryError};
#[doc(inline)]
pub use execution::{Execution, QueryResult};
#[doc(inline)]
pub use method::{Cardinality, MethodSignature, QueryMethod, ReturnType};
#[doc(inline)]
pub use parameters::{Argument, BoundParameters, Parameter, ParameterBinder, ParameterKind, Parameters};
#[doc(inline)]
pub use parser::{Part, PartKind, PartTree};
#[doc(inline)]
pub use strategy::{QueryLookupStrategy, QueryStrategy};
