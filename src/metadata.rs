//! Entity metadata consulted while deriving queries.
//!
//! [`EntityInformation`] is what the query core needs to know about a mapped entity:
//! its name, table, identity attribute and which property paths exist.
//! [`EntityMetadata`] is a schema table built once from the entity mapping; property
//! lookups are plain map reads, and misses are remembered so repeated probing of the
//! same bad path (method-name parsing tries several splits) stays cheap.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

/// Metadata about a mapped entity type.
pub trait EntityInformation: Send + Sync {
    /// Entity name used to key named queries (`User` in `User.findByEmail`).
    fn entity_name(&self) -> &str;

    /// Table the entity is mapped to.
    fn table_name(&self) -> &str;

    /// Property path of the identity attribute.
    fn id_attribute(&self) -> &str;

    /// Whether `path` (dot separated, e.g. `address.city`) names a mapped property.
    fn property_exists(&self, path: &str) -> bool;

    /// Column for a mapped property path.
    fn column_for(&self, path: &str) -> Option<&str>;
}

/// One mapped property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMapping {
    pub path: String,
    pub column: String,
}

/// Explicit schema lookup table for one entity.
#[derive(Debug)]
pub struct EntityMetadata {
    entity_name: String,
    table_name: String,
    id_attribute: String,
    properties: BTreeMap<String, PropertyMapping>,
    misses: RwLock<HashSet<String>>,
}

impl EntityMetadata {
    /// Starts a builder. The identity attribute defaults to `id`.
    pub fn builder(entity_name: impl Into<String>, table_name: impl Into<String>) -> EntityMetadataBuilder {
        EntityMetadataBuilder {
            entity_name: entity_name.into(),
            table_name: table_name.into(),
            id_attribute: "id".to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// All mapped properties, ordered by path.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyMapping> {
        self.properties.values()
    }

    fn is_known_miss(&self, path: &str) -> bool {
        match self.misses.read() {
            Ok(misses) => misses.contains(path),
            Err(poisoned) => poisoned.into_inner().contains(path),
        }
    }

    fn remember_miss(&self, path: &str) {
        let mut misses = match self.misses.write() {
            Ok(misses) => misses,
            Err(poisoned) => poisoned.into_inner(),
        };
        misses.insert(path.to_string());
    }
}

impl EntityInformation for EntityMetadata {
    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    fn property_exists(&self, path: &str) -> bool {
        if self.properties.contains_key(path) {
            return true;
        }
        if !self.is_known_miss(path) {
            self.remember_miss(path);
        }
        false
    }

    fn column_for(&self, path: &str) -> Option<&str> {
        self.properties.get(path).map(|p| p.column.as_str())
    }
}

/// Builder for [`EntityMetadata`].
#[derive(Debug)]
pub struct EntityMetadataBuilder {
    entity_name: String,
    table_name: String,
    id_attribute: String,
    properties: BTreeMap<String, PropertyMapping>,
}

impl EntityMetadataBuilder {
    /// Maps `path` to `column`.
    pub fn property(mut self, path: impl Into<String>, column: impl Into<String>) -> Self {
        let path = path.into();
        self.properties.insert(
            path.clone(),
            PropertyMapping {
                path,
                column: column.into(),
            },
        );
        self
    }

    /// Maps `path` to a snake_case column derived from it (`address.zipCode` -> `address_zip_code`).
    pub fn column(self, path: impl Into<String>) -> Self {
        let path = path.into();
        let column = snake_case(&path);
        self.property(path, column)
    }

    /// Declares the identity attribute, mapping it if it is not mapped yet.
    pub fn id(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !self.properties.contains_key(&path) {
            self = self.column(path.clone());
        }
        self.id_attribute = path;
        self
    }

    pub fn build(mut self) -> EntityMetadata {
        if !self.properties.contains_key(&self.id_attribute) {
            let id = self.id_attribute.clone();
            self = self.column(id);
        }
        EntityMetadata {
            entity_name: self.entity_name,
            table_name: self.table_name,
            id_attribute: self.id_attribute,
            properties: self.properties,
            misses: RwLock::new(HashSet::new()),
        }
    }
}

/// `lastName` -> `last_name`, `address.city` -> `address_city`.
pub fn snake_case(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 4);
    for (i, ch) in path.chars().enumerate() {
        if ch == '.' {
            out.push('_');
        } else if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> EntityMetadata {
        EntityMetadata::builder("User", "users")
            .column("firstName")
            .column("lastName")
            .property("emailAddress", "email")
            .column("address.city")
            .build()
    }

    #[test]
    fn test_id_defaults_to_id_and_is_mapped() {
        let meta = user();
        assert_eq!(meta.id_attribute(), "id");
        assert_eq!(meta.column_for("id"), Some("id"));
    }

    #[test]
    fn test_explicit_and_derived_columns() {
        let meta = user();
        assert_eq!(meta.column_for("lastName"), Some("last_name"));
        assert_eq!(meta.column_for("emailAddress"), Some("email"));
        assert_eq!(meta.column_for("address.city"), Some("address_city"));
    }

    #[test]
    fn test_negative_lookups_are_memoized() {
        let meta = user();
        assert!(!meta.property_exists("nickname"));
        assert!(meta.is_known_miss("nickname"));
        assert!(!meta.property_exists("nickname"));
        assert!(meta.property_exists("lastName"));
        assert!(!meta.is_known_miss("lastName"));
    }

    #[test]
    fn test_custom_id_attribute() {
        let meta = EntityMetadata::builder("Account", "accounts").id("accountNumber").build();
        assert_eq!(meta.id_attribute(), "accountNumber");
        assert_eq!(meta.column_for("accountNumber"), Some("account_number"));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("lastName"), "last_name");
        assert_eq!(snake_case("address.zipCode"), "address_zip_code");
        assert_eq!(snake_case("id"), "id");
    }
}
