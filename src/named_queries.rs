//! Named queries: declared query text kept outside the method declarations.
//!
//! Queries are keyed `<EntityName>.<methodName>`. A file is read with the `config`
//! crate, so TOML, JSON and YAML all work:
//!
//! ```toml
//! [[queries]]
//! name = "User.findByEmailAddress"
//! query = "SELECT * FROM users WHERE email = :email"
//!
//! [[queries]]
//! name = "User.findActive"
//! query = "SELECT u.* FROM users u WHERE u.active"
//! count_query = "SELECT COUNT(*) FROM users WHERE active"
//! ```

use crate::query::declared::DeclaredText;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct NamedQueryFile {
    #[serde(default)]
    queries: Vec<NamedQueryDef>,
}

#[derive(Debug, Deserialize)]
struct NamedQueryDef {
    name: String,
    query: String,
    #[serde(default)]
    count_query: Option<String>,
    #[serde(default)]
    native: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NamedQueries {
    queries: HashMap<String, DeclaredText>,
}

impl NamedQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads queries from `path`; the extension picks the format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or names the same
    /// query twice.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder().add_source(File::with_name(path)).build()?;
        let file: NamedQueryFile = settings.try_deserialize()?;

        let mut named = Self::new();
        for def in file.queries {
            if named.queries.contains_key(&def.name) {
                return Err(ConfigError::Message(format!(
                    "Named query '{}' is defined more than once in {path}",
                    def.name
                )));
            }
            named.queries.insert(
                def.name,
                DeclaredText {
                    query: def.query,
                    count_query: def.count_query,
                    native: def.native,
                },
            );
        }
        log::debug!("Loaded {} named queries from {path}", named.len());
        Ok(named)
    }

    /// Registers `text` under `name` (`Entity.method`), replacing any previous entry.
    pub fn with(mut self, name: impl Into<String>, text: DeclaredText) -> Self {
        self.queries.insert(name.into(), text);
        self
    }

    pub fn lookup(&self, entity_name: &str, method: &str) -> Option<&DeclaredText> {
        self.queries.get(&format!("{entity_name}.{method}"))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_named_queries_from_toml() {
        let path = write_temp(
            "named",
            r#"
[[queries]]
name = "User.findByEmailAddress"
query = "SELECT * FROM users WHERE email = :email"

[[queries]]
name = "User.findActive"
query = "SELECT * FROM users WHERE active"
count_query = "SELECT COUNT(*) FROM users WHERE active"
"#,
        );
        let named = NamedQueries::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(named.len(), 2);
        let text = named.lookup("User", "findByEmailAddress").unwrap();
        assert_eq!(text.query, "SELECT * FROM users WHERE email = :email");
        assert!(!text.native);
        assert!(named.lookup("User", "findActive").unwrap().count_query.is_some());
        assert!(named.lookup("Account", "findActive").is_none());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let path = write_temp(
            "dup",
            r#"
[[queries]]
name = "User.findAll"
query = "SELECT * FROM users"

[[queries]]
name = "User.findAll"
query = "SELECT * FROM users ORDER BY id"
"#,
        );
        let result = NamedQueries::load(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(NamedQueries::load("/nonexistent/lifeguard-named-queries.toml").is_err());
    }

    #[test]
    fn test_programmatic_registration() {
        let named = NamedQueries::new().with("User.findAll", DeclaredText::new("SELECT * FROM users"));
        assert_eq!(named.lookup("User", "findAll").unwrap().query, "SELECT * FROM users");
    }
}
