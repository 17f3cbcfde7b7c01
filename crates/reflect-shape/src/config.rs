//! Extractor configuration
//!
//! Loadable from TOML:
//!
//! ```toml
//! fill_arg_names = true
//! fill_return_names = true
//! doc_truncation_size = 40
//!
//! [package_roots]
//! "example.com/app" = "/src/app"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reflect_shape_metadata::LookupOptions;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Default number of doc characters kept by description views
pub const DEFAULT_DOC_TRUNCATION_SIZE: usize = 10;

/// Default recursion depth guard
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Extractor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Do not attach doc comments to function shapes
    pub skip_docs: bool,

    /// Replace empty parameter names with `ctx` / `arg{i}`
    pub fill_arg_names: bool,

    /// Replace empty return names with `err` / `err{i}` / `ret{i}`
    pub fill_return_names: bool,

    /// Parse `_test` source files as part of their package
    pub include_test_files: bool,

    /// Look up and list unexported declarations
    pub include_unexported: bool,

    /// Re-run the naming fixup when a function type is met again
    /// through a different function value
    pub revisit_arglist: bool,

    /// Characters of documentation kept when rendering views
    pub doc_truncation_size: usize,

    /// Maximum recursion depth of one extraction
    pub max_depth: usize,

    /// Import path prefix → source directory
    pub package_roots: BTreeMap<String, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_docs: false,
            fill_arg_names: false,
            fill_return_names: false,
            include_test_files: false,
            include_unexported: false,
            revisit_arglist: false,
            doc_truncation_size: DEFAULT_DOC_TRUNCATION_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            package_roots: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Parse a configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "max_depth must be at least 1".to_string(),
            ));
        }
        for prefix in self.package_roots.keys() {
            if prefix.is_empty() || prefix.ends_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid package root prefix: {prefix:?}"
                )));
            }
        }
        Ok(())
    }

    /// Options for the metadata lookup service
    pub fn lookup_options(&self) -> LookupOptions {
        LookupOptions {
            include_test_files: self.include_test_files,
            include_unexported: self.include_unexported,
            package_roots: self
                .package_roots
                .iter()
                .map(|(prefix, dir)| (prefix.clone(), dir.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.doc_truncation_size, 10);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_parse() {
        let config = Config::from_toml_str(
            r#"
fill_arg_names = true
fill_return_names = true
revisit_arglist = true
doc_truncation_size = 40

[package_roots]
"example.com/app" = "/src/app"
"#,
        )
        .unwrap();
        assert!(config.fill_arg_names);
        assert!(config.revisit_arglist);
        assert!(!config.skip_docs);
        assert_eq!(config.doc_truncation_size, 40);

        let options = config.lookup_options();
        assert_eq!(
            options.package_roots,
            vec![("example.com/app".to_string(), PathBuf::from("/src/app"))]
        );
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            Config::from_toml_str("max_depth = 0"),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(matches!(
            Config::from_toml_str("unknown_key = 1"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[package_roots]\n\"a/\" = \"/x\""),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.toml");
        std::fs::write(&path, "skip_docs = true\n").unwrap();
        assert!(Config::from_file(&path).unwrap().skip_docs);
        assert!(matches!(
            Config::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::IoError(_))
        ));
    }
}
