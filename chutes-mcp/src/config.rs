//! Settings document.
//!
//! The YAML file may reference environment variables as `${VAR}`; they are
//! substituted textually before parsing, with unset variables becoming empty
//! strings. Lookups use dotted keys (`chutes.endpoints.llm`) and never fail.

use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config document: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid placeholder pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Read-only settings tree, loaded once at startup and shared.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    root: Value,
}

impl Settings {
    /// Reads, substitutes and parses the YAML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml_str(&text)?;
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let resolved = substitute_env(text)?;
        let root = config::Config::builder()
            .add_source(config::File::from_str(&resolved, config::FileFormat::Yaml))
            .build()?
            .try_deserialize::<Value>()?;
        Ok(Self { root })
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Walks `key` split on `.` through nested mappings.
    ///
    /// `None` when a segment is missing, an intermediate value is not a
    /// mapping, or the value found is `null`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut value = &self.root;
        for segment in key.split('.') {
            value = value.as_object()?.get(segment)?;
        }
        (!value.is_null()).then_some(value)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        match self.get(key) {
            Some(value) => value.clone(),
            None => {
                tracing::debug!("Setting {} not found, using default {}", key, default);
                default
            }
        }
    }

    /// String value of `key`; empty strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str().filter(|s| !s.is_empty())
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_str(key).unwrap_or(default).to_string()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Replaces every `${VAR}` in `text` with the value of the environment
/// variable, or the empty string when it is unset.
pub fn substitute_env(text: &str) -> Result<String, ConfigError> {
    let pattern = Regex::new(r"\$\{(.*?)\}")?;
    let resolved = pattern.replace_all(text, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    });
    Ok(resolved.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn nested() -> Settings {
        Settings::from_value(json!({
            "a": { "b": { "c": 5 }, "s": "text" },
            "empty": "",
            "nothing": null,
            "flags": { "on": true, "word": "no" }
        }))
    }

    #[test]
    fn test_dotted_lookup() {
        let settings = nested();
        assert_eq!(settings.get("a.b.c"), Some(&json!(5)));
        assert_eq!(settings.get_or("a.x", json!("fallback")), json!("fallback"));
        // "a.s" is a string, so walking below it falls back.
        assert_eq!(settings.get_or("a.s.deeper", json!(1)), json!(1));
        assert!(settings.get("nothing").is_none());
        assert!(settings.get("").is_none());
    }

    #[test]
    fn test_typed_helpers() {
        let settings = nested();
        assert_eq!(settings.get_str("a.s"), Some("text"));
        assert_eq!(settings.get_str("empty"), None);
        assert_eq!(settings.get_str("a.b.c"), None);
        assert_eq!(settings.get_i64("a.b.c"), Some(5));
        assert_eq!(settings.get_bool("flags.on"), Some(true));
        assert_eq!(settings.get_bool("flags.word"), Some(false));
        assert_eq!(settings.get_string_or("a.missing", "dflt"), "dflt");
    }

    #[test]
    fn test_load_substitutes_environment() {
        std::env::set_var("CHUTES_MCP_TEST_TOKEN", "cpk_123");
        std::env::remove_var("CHUTES_MCP_TEST_UNSET");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "chutes:\n  api_token: \"${{CHUTES_MCP_TEST_TOKEN}}\"\n  other: \"${{CHUTES_MCP_TEST_UNSET}}\"\n  endpoints:\n    llm: https://llm.example/v1/chat/completions\nlogging:\n  file_enabled: false\n"
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.get_str("chutes.api_token"), Some("cpk_123"));
        assert_eq!(settings.get_str("chutes.other"), None);
        assert_eq!(
            settings.get_str("chutes.endpoints.llm"),
            Some("https://llm.example/v1/chat/completions")
        );
        assert_eq!(settings.get_bool("logging.file_enabled"), Some(false));
    }

    #[test]
    fn test_load_errors() {
        let err = Settings::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let err = Settings::from_yaml_str("chutes: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
