use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    pub version: String,

    #[serde(default)]
    pub input: Option<InputConfig>,

    #[serde(default)]
    pub output: Option<PathBuf>,

    #[serde(default)]
    pub generation: GenerationOptions,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InputConfig {
    /// `openapi3` or `swagger2`; detected from the document when absent
    #[serde(default)]
    pub dialect: Option<String>,

    pub source: PathBuf,
}

/// Everything `generate` needs to know besides the document itself.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationOptions {
    pub optional_style: OptionalStyle,

    /// Escalate empty-extension warnings to errors; the host also fails on
    /// critical issues.
    pub strict: bool,

    pub security: SecurityOptions,

    pub server: ServerOptions,

    pub split: SplitOptions,
}

/// How a non-required field is represented.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptionalStyle {
    /// Nilable pointer wrapper
    #[default]
    Pointer,
    /// Plain value, zero value means absent
    Value,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SecurityOptions {
    /// Per-scheme helpers, OAuth2/OIDC clients and credential providers
    pub client: bool,

    /// Operation -> requirement metadata and the validator
    pub enforcement: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            client: true,
            enforcement: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerOptions {
    pub responses: bool,
    pub binder: bool,
    pub middleware: bool,
    pub stubs: bool,

    /// `stdlib`, `chi`, `gorilla` or `echo`; `null` disables the router
    pub router: Option<String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            responses: true,
            binder: true,
            middleware: true,
            stubs: true,
            router: Some("stdlib".to_string()),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SplitOptions {
    pub strategy: SplitStrategy,
    pub max_lines: Option<usize>,
    pub max_types: Option<usize>,
    pub max_operations: Option<usize>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Operation tag, then first path segment
    #[default]
    Tag,
    /// First path segment only
    Path,
    /// Everything in one bucket
    Single,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            input: None,
            output: Some(PathBuf::from("generated")),
            generation: GenerationOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_everything() {
        let options = GenerationOptions::default();
        assert_eq!(options.optional_style, OptionalStyle::Pointer);
        assert!(options.security.client && options.security.enforcement);
        assert!(options.server.binder && options.server.stubs);
        assert_eq!(options.server.router.as_deref(), Some("stdlib"));
        assert_eq!(options.split.strategy, SplitStrategy::Tag);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
version: "1.0"
generation:
  optionalStyle: value
  server:
    router: chi
    stubs: false
  split:
    maxOperations: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let generation = config.generation;
        assert_eq!(generation.optional_style, OptionalStyle::Value);
        assert_eq!(generation.server.router.as_deref(), Some("chi"));
        assert!(!generation.server.stubs);
        assert!(generation.server.responses);
        assert_eq!(generation.split.max_operations, Some(5));
        assert!(config.output.is_none());
    }

    #[test]
    fn test_null_router_disables_it() {
        let yaml = "version: \"1.0\"\ngeneration:\n  server:\n    router: null\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.generation.server.router.is_none());
    }
}
