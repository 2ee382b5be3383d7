use super::schema::{Config, InputConfig};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./.config/apigen/config.yaml";

/// Load configuration from file or return default
pub fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config_path = match custom_path {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    };

    if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else if custom_path.is_some() {
        // Custom path specified but doesn't exist - error
        anyhow::bail!("Config file not found: {:?}", config_path);
    } else {
        // Default path doesn't exist - use built-in defaults
        Ok(Config::default())
    }
}

/// Values given on the command line; each one set overrides the config file.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub spec: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub dialect: Option<String>,
    pub router: Option<String>,
    pub strict: bool,
}

/// Merge config with CLI arguments (CLI takes precedence)
pub fn merge_with_cli_args(mut config: Config, overrides: CliOverrides) -> Config {
    if let Some(spec_path) = overrides.spec {
        match &mut config.input {
            Some(input) => input.source = spec_path,
            None => {
                config.input = Some(InputConfig {
                    dialect: None,
                    source: spec_path,
                })
            }
        }
    }

    if let (Some(dialect), Some(input)) = (overrides.dialect, config.input.as_mut()) {
        input.dialect = Some(dialect);
    }

    if let Some(output_path) = overrides.output {
        config.output = Some(output_path);
    }

    if let Some(router) = overrides.router {
        // "none" switches the router off from the command line
        config.generation.server.router = (router != "none").then_some(router);
    }

    if overrides.strict {
        config.generation.strict = true;
    }

    config
}
