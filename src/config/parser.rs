//! Manifest parser for loading the desired state.
//!
//! This module handles loading the manifest from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, NetifError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Manifest;

/// Environment variable holding the MAAS API key.
pub const API_KEY_VAR: &str = "MAAS_API_KEY";

/// Manifest parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new manifest parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads the manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(NetifError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            NetifError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            NetifError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed manifest: {} bridges, {} vlans, {} machine lookups",
            manifest.bridges.len(),
            manifest.vlans.len(),
            manifest.machines.len()
        );
        Ok(manifest)
    }

    /// Loads the manifest with environment variable overrides.
    ///
    /// `MAAS_NETIF_URL` overrides `maas.url` and `MAAS_NETIF_STATE_PATH`
    /// overrides `state.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest);
        Ok(manifest)
    }

    fn apply_env_overrides(manifest: &mut Manifest) {
        if let Ok(url) = std::env::var("MAAS_NETIF_URL") {
            debug!("Overriding maas.url from environment");
            manifest.maas.url = url;
        }

        if let Ok(path) = std::env::var("MAAS_NETIF_STATE_PATH") {
            debug!("Overriding state.path from environment");
            manifest.state.path = Some(path);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                NetifError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the MAAS API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not set.
    pub fn get_api_key() -> Result<String> {
        std::env::var(API_KEY_VAR).map_err(|_| {
            NetifError::Config(ConfigError::MissingEnvVar {
                name: String::from(API_KEY_VAR),
            })
        })
    }
}

/// Default manifest file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["maas-netif.yaml", "maas-netif.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found manifest: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(NetifError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
