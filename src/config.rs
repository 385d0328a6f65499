//! Build configuration
//!
//! Limits and checks of a build, read from a TOML file:
//!
//! ```toml
//! max_nesting_depth = 100
//! max_call_depth = 100
//! check_dataflow = true
//! require_initial_values = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Deepest allowed chain of nested submodels
    pub max_nesting_depth: usize,
    /// Deepest allowed chain of inlined calls
    pub max_call_depth: usize,
    /// Run the dataflow checker on every compiled object
    pub check_dataflow: bool,
    /// Parameters and state variables must be assigned by the init phases
    pub require_initial_values: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 100,
            max_call_depth: 100,
            check_dataflow: true,
            require_initial_values: true,
        }
    }
}

impl BuildConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
