//! Configuration schema for kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`

use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Frontend image used for the `# syntax=` header and for variable stages
pub const DEFAULT_SYNTAX_IMAGE: &str = "docker/dockerfile:1.4";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Builder backend settings
    pub builder: BuilderConfig,

    /// Secret sources that build definitions may reference by id
    pub secrets: Vec<SecretSource>,
}

/// Builder backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Docker CLI executable
    pub executable: String,

    /// Dockerfile frontend image
    pub syntax_image: String,

    /// Docker client config directory passed as `--config`
    pub docker_config: Option<PathBuf>,

    /// Always pull images before building
    pub force_pull: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            executable: "docker".to_string(),
            syntax_image: DEFAULT_SYNTAX_IMAGE.to_string(),
            docker_config: None,
            force_pull: false,
        }
    }
}

/// A secret available to builds: `id` is referenced from build definitions,
/// `path` is the file on the host handed to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSource {
    pub id: String,
    pub path: String,
}

impl Config {
    /// Secret sources with `~` and `$VAR` expanded in their paths
    pub fn expanded_secrets(&self) -> KilnResult<Vec<SecretSource>> {
        self.secrets
            .iter()
            .map(|s| {
                let path = shellexpand::full(&s.path).map_err(|e| {
                    KilnError::User(format!("Cannot expand path of secret {}: {}", s.id, e))
                })?;
                Ok(SecretSource {
                    id: s.id.clone(),
                    path: path.into_owned(),
                })
            })
            .collect()
    }
}
