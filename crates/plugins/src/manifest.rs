//! `plugin.toml`: the manifest that makes a plugin directory loadable.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const MANIFEST_FILE: &str = "plugin.toml";

/// Parsed `plugin.toml`.
///
/// ```toml
/// entrypoint = "example"
/// description = "Toggle and whoami demo"
/// enabled = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// Name of the catalog entry that builds this plugin's handler.
    pub entrypoint: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PluginManifest {
    pub fn parse(raw: &str, dir: &Path) -> Result<Self> {
        toml::from_str(raw).map_err(|source| Error::InvalidManifest {
            dir: dir.to_path_buf(),
            source,
        })
    }

    /// Read `<dir>/plugin.toml`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingManifest {
                    dir: dir.to_path_buf(),
                });
            },
            Err(e) => return Err(e.into()),
        };
        Self::parse(&raw, dir)
    }
}
