//! Configuration loaded once per process
//!
//! Sources, first match wins:
//!
//! 1. `resnap.toml` in the working directory (the whole file is the section)
//! 2. `Cargo.toml` in the working directory, `[package.metadata.resnap]`
//!    then `[workspace.metadata.resnap]`
//!
//! ```toml
//! [package.metadata.resnap]
//! enabled = true
//! save_to = "local"
//! output_base_path = "results"
//! max_history_files_length = 10
//! max_history_files_time_unit = "day"
//! ```
//!
//! A missing manifest or an unsupported file type falls back to the
//! defaults with a warning; a section that does not parse is an error.

use crate::retention::{RetentionPolicy, TimeUnit};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Dedicated configuration file name
pub const CONFIG_FILE: &str = "resnap.toml";

/// Cargo manifest name
pub const MANIFEST_FILE: &str = "Cargo.toml";

/// Where checkpoints are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Services {
    /// Local filesystem
    #[default]
    Local,
    /// S3-compatible object store
    Remote,
}

impl Services {
    /// Get service name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Services {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::UnsupportedBackend(format!(
                "{other} (expected local or remote)"
            ))),
        }
    }
}

/// Credentials and endpoint of the remote object store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Bucket holding `output_base_path`
    pub bucket_name: String,
    /// Region, when the endpoint needs one
    #[serde(default)]
    pub region_name: Option<String>,
    /// Custom endpoint (MinIO, Ceph, ...)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Path-style addressing
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Request signature version
    #[serde(default = "default_signature_version")]
    pub signature_version: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("bucket_name", &self.bucket_name)
            .field("region_name", &self.region_name)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("signature_version", &self.signature_version)
            .finish()
    }
}

const fn default_true() -> bool {
    true
}

fn default_signature_version() -> String {
    "s3v4".to_string()
}

fn default_output_base_path() -> String {
    "resnap".to_string()
}

const fn default_history_length() -> u64 {
    3
}

/// Process-wide checkpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Checkpointing on/off; off makes every checkpoint a pass-through
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Storage target
    #[serde(default)]
    pub save_to: Services,
    /// Root of every checkpoint folder
    #[serde(default = "default_output_base_path")]
    pub output_base_path: String,
    /// Retention horizon length
    #[serde(default = "default_history_length")]
    pub max_history_files_length: u64,
    /// Retention horizon unit
    #[serde(default)]
    pub max_history_files_time_unit: TimeUnit,
    /// Remote store settings (required when `save_to = "remote"`)
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            save_to: Services::Local,
            output_base_path: default_output_base_path(),
            max_history_files_length: default_history_length(),
            max_history_files_time_unit: TimeUnit::Day,
            remote: None,
        }
    }
}

impl Config {
    /// Load from the current working directory.
    ///
    /// # Errors
    /// Returns `Configuration` if a manifest section exists but is invalid
    pub fn load() -> Result<Self> {
        Self::load_in(&std::env::current_dir()?)
    }

    /// Load from the manifests of `dir`.
    ///
    /// # Errors
    /// Returns `Configuration` if a manifest section exists but is invalid
    pub fn load_in(dir: &Path) -> Result<Self> {
        for name in [CONFIG_FILE, MANIFEST_FILE] {
            let path = dir.join(name);
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        warn!(dir = %dir.display(), "No resnap configuration found, using defaults");
        Ok(Self::default())
    }

    /// Load from one file.
    ///
    /// # Errors
    /// Returns `Configuration` if the file cannot be read or its section
    /// is invalid
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            warn!(path = %path.display(), "Unsupported configuration file type, using defaults");
            return Ok(Self::default());
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Configuration file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "cannot read {}: {e}",
                    path.display()
                )))
            }
        };
        let is_manifest = path.file_name().and_then(|n| n.to_str()) == Some(MANIFEST_FILE);
        Self::parse(&contents, is_manifest)
            .map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text. A Cargo manifest carries the settings under
    /// `[package.metadata.resnap]` or `[workspace.metadata.resnap]`, any
    /// other file is the section itself.
    ///
    /// # Errors
    /// Returns `Configuration` if the TOML or the section is invalid
    pub fn parse(contents: &str, manifest: bool) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid TOML: {e}")))?;

        let section = if manifest {
            let lookup = |root: &str| {
                table
                    .get(root)
                    .and_then(|v| v.get("metadata"))
                    .and_then(|v| v.get("resnap"))
                    .cloned()
            };
            match lookup("package").or_else(|| lookup("workspace")) {
                Some(section) => section,
                None => {
                    debug!("Manifest has no resnap section, using defaults");
                    return Ok(Self::default());
                }
            }
        } else {
            toml::Value::Table(table)
        };

        let config: Self = section
            .try_into()
            .map_err(|e| Error::Configuration(format!("invalid resnap section: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns `Configuration` on an empty base path
    pub fn validate(&self) -> Result<()> {
        if self.output_base_path.trim().is_empty() {
            return Err(Error::Configuration(
                "output_base_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Retention policy derived from the history settings
    #[must_use]
    pub const fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.max_history_files_length, self.max_history_files_time_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.enabled);
        assert_eq!(config.save_to, Services::Local);
        assert_eq!(config.output_base_path, "resnap");
        assert_eq!(config.retention(), RetentionPolicy::new(3, TimeUnit::Day));
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_parse_manifest_section() {
        let manifest = r#"
[package]
name = "pipeline"

[package.metadata.resnap]
enabled = false
output_base_path = "results"
max_history_files_length = 10
max_history_files_time_unit = "second"
"#;
        let config = Config::parse(manifest, true).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.output_base_path, "results");
        assert_eq!(config.retention(), RetentionPolicy::new(10, TimeUnit::Second));
    }

    #[test]
    fn test_parse_workspace_section() {
        let manifest = r#"
[workspace]
members = []

[workspace.metadata.resnap]
save_to = "remote"

[workspace.metadata.resnap.remote]
access_key = "id"
secret_key = "secret"
bucket_name = "bucket"
endpoint_url = "http://localhost:9000"
"#;
        let config = Config::parse(manifest, true).unwrap();
        assert_eq!(config.save_to, Services::Remote);
        let remote = config.remote.unwrap();
        assert_eq!(remote.bucket_name, "bucket");
        assert!(remote.force_path_style);
        assert_eq!(remote.signature_version, "s3v4");
        assert!(!format!("{remote:?}").contains("secret\""));
    }

    #[test]
    fn test_manifest_without_section() {
        let config = Config::parse("[package]\nname = \"x\"\n", true).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_section_is_error() {
        for text in [
            "save_to = \"ftp\"",
            "max_history_files_time_unit = \"fortnight\"",
            "output_base_path = \"\"",
            "colour = \"blue\"",
        ] {
            let err = Config::parse(text, false).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{text}");
        }
    }

    #[test]
    fn test_load_in_prefers_dedicated_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "output_base_path = \"a\"\n").unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "[package.metadata.resnap]\noutput_base_path = \"b\"\n",
        )
        .unwrap();
        assert_eq!(Config::load_in(dir.path()).unwrap().output_base_path, "a");
    }

    #[test]
    fn test_load_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_in(dir.path()).unwrap(), Config::default());

        let yaml = dir.path().join("resnap.yaml");
        std::fs::write(&yaml, "enabled: false").unwrap();
        assert_eq!(Config::load_from(&yaml).unwrap(), Config::default());

        let missing = dir.path().join("missing.toml");
        assert_eq!(Config::load_from(&missing).unwrap(), Config::default());
    }

    #[test]
    fn test_services_from_str() {
        assert_eq!("Remote".parse::<Services>().unwrap(), Services::Remote);
        assert!(matches!(
            "ftp".parse::<Services>(),
            Err(Error::UnsupportedBackend(_))
        ));
    }
}
