//! Host configuration from `cardcast.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── serve      # [serve]
//! │   ├── producer   # [producer] and [producer.crop]
//! │   └── overlay    # [overlay]
//! ├── error          # ConfigError
//! └── mod.rs         # CardcastConfig (this file)
//! ```
//!
//! A missing file is not an error: every section has defaults. CLI flags
//! are applied on top of the file.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{OverlaySection, ProducerConfig, ServeConfig, SourceSpec};

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::ServeArgs;
use crate::log;

/// Root configuration structure representing cardcast.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CardcastConfig {
    pub serve: ServeConfig,
    pub producer: ProducerConfig,
    pub overlay: OverlaySection,
}

impl CardcastConfig {
    /// Load and validate `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(content) => {
                let (config, ignored) = Self::parse_with_ignored(&content)?;
                if !ignored.is_empty() {
                    Self::print_unknown_fields_warning(&ignored, path);
                }
                config
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                crate::debug!("config"; "{} not found, using defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(ConfigError::Io(path.to_path_buf(), err)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Check values that parse fine but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.serve
            .validate()
            .and_then(|()| self.producer.validate())
            .map_err(ConfigError::Validation)
    }

    /// Apply `serve` command flags over the file values.
    pub fn apply_serve_args(&mut self, args: &ServeArgs) {
        Self::update_option(&mut self.serve.interface, args.interface.as_ref());
        Self::update_option(&mut self.serve.port, args.port.as_ref());
        Self::update_option(&mut self.producer.profile, args.profile.as_ref());
        Self::update_option(&mut self.producer.source, args.source.as_ref());
        if args.no_video {
            self.producer.enabled = false;
        }
        if args.no_autostart {
            self.serve.autostart = false;
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }
}

/// Parse config, panicking on unknown fields to catch typos in tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> CardcastConfig {
    let (parsed, ignored) = CardcastConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
