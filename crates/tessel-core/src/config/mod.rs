// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Engine configuration, loaded from a TOML file.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, see [`EngineConfig::load_or_default`]) yields a working setup:
//!
//! ```toml
//! frames_in_flight = 2
//!
//! [arena]
//! instance_count = 4096
//! staging_instance_count = 1024
//!
//! [submission]
//! pipeline_depth = 2
//! fence_timeout_ms = 2000
//!
//! [scheduler]
//! max_async_nodes_per_frame = 64
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Sizes of the instance arena.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
    /// Instances one frame slot can hold. Each frame in flight keeps its own
    /// copy of every resident node, so the instance buffer holds
    /// `instance_count * frames_in_flight` instances.
    pub instance_count: u32,
    /// Capacity of one staging slot, in instances. May exceed `instance_count`.
    pub staging_instance_count: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            instance_count: 4096,
            staging_instance_count: 1024,
        }
    }
}

/// Tuning of the background submission queue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmissionConfig {
    /// How many deferred submissions may be outstanding on the GPU at once.
    pub pipeline_depth: u32,
    /// Fence watchdog in milliseconds. `None` waits forever.
    pub fence_timeout_ms: Option<u64>,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            pipeline_depth: 2,
            fence_timeout_ms: Some(2000),
        }
    }
}

/// Tuning of the frame scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Upper bound on async adds, and separately on async removes, applied per frame.
    pub max_async_nodes_per_frame: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_async_nodes_per_frame: 64,
        }
    }
}

/// Top-level configuration of the renderer core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of frames the CPU may record ahead of the GPU.
    pub frames_in_flight: u32,
    /// Instance arena sizes.
    pub arena: ArenaConfig,
    /// Submission queue tuning.
    pub submission: SubmissionConfig,
    /// Frame scheduler tuning.
    pub scheduler: SchedulerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            arena: ArenaConfig::default(),
            submission: SubmissionConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(source).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        log::info!("Loaded engine configuration from '{}'", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to the defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::info!(
                "No configuration at '{}'. Using default configuration.",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Size of the instance buffer shared by all frame slots, or `None` on overflow.
    pub fn instance_capacity(&self) -> Option<u32> {
        self.arena.instance_count.checked_mul(self.frames_in_flight)
    }

    /// Checks the invariants the renderer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.arena.instance_count == 0 {
            return Err(ConfigError::Invalid(
                "arena.instance_count must be non-zero".to_string(),
            ));
        }
        if self.instance_capacity().is_none() {
            return Err(ConfigError::Invalid(format!(
                "arena.instance_count ({}) times frames_in_flight ({}) overflows u32",
                self.arena.instance_count, self.frames_in_flight
            )));
        }
        if self.arena.staging_instance_count == 0 {
            return Err(ConfigError::Invalid(
                "arena.staging_instance_count must be non-zero".to_string(),
            ));
        }
        if self.submission.pipeline_depth == 0 {
            return Err(ConfigError::Invalid(
                "submission.pipeline_depth must be at least 1".to_string(),
            ));
        }
        if self.submission.fence_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "submission.fence_timeout_ms must be non-zero; omit it to wait forever".to_string(),
            ));
        }
        Ok(())
    }
}

/// An error raised while loading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The TOML is malformed or has unknown keys.
    Parse(toml::de::Error),
    /// A value violates a constraint.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read configuration '{}': {source}", path.display())
            }
            ConfigError::Parse(err) => write!(f, "Failed to parse configuration: {err}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            frames_in_flight = 3

            [arena]
            instance_count = 16

            [submission]
            fence_timeout_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.arena.instance_count, 16);
        assert_eq!(config.arena.staging_instance_count, 1024);
        assert_eq!(config.submission.pipeline_depth, 2);
        assert_eq!(config.submission.fence_timeout_ms, Some(50));
        assert_eq!(config.scheduler.max_async_nodes_per_frame, 64);
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = EngineConfig::from_toml_str("frames_in_flight = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn instance_capacity_covers_every_frame_slot() {
        let config = EngineConfig::from_toml_str("frames_in_flight = 3\n[arena]\ninstance_count = 16")
            .unwrap();
        assert_eq!(config.instance_capacity(), Some(48));

        let err = EngineConfig::from_toml_str("frames_in_flight = 2\n[arena]\ninstance_count = 4294967295")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("overflows")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("[arena]\nsize = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = EngineConfig::load_or_default("does/not/exist/tessel.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(matches!(
            EngineConfig::load("does/not/exist/tessel.toml"),
            Err(ConfigError::Io { .. })
        ));
    }
}
