//! Review settings loaded from TOML configuration files.
//!
//! Settings cover the two bucket directory names, the activity log file name,
//! and which files inside the buckets count as reviewable images:
//! - Image extension whitelist (case-insensitive)
//! - Hidden file handling
//! - Exact filename exclusion
//! - Glob pattern exclusion (matched against `bucket/file_name`)
//! - Regex exclusion (matched against the file name)
//!
//! # Configuration File Format
//!
//! ```toml
//! log_file = "image_review_log.json"
//!
//! [buckets]
//! positive = "center"
//! negative = "not_center"
//!
//! [filters]
//! extensions = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["*/draft_*"]
//! regex = []
//! ```

use crate::label::Buckets;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image extensions recognized when no configuration overrides them.
pub const DEFAULT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// File name of the activity log inside the root folder.
pub const DEFAULT_LOG_FILE: &str = "image_review_log.json";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("Invalid bucket configuration: {0}")]
    InvalidBuckets(String),
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Review configuration as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Activity log file name, relative to the root folder.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub buckets: Buckets,

    #[serde(default)]
    pub filters: FilterRules,
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

/// Which files inside a bucket are treated as images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Recognized image extensions, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            enable_hidden_files: false,
            exclude: ExcludeRules::default(),
        }
    }
}

/// Rules for skipping files that would otherwise be recognized as images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to skip.
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against `bucket/file_name`.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            buckets: Buckets::default(),
            filters: FilterRules::default(),
        }
    }
}

impl ReviewConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.binsortrc.toml` in the current directory
    /// 3. Look for `~/.config/binsort/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any discovered file is not valid TOML.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".binsortrc.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("binsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// Validate and compile the configuration into [`Settings`].
    ///
    /// # Errors
    ///
    /// Returns an error if bucket names are unusable, the log file name is not a
    /// plain file name, or any glob or regex pattern is invalid.
    pub fn compile(self) -> Result<Settings, ConfigError> {
        self.buckets
            .validate()
            .map_err(ConfigError::InvalidBuckets)?;

        if self.log_file.is_empty() || self.log_file.contains(['/', '\\']) {
            return Err(ConfigError::ConfigInvalid(format!(
                "log_file '{}' must be a plain file name",
                self.log_file
            )));
        }

        Ok(Settings {
            buckets: self.buckets,
            log_file: self.log_file,
            filters: CompiledFilters::new(self.filters)?,
        })
    }
}

/// Validated settings ready for use by the catalog and the activity log.
#[derive(Debug, Clone)]
pub struct Settings {
    pub buckets: Buckets,
    pub log_file: String,
    pub filters: CompiledFilters,
}

impl Settings {
    /// Path of the activity log file under `root`.
    pub fn log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.log_file)
    }
}

impl Default for Settings {
    fn default() -> Self {
        let config = ReviewConfig::default();
        Self {
            buckets: config.buckets,
            log_file: config.log_file,
            filters: CompiledFilters::from_extensions(&config.filters.extensions),
        }
    }
}

/// Compiled filter structures for matching bucket entries.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    extensions: HashSet<String>,
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
}

impl CompiledFilters {
    fn new(rules: FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = rules
            .exclude
            .patterns
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut compiled = Self::from_extensions(&rules.extensions);
        compiled.enable_hidden_files = rules.enable_hidden_files;
        compiled.exclude_filenames = rules.exclude.filenames.into_iter().collect();
        compiled.exclude_patterns = exclude_patterns;
        compiled.exclude_regexes = exclude_regexes;
        Ok(compiled)
    }

    fn from_extensions(extensions: &[String]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            enable_hidden_files: false,
            exclude_filenames: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
        }
    }

    /// Returns true if the extension (without dot) is a recognized image type.
    pub fn is_image_extension(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_lowercase())
    }

    /// Check if a bucket entry should become a catalog item.
    ///
    /// `relative_path` is the entry's path relative to the root folder,
    /// i.e. `bucket/file_name`.
    ///
    /// Checks are performed in this order, with early termination:
    /// 1. Extension must be a recognized image extension
    /// 2. Hidden file filter
    /// 3. Exact filename match
    /// 4. Glob pattern match
    /// 5. Regex pattern match
    pub fn should_include(&self, relative_path: &Path) -> bool {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        match relative_path.extension() {
            Some(ext) if self.is_image_extension(&ext.to_string_lossy()) => {}
            _ => return false,
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
