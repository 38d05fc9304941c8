//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::core::mapping::{FieldDef, FieldSchema};
use crate::core::Workspace;

/// Importer configuration with layered hierarchy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rows handed to the record sink per chunk
    pub chunk_rows: Option<usize>,

    /// Wall-clock budget per chunk, in seconds
    pub chunk_seconds: Option<u64>,

    /// Minutes of inactivity before a session expires
    pub session_ttl_minutes: Option<u64>,

    /// Error log lines included in previews
    pub error_preview_lines: Option<usize>,

    /// Largest accepted upload, in megabytes
    pub max_upload_mb: Option<u64>,

    /// Trim whitespace from mapped values before they reach the sink
    pub trim_values: Option<bool>,

    /// Import type used when none is given on the command line
    pub default_type: Option<String>,

    /// Import types keyed by name
    pub types: BTreeMap<String, ImportTypeConfig>,
}

/// Field layout for one import type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportTypeConfig {
    pub title: Option<String>,
    pub columns: Vec<FieldDef>,
    pub meta_fields: Vec<FieldDef>,
}

impl Config {
    pub const DEFAULT_CHUNK_ROWS: usize = 100;
    pub const DEFAULT_CHUNK_SECONDS: u64 = 20;
    pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 30;
    pub const DEFAULT_ERROR_PREVIEW_LINES: usize = 50;
    pub const DEFAULT_MAX_UPLOAD_MB: u64 = 64;

    /// Load configuration from all sources, merging in priority order
    pub fn load(workspace: &Workspace) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (accessor fallbacks)

        // 2. Global user config (~/.config/csvimp/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Workspace config (.csvimp/config.yaml)
        if let Some(local) = Self::read_file(&workspace.config_path()) {
            config.merge(local);
        }

        // 4. Environment variables
        config.apply_env();

        config
    }

    /// Parse a config file, warning (not failing) when it cannot be used
    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config file");
                return None;
            }
        };
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
                None
            }
        }
    }

    fn apply_env(&mut self) {
        if let Some(rows) = env_number("CSVIMP_CHUNK_ROWS") {
            self.chunk_rows = Some(rows as usize);
        }
        if let Some(secs) = env_number("CSVIMP_CHUNK_SECONDS") {
            self.chunk_seconds = Some(secs);
        }
        if let Some(ttl) = env_number("CSVIMP_SESSION_TTL_MINUTES") {
            self.session_ttl_minutes = Some(ttl);
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "csvimp")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.chunk_rows.is_some() {
            self.chunk_rows = other.chunk_rows;
        }
        if other.chunk_seconds.is_some() {
            self.chunk_seconds = other.chunk_seconds;
        }
        if other.session_ttl_minutes.is_some() {
            self.session_ttl_minutes = other.session_ttl_minutes;
        }
        if other.error_preview_lines.is_some() {
            self.error_preview_lines = other.error_preview_lines;
        }
        if other.max_upload_mb.is_some() {
            self.max_upload_mb = other.max_upload_mb;
        }
        if other.trim_values.is_some() {
            self.trim_values = other.trim_values;
        }
        if other.default_type.is_some() {
            self.default_type = other.default_type;
        }
        // Types are merged per name so a workspace can add to global types
        self.types.extend(other.types);
    }

    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows.unwrap_or(Self::DEFAULT_CHUNK_ROWS).max(1)
    }

    pub fn chunk_budget(&self) -> Duration {
        Duration::from_secs(self.chunk_seconds.unwrap_or(Self::DEFAULT_CHUNK_SECONDS).max(1))
    }

    pub fn session_ttl(&self) -> Duration {
        let minutes = self
            .session_ttl_minutes
            .unwrap_or(Self::DEFAULT_SESSION_TTL_MINUTES)
            .max(1);
        Duration::from_secs(minutes * 60)
    }

    pub fn error_preview_lines(&self) -> usize {
        self.error_preview_lines
            .unwrap_or(Self::DEFAULT_ERROR_PREVIEW_LINES)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.unwrap_or(Self::DEFAULT_MAX_UPLOAD_MB) * 1024 * 1024
    }

    pub fn trim_values(&self) -> bool {
        self.trim_values.unwrap_or(false)
    }

    /// Resolve the import type to use, falling back to `default_type`
    /// and then to the only configured type
    pub fn resolve_type(&self, requested: Option<&str>) -> Option<String> {
        if let Some(name) = requested {
            return Some(name.to_string());
        }
        if let Some(ref name) = self.default_type {
            return Some(name.clone());
        }
        if self.types.len() == 1 {
            return self.types.keys().next().cloned();
        }
        None
    }

    /// Build the field schema for an import type
    pub fn schema(&self, import_type: &str) -> Option<FieldSchema> {
        let type_config = self.types.get(import_type)?;
        if type_config.columns.is_empty() {
            return None;
        }
        Some(FieldSchema::new(
            type_config
                .title
                .clone()
                .unwrap_or_else(|| "Data Import".to_string()),
            type_config.columns.clone(),
            type_config.meta_fields.clone(),
        ))
    }
}

fn env_number(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(variable = name, value = %value, "ignoring non-numeric environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config = Config::default();
        assert_eq!(config.chunk_rows(), 100);
        assert_eq!(config.chunk_budget(), Duration::from_secs(20));
        assert_eq!(config.session_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(config.error_preview_lines(), 50);
        assert_eq!(config.max_upload_bytes(), 64 * 1024 * 1024);
        assert!(!config.trim_values());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = parse("chunk_rows: 10\nchunk_seconds: 5\n");
        base.merge(parse("chunk_rows: 25\n"));
        assert_eq!(base.chunk_rows(), 25);
        assert_eq!(base.chunk_budget(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_chunk_rows_is_clamped() {
        let config = parse("chunk_rows: 0\n");
        assert_eq!(config.chunk_rows(), 1);
    }

    #[test]
    fn test_schema_from_types() {
        let config = parse(
            r#"
types:
  member:
    title: Members
    columns:
      - { key: email, label: E-mail }
      - { key: name, label: Name }
    meta_fields:
      - { key: memo, label: Memo }
"#,
        );
        let schema = config.schema("member").unwrap();
        assert_eq!(schema.title(), "Members");
        assert_eq!(schema.primary().key, "email");
        assert_eq!(schema.fields().count(), 3);
        assert!(config.schema("unknown").is_none());
    }

    #[test]
    fn test_schema_requires_columns() {
        let config = parse("types:\n  empty:\n    title: Nothing\n");
        assert!(config.schema("empty").is_none());
    }

    #[test]
    fn test_resolve_type_fallbacks() {
        let config = parse("types:\n  only:\n    columns:\n      - { key: a, label: A }\n");
        assert_eq!(config.resolve_type(None).as_deref(), Some("only"));
        assert_eq!(config.resolve_type(Some("x")).as_deref(), Some("x"));

        let config = parse("default_type: b\n");
        assert_eq!(config.resolve_type(None).as_deref(), Some("b"));
    }
}
