use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};
use thiserror::Error;

pub const ENV_RETAIN: &str = "CHATREPL_RETAIN";
pub const ENV_SCOPE_PREFIX: &str = "CHATREPL_SCOPE_PREFIX";
pub const ENV_FORCE_PAGINATOR: &str = "CHATREPL_FORCE_PAGINATOR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplConfig {
    #[serde(default)]
    pub flags: FeatureFlags,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Process-wide switches read when the feature is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureFlags {
    /// Keep one scope alive across invocations.
    #[serde(default)]
    pub retain: bool,

    /// Prefix put in front of every context shorthand binding (`_author`, `_channel`, ...).
    #[serde(default = "default_scope_prefix")]
    pub scope_prefix: String,

    /// Never deliver long text as a previewable file.
    #[serde(default)]
    pub force_paginator: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            retain: false,
            scope_prefix: default_scope_prefix(),
            force_paginator: false,
        }
    }
}

/// Size limits and fixed strings used when delivering a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Longest text (in characters) sent as a plain message.
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Text shorter than this is delivered as a previewable file instead of pages.
    #[serde(default = "default_file_preview_limit")]
    pub file_preview_limit: usize,

    /// Upper bound of one rendered page, fences included.
    #[serde(default = "default_page_max_size")]
    pub page_max_size: usize,

    #[serde(default = "default_output_file_name")]
    pub output_file_name: String,

    #[serde(default = "default_fence_prefix")]
    pub fence_prefix: String,

    #[serde(default = "default_fence_suffix")]
    pub fence_suffix: String,

    #[serde(default = "default_empty_placeholder")]
    pub empty_placeholder: String,

    #[serde(default = "default_redaction_marker")]
    pub redaction_marker: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
            file_preview_limit: default_file_preview_limit(),
            page_max_size: default_page_max_size(),
            output_file_name: default_output_file_name(),
            fence_prefix: default_fence_prefix(),
            fence_suffix: default_fence_suffix(),
            empty_placeholder: default_empty_placeholder(),
            redaction_marker: default_redaction_marker(),
        }
    }
}

impl DispatchConfig {
    /// Characters a rendered page spends on fences and the newlines around the body.
    pub fn fence_overhead(&self) -> usize {
        self.fence_prefix.chars().count() + self.fence_suffix.chars().count() + 2
    }
}

// デフォルト値の定義
fn default_scope_prefix() -> String {
    "_".to_string()
}
fn default_message_limit() -> usize {
    2000
}
fn default_file_preview_limit() -> usize {
    50_000
}
fn default_page_max_size() -> usize {
    1980
}
fn default_output_file_name() -> String {
    "output.py".to_string()
}
fn default_fence_prefix() -> String {
    "```py".to_string()
}
fn default_fence_suffix() -> String {
    "```".to_string()
}
fn default_empty_placeholder() -> String {
    "\u{200b}".to_string()
}
fn default_redaction_marker() -> String {
    "[token omitted]".to_string()
}

impl ReplConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(s: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CHATREPL_*` environment variables on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(retain) = env_flag(ENV_RETAIN) {
            self.flags.retain = retain;
        }
        if let Some(force) = env_flag(ENV_FORCE_PAGINATOR) {
            self.flags.force_paginator = force;
        }
        if let Ok(prefix) = std::env::var(ENV_SCOPE_PREFIX) {
            self.flags.scope_prefix = prefix;
        }
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let dispatch = &self.dispatch;
        if dispatch.message_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "dispatch.message_limit",
                message: "must be greater than zero".to_string(),
            });
        }
        if dispatch.page_max_size <= dispatch.fence_overhead() {
            return Err(ConfigError::Invalid {
                field: "dispatch.page_max_size",
                message: format!(
                    "{} leaves no room for content after {} characters of fences",
                    dispatch.page_max_size,
                    dispatch.fence_overhead()
                ),
            });
        }
        if dispatch.page_max_size > dispatch.message_limit {
            return Err(ConfigError::Invalid {
                field: "dispatch.page_max_size",
                message: format!(
                    "{} exceeds message_limit {}",
                    dispatch.page_max_size, dispatch.message_limit
                ),
            });
        }
        if dispatch.output_file_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "dispatch.output_file_name",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    Some(parse_flag(&value))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y" | "on"
    )
}
