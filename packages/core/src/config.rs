//! Catalog configuration
//!
//! Plain serde structs with `Default` values and a `validate()` pass.
//! Values can come from a JSON file ([`CatalogConfig::from_json`]) or from
//! `INKDESK_*` environment variables layered over the defaults
//! ([`CatalogConfig::from_env`]).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Capacity of the catalog event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 128;

/// How the optimistic client treats mutation responses that arrive out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Every response replaces the local view, whatever order it arrives in
    #[default]
    LastResponseWins,
    /// Responses for operations older than the newest settled one are ignored
    RejectStale,
}

impl FromStr for ReconcilePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_response_wins" | "last-response-wins" => Ok(Self::LastResponseWins),
            "reject_stale" | "reject-stale" => Ok(Self::RejectStale),
            other => Err(format!("unknown reconcile policy '{}'", other)),
        }
    }
}

/// Titles given to freshly created nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultTitles {
    pub document: String,
    pub folder: String,
}

impl Default for DefaultTitles {
    fn default() -> Self {
        Self {
            document: "Untitled".to_string(),
            folder: "New Folder".to_string(),
        }
    }
}

/// Geometry of the drag-to-indent gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DragConfig {
    /// Horizontal pixels per tree level
    pub indent_width: f64,
}

impl Default for DragConfig {
    fn default() -> Self {
        Self { indent_width: 24.0 }
    }
}

/// Top-level configuration for the catalog engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Database file location
    pub db_path: PathBuf,

    pub titles: DefaultTitles,

    pub drag: DragConfig,

    pub reconcile: ReconcilePolicy,

    /// Buffered events per subscriber before it starts lagging
    pub event_channel_capacity: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/inkdesk.db"),
            titles: DefaultTitles::default(),
            drag: DragConfig::default(),
            reconcile: ReconcilePolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl CatalogConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.db_path.as_os_str().is_empty() {
            return Err("db_path cannot be empty".to_string());
        }
        if !self.drag.indent_width.is_finite() || self.drag.indent_width <= 0.0 {
            return Err(format!(
                "indent_width must be a positive number, got {}",
                self.drag.indent_width
            ));
        }
        if self.titles.document.trim().is_empty() || self.titles.folder.trim().is_empty() {
            return Err("default titles cannot be empty".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Parse and validate a JSON config document; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid config JSON: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `INKDESK_DB_PATH`, `INKDESK_INDENT_WIDTH` and
    /// `INKDESK_RECONCILE`
    pub fn from_env() -> Result<Self, String> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(path) = lookup("INKDESK_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(width) = lookup("INKDESK_INDENT_WIDTH") {
            config.drag.indent_width = width
                .trim()
                .parse()
                .map_err(|e| format!("INKDESK_INDENT_WIDTH '{}': {}", width, e))?;
        }
        if let Some(policy) = lookup("INKDESK_RECONCILE") {
            config.reconcile = policy.parse()?;
        }
        config.validate()?;
        Ok(config)
    }
}
