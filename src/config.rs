use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub prompts: SessionPrompts,
    pub reader: ReaderConfig,
}

impl ForwarderConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid forwarder config JSON")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("failed to load {}", path.display()))
    }
}

/// Text shown by the host while it waits for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPrompts {
    pub read: String,
    pub write: String,
}

impl Default for SessionPrompts {
    fn default() -> Self {
        SessionPrompts {
            read: "Hold your iPhone near the item to learn more about it.".to_string(),
            write: "Hold your iPhone near the item to write to it.".to_string(),
        }
    }
}

/// Settings for the PC/SC session host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Only use readers whose name contains this text.
    pub reader_name: Option<String>,
    pub poll_interval_ms: u64,
    /// The host ends the session with a timeout after this long.
    pub session_timeout_ms: u64,
}

impl ReaderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn accepts(&self, reader: &str) -> bool {
        match &self.reader_name {
            Some(filter) => reader.contains(filter.as_str()),
            None => true,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            reader_name: None,
            poll_interval_ms: 250,
            session_timeout_ms: 60_000,
        }
    }
}
