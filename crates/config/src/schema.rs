use std::{path::PathBuf, time::Duration};

use {
    ferry_relay::{RelayConfig, pipeline::DEFAULT_MAX_FILE_SIZE},
    ferry_telegram::TelegramConfig,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub telegram: TelegramConfig,
    pub relay: RelaySection,
}

impl FerryConfig {
    /// Copy safe to print, with the bot token masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.telegram.has_token() {
            copy.telegram.token = Secret::new("[REDACTED]".to_string());
        }
        copy
    }

    /// Token as configured, for diagnostics that need to look at it.
    pub(crate) fn token(&self) -> &str {
        self.telegram.token.expose_secret()
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySection {
    /// Largest declared size, in bytes, accepted for a relay.
    pub max_file_size: u64,

    /// Minimum spacing between progress edits, in milliseconds.
    pub status_interval_ms: u64,

    /// Directory for staged downloads. Defaults to the platform temp dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_dir: Option<PathBuf>,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            status_interval_ms: 2000,
            staging_dir: None,
        }
    }
}

impl RelaySection {
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_file_size: self.max_file_size,
            status_interval: Duration::from_millis(self.status_interval_ms),
            staging_dir: self
                .staging_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}
