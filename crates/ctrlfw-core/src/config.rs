//! Controller configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::update::{UpdatePolicy, Version};

/// Configuration for a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Display name images must carry.
    pub display_name: String,
    /// Running firmware version.
    pub version: Version,
    /// Per-transaction deadline in microseconds.
    pub transaction_timeout_us: u64,
    /// Reject images without an info region.
    pub require_info_page: bool,
    /// Delay between a committed flash and the restart.
    pub restart_delay_ms: u64,
    /// Delay between an accepted factory reset request and the wipe.
    pub factory_reset_delay_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            display_name: "WARP Charger".to_string(),
            version: Version::new(2, 1, 0),
            transaction_timeout_us: 100_000,
            require_info_page: true,
            restart_delay_ms: 1000,
            factory_reset_delay_ms: 3000,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ControllerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        UpdatePolicy {
            require_info_page: self.require_info_page,
            display_name: self.display_name.clone(),
            installed: self.version,
        }
    }
}
