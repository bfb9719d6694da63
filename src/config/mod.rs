//! Configuration management for the bridge
//!
//! A bridge is configured by exactly four values handed to the application at
//! launch (port, token, application id and role), plus two optional settings.
//! They can be built in code or loaded from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::AREA_NORMAL_FULL;

/// Settings for one `SurfaceBridge`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Port of the window manager and home screen services
    pub port: u16,

    /// Session authentication token
    pub token: String,

    /// Application identifier
    pub app_id: String,

    /// Window role this application binds its surface to
    pub role: String,

    /// Optional display name
    #[serde(default)]
    pub name: Option<String>,

    /// Display area used whenever the bridge activates its window
    #[serde(default = "BridgeConfig::default_activation_area")]
    pub activation_area: String,
}

impl BridgeConfig {
    pub fn new(
        port: u16,
        token: impl Into<String>,
        app_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            port,
            token: token.into(),
            app_id: app_id.into(),
            role: role.into(),
            name: None,
            activation_area: Self::default_activation_area(),
        }
    }

    fn default_activation_area() -> String {
        AREA_NORMAL_FULL.to_string()
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: BridgeConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Invalid port: must be non-zero");
        }

        if self.token.trim().is_empty() {
            anyhow::bail!("Invalid token: must not be empty");
        }

        if self.app_id.trim().is_empty() {
            anyhow::bail!("Invalid app_id: must not be empty");
        }

        if self.role.trim().is_empty() {
            anyhow::bail!("Invalid role: must not be empty");
        }

        if self.activation_area.trim().is_empty() {
            anyhow::bail!("Invalid activation_area: must not be empty");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
