//! Configuration system for the Area compositing manager
//!
//! Loads configuration from TOML file at `~/.config/area-compositor/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::compositor::CompositorSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub compositor: CompositorConfig,
    pub animation: AnimationConfig,
    pub decorations: DecorationConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .context("Failed to read config file")?;
        let config = Self::parse(&content)?;

        info!("Configuration loaded from {:?}", config_path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area-compositor");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Compositor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Composite at startup (overridden by --compositing / --no-compositing)
    pub enabled: bool,
    /// Minimum time between throttled composite passes
    pub throttle_interval_ms: u64,
    /// Rectangles kept per window before falling back to whole-window damage
    pub damage_region_budget: usize,
    /// Painted behind all windows (hex: 0xRRGGBB)
    pub background_color: u32,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            throttle_interval_ms: 16,
            damage_region_budget: 16,
            background_color: 0x2e3440, // Polar Night Darkest
        }
    }
}

/// Window animation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub minimize_duration_ms: u64,
    pub restore_duration_ms: u64,
    /// Fade opacity while animating
    pub fade: bool,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            minimize_duration_ms: 200,
            restore_duration_ms: 200,
            fade: true,
        }
    }
}

/// Titlebar decoration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecorationConfig {
    /// Decoration renderer: "flat"
    pub renderer: String,
    /// Titlebar color (hex: 0xRRGGBB)
    pub titlebar_color: u32,
    /// Focused titlebar color (hex: 0xRRGGBB)
    pub titlebar_focused_color: u32,
}

impl Default for DecorationConfig {
    fn default() -> Self {
        Self {
            renderer: "flat".to_string(),
            titlebar_color: 0x3b4252,         // Polar Night Lighter
            titlebar_focused_color: 0x5e81ac, // Frost Blue
        }
    }
}

impl From<&Config> for CompositorSettings {
    fn from(config: &Config) -> Self {
        Self {
            throttle_interval: Duration::from_millis(config.compositor.throttle_interval_ms),
            damage_region_budget: config.compositor.damage_region_budget.max(1),
            minimize_duration: Duration::from_millis(config.animation.minimize_duration_ms),
            restore_duration: Duration::from_millis(config.animation.restore_duration_ms),
            fade: config.animation.fade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::parse(&text).unwrap();
        assert!(!config.compositor.enabled);
        assert_eq!(config.compositor.throttle_interval_ms, 16);
        assert_eq!(config.decorations.renderer, "flat");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            "[compositor]\nenabled = true\n\n[animation]\nfade = false\n",
        )
        .unwrap();
        assert!(config.compositor.enabled);
        assert_eq!(config.compositor.damage_region_budget, 16);
        assert!(!config.animation.fade);
        assert_eq!(config.animation.minimize_duration_ms, 200);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        assert!(Config::parse("[compositor]\nenabled = \"maybe\"\n").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.compositor.throttle_interval_ms = 33;
        config.compositor.damage_region_budget = 0;
        config.animation.restore_duration_ms = 150;

        let settings = CompositorSettings::from(&config);
        assert_eq!(settings.throttle_interval, Duration::from_millis(33));
        assert_eq!(settings.damage_region_budget, 1);
        assert_eq!(settings.restore_duration, Duration::from_millis(150));
        assert!(settings.fade);
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = std::env::temp_dir().join(format!("area-compositor-test-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_dir_all(&dir);

        let config = Config::load_from(&path).unwrap();
        assert!(!config.compositor.enabled);
        assert!(path.exists());

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.animation.minimize_duration_ms, 200);
        let _ = fs::remove_dir_all(&dir);
    }
}
