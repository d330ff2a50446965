//! Configuration management for Monocle
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines settings for input devices, the cursor,
//! and general compositor behavior.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;


/// Main configuration struct containing all Monocle settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MonocleConfig {
    /// Input handling (keyboard layout, key repeat)
    #[serde(default)]
    pub input: InputConfig,

    /// Cursor theme settings
    #[serde(default)]
    pub cursor: CursorConfig,

    /// General compositor settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Keyboard and key-repeat configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Key repeat rate in characters per second
    pub repeat_rate: i32,

    /// Delay before key repeat starts (milliseconds)
    pub repeat_delay: i32,

    /// XKB rules name (empty string selects the system default)
    pub xkb_rules: String,

    /// XKB keyboard model
    pub xkb_model: String,

    /// XKB layout, e.g. "us" or "de"
    pub xkb_layout: String,

    /// XKB layout variant
    pub xkb_variant: String,

    /// XKB options string, e.g. "ctrl:nocaps"
    pub xkb_options: Option<String>,
}

/// Cursor theme configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CursorConfig {
    /// Cursor size in pixels, exported as XCURSOR_SIZE for clients
    pub size: u32,

    /// Named cursor shape shown over empty areas of the layout
    pub default_shape: String,
}

/// General compositor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Background fill color behind all clients, as "#RRGGBB"
    pub background_color: String,

    /// Command spawned once the compositor is ready, e.g. a terminal
    pub startup_command: Option<String>,

    /// Name advertised for the logical seat
    pub seat_name: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            repeat_rate: 25,
            repeat_delay: 400,
            xkb_rules: String::new(),
            xkb_model: String::new(),
            xkb_layout: String::new(),
            xkb_variant: String::new(),
            xkb_options: None,
        }
    }
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            size: 24,
            default_shape: "default".to_string(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            background_color: "#121212".to_string(),
            startup_command: None,
            seat_name: "seat_0".to_string(),
        }
    }
}

impl MonocleConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Path::new(&home).join(path.strip_prefix("~").unwrap_or(path))
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: MonocleConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.input.repeat_rate < 0 {
            anyhow::bail!("Invalid repeat_rate: must be zero (disabled) or positive");
        }

        if self.input.repeat_delay < 0 {
            anyhow::bail!("Invalid repeat_delay: must be zero or positive milliseconds");
        }

        if self.cursor.size == 0 {
            anyhow::bail!("Invalid cursor size: must be at least 1 pixel");
        }

        // Fail early on a bad color rather than at scene setup
        self.background_color()?;

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Parse the configured background color into premultiplied RGBA
    pub fn background_color(&self) -> Result<[f32; 4]> {
        let hex = self.general.background_color.trim();
        let hex = hex
            .strip_prefix('#')
            .with_context(|| format!("Invalid background_color '{}': expected '#RRGGBB'", hex))?;

        if hex.len() != 6 {
            anyhow::bail!(
                "Invalid background_color '#{}': expected 6 hex digits",
                hex
            );
        }

        let channel = |range: std::ops::Range<usize>| -> Result<f32> {
            let value = u8::from_str_radix(&hex[range], 16)
                .with_context(|| format!("Invalid background_color '#{}'", hex))?;
            Ok(f32::from(value) / 255.0)
        };

        Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?, 1.0])
    }
}
