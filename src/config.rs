// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section falls back to defaults, field by field, so a config file only
// needs to mention what it changes. A missing file is not an error; a broken
// one is logged and ignored.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Screen position; the platform picks one when unset
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub frameless: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk-scaffold".to_string(),
            width: 800,
            height: 600,
            x: None,
            y: None,
            frameless: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Requested swapchain images, clamped to what the surface allows
    pub image_count: u32,
    pub clear_color: [f32; 4],
    pub vertex_shader: String,
    pub fragment_shader: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            image_count: 3,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: "shaders/vert.spv".to_string(),
            fragment_shader: "shaders/frag.spv".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// "standard", "extended" or "none"
    pub validation: String,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation: "standard".to_string(),
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "vk_scaffold.log".to_string(),
        }
    }
}

/// Which validation layer set to request from the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    None,
    Standard,
    Extended,
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get present mode as Vulkan enum
    pub fn get_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn get_validation(&self) -> Validation {
        match self.debug.validation.to_lowercase().as_str() {
            "none" | "off" => Validation::None,
            "standard" => Validation::Standard,
            "extended" => Validation::Extended,
            _ => {
                log::warn!(
                    "Unknown validation setting '{}', defaulting to standard",
                    self.debug.validation
                );
                Validation::Standard
            }
        }
    }

    pub fn get_log_level(&self) -> log::LevelFilter {
        self.debug.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', defaulting to info", self.debug.log_level);
            log::LevelFilter::Info
        })
    }

    pub fn get_clear_color(&self) -> vk::ClearValue {
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.graphics.clear_color,
            },
        }
    }
}
