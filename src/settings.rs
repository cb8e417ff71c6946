use image::Rgba;
use std::path::PathBuf;

use crate::components::tools::{DEFAULT_BRUSH_SIZE, ToolMode};
use crate::ops::compositor::{Compositor, DEFAULT_DASH_LENGTH, DEFAULT_MASK_COLOR, DEFAULT_OUTLINE_WIDTH};

const SETTINGS_FILE: &str = "maskfe_settings.cfg";

/// Largest accepted rectangle outline width, in raster pixels.
pub const MAX_OUTLINE_WIDTH: f32 = 64.0;
/// Largest accepted preview dash length, in raster pixels.
pub const MAX_DASH_LENGTH: f32 = 512.0;

/// User preferences, stored as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskSettings {
    /// Tool selected when the app starts
    pub default_tool: ToolMode,
    /// Brush diameter in raster pixels at startup
    pub default_brush_size: u32,
    /// Upper bound of the size slider
    pub max_brush_size: u32,
    /// Colour written into the mask for painted pixels
    pub mask_color: Rgba<u8>,
    /// Colour of the dashed rectangle preview
    pub preview_color: Rgba<u8>,
    /// Opacity of the mask overlay drawn over the source image (0.0–1.0)
    pub overlay_opacity: f32,
    /// Dash run length of the rectangle preview, in raster pixels
    pub dash_length: f32,
    /// Boundary width of painted rectangles, in raster pixels
    pub outline_width: f32,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            default_tool: ToolMode::Paint,
            default_brush_size: DEFAULT_BRUSH_SIZE,
            max_brush_size: 200,
            mask_color: DEFAULT_MASK_COLOR,
            preview_color: DEFAULT_MASK_COLOR,
            overlay_opacity: 0.5,
            dash_length: DEFAULT_DASH_LENGTH,
            outline_width: DEFAULT_OUTLINE_WIDTH,
        }
    }
}

impl MaskSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/maskfe/maskfe_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\MaskFE\maskfe_settings.cfg
    /// On macOS:   ~/Library/Application Support/MaskFE/maskfe_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        let dir = Self::config_dir()?;
        let _ = std::fs::create_dir_all(&dir);
        Some(dir.join(SETTINGS_FILE))
    }

    #[cfg(target_os = "windows")]
    fn config_dir() -> Option<PathBuf> {
        std::env::var("APPDATA")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
            .map(|d| PathBuf::from(d).join("MaskFE"))
    }

    #[cfg(target_os = "macos")]
    fn config_dir() -> Option<PathBuf> {
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("MaskFE")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
            .ok()
            .map(|d| d.join("maskfe"))
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: Rgba<u8>) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a"
    fn str_to_color(s: &str) -> Option<Rgba<u8>> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let mut c = [0u8; 4];
        for (slot, part) in c.iter_mut().zip(&parts) {
            *slot = part.trim().parse().ok()?;
        }
        Some(Rgba(c))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "default_tool={}\n\
             default_brush_size={}\n\
             max_brush_size={}\n\
             mask_color={}\n\
             preview_color={}\n\
             overlay_opacity={}\n\
             dash_length={}\n\
             outline_width={}\n",
            self.default_tool.config_key(),
            self.default_brush_size,
            self.max_brush_size,
            Self::color_to_str(self.mask_color),
            Self::color_to_str(self.preview_color),
            self.overlay_opacity,
            self.dash_length,
            self.outline_width,
        )
    }

    /// Parse settings text. Unknown keys are ignored and unparsable values
    /// keep their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "default_tool" => {
                    if let Some(mode) = ToolMode::from_config_key(val) {
                        s.default_tool = mode;
                    }
                }
                "default_brush_size" => {
                    s.default_brush_size = val.parse().unwrap_or(s.default_brush_size);
                }
                "max_brush_size" => {
                    s.max_brush_size = val.parse().unwrap_or(s.max_brush_size).max(1);
                }
                "mask_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.mask_color = c;
                    }
                }
                "preview_color" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.preview_color = c;
                    }
                }
                "overlay_opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && !v.is_nan()
                    {
                        s.overlay_opacity = v.clamp(0.0, 1.0);
                    }
                }
                "dash_length" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v > 0.0
                    {
                        s.dash_length = v.min(MAX_DASH_LENGTH);
                    }
                }
                "outline_width" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                        && v >= 0.0
                    {
                        s.outline_width = v.min(MAX_OUTLINE_WIDTH);
                    }
                }
                _ => {}
            }
        }
        s.default_brush_size = s.default_brush_size.min(s.max_brush_size);
        s
    }

    /// Load settings from disk (defaults if the file is missing).
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = std::fs::write(&path, self.to_config_string()) {
            crate::log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    pub fn compositor(&self) -> Compositor {
        Compositor {
            mask_color: self.mask_color,
            preview_color: self.preview_color,
            outline_width: self.outline_width,
            dash_length: self.dash_length,
        }
    }
}
