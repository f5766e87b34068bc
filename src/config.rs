use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub rasterizer: RasterizerConfig,

    #[serde(default)]
    pub compare: CompareConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root for stored template artifacts and page images.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where rendered output documents are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docstamp")
        .join("templates")
}

fn default_output_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docstamp")
        .join("generated")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Overlay text size in page-pixel units.
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Overlay text color as RGB.
    #[serde(default = "default_font_color")]
    pub font_color: [u8; 3],

    /// TrueType font used for raster overlays. When unset, a list of common
    /// system font locations is probed.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

fn default_font_size() -> f32 {
    24.0
}

fn default_font_color() -> [u8; 3] {
    [0, 0, 0]
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font_color: default_font_color(),
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterizerConfig {
    /// Resolution used when turning PDF pages into page images. Annotation
    /// coordinates are expressed in this pixel space.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    #[serde(default = "default_page_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_dpi() -> u32 {
    200
}

fn default_page_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("docstamp")
        .join("pages")
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            cache_dir: default_page_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Pass threshold for reference-page similarity (0-100). Variable-page
    /// fields are held to a strictly higher bar derived from this one.
    #[serde(default = "default_reference_threshold")]
    pub reference_threshold: f64,

    /// Perceptual hash edge length; the hash carries size*size bits.
    #[serde(default = "default_hash_size")]
    pub hash_size: u32,
}

fn default_reference_threshold() -> f64 {
    70.0
}

fn default_hash_size() -> u32 {
    16
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            reference_threshold: default_reference_threshold(),
            hash_size: default_hash_size(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docstamp")
        .join("docstamp.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            storage: StorageConfig::default(),
            render: RenderConfig::default(),
            rasterizer: RasterizerConfig::default(),
            compare: CompareConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // First run: write the defaults so they are discoverable.
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docstamp")
            .join("config.toml")
    }
}
