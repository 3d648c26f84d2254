use crate::geometry::{GridGeometry, compute_geometry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub layout: Layout,
    #[serde(default)]
    pub single: Single,
    #[serde(default)]
    pub qr: Qr,
    #[serde(default)]
    pub assets: Assets,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Geometry of the batch grid, or of the single full-page card.
    pub fn geometry(&self, single: bool) -> GridGeometry {
        if single {
            compute_geometry(
                self.single.page_px_width,
                self.single.page_px_height,
                self.single.dpi,
                1,
                1,
                0.0,
            )
        } else {
            compute_geometry(
                self.layout.page_px_width,
                self.layout.page_px_height,
                self.layout.dpi,
                self.layout.cols,
                self.layout.rows,
                self.layout.border_width_pt,
            )
        }
    }

    pub fn overprint_header(&self, single: bool) -> bool {
        if single {
            self.single.overprint_header
        } else {
            self.layout.overprint_header
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub cols: u32,
    pub rows: u32,
    pub page_px_width: u32,
    pub page_px_height: u32,
    pub dpi: u32,
    pub border_width_pt: f64,
    pub overprint_header: bool,
}
impl Default for Layout {
    fn default() -> Self {
        Self {
            cols: 3,
            rows: 3,
            page_px_width: 2484,
            page_px_height: 3512,
            dpi: 300,
            border_width_pt: 0.3,
            overprint_header: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Single {
    pub page_px_width: u32,
    pub page_px_height: u32,
    pub dpi: u32,
    pub overprint_header: bool,
}
impl Default for Single {
    fn default() -> Self {
        Self {
            page_px_width: 1004,
            page_px_height: 591,
            dpi: 300,
            overprint_header: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Qr {
    pub base_url: String,
    pub margin_modules: u32,
    pub scale: u32,
    pub target_width_px: u32,
}
impl Default for Qr {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            margin_modules: crate::qr::QR_MARGIN_MODULES,
            scale: crate::qr::QR_SCALE,
            target_width_px: crate::qr::QR_TARGET_WIDTH_PX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Assets {
    pub base_url: String,
    pub local_dir: String,
}
impl Default for Assets {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            local_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub out_dir: String,
    pub utc_offset: String,
    pub write_manifest: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            utc_offset: "+05:30".into(),
            write_manifest: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: false,
        }
    }
}
