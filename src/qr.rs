//! Verification QR codes for report numbers.
//!
//! Rasters are produced at print density and cached per render session under
//! their report number. A failed encode is cached as `None` so the batch does
//! not retry it.

use crate::record::ReportRecord;
use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{DynamicImage, GrayImage, ImageFormat};
use qrcode::{Color, EcLevel, QrCode};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, warn};

pub const QR_MARGIN_MODULES: u32 = 3;
pub const QR_SCALE: u32 = 8;
pub const QR_TARGET_WIDTH_PX: u32 = 1400;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

pub fn verify_url(base_url: &str, report_no: &str) -> String {
    format!(
        "{}/?r={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(report_no)
    )
}

/// 8-bit grey raster, 0 = dark, 255 = light.
#[derive(Debug, Clone, PartialEq)]
pub struct QrRaster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl QrRaster {
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let img = GrayImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| anyhow!("raster buffer does not match {}x{}", self.width, self.height))?;
        let mut out = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .with_context(|| "encoding QR PNG")?;
        Ok(out)
    }

    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!("{PNG_DATA_URL_PREFIX}{}", STANDARD.encode(self.to_png()?)))
    }

    pub fn from_data_url(url: &str) -> Result<Self> {
        let (_, payload) = url
            .split_once(";base64,")
            .filter(|(head, _)| head.starts_with("data:image/"))
            .ok_or_else(|| anyhow!("not a base64 image data URL"))?;
        let bytes = STANDARD
            .decode(payload.trim())
            .with_context(|| "decoding data URL payload")?;
        let img = image::load_from_memory(&bytes)
            .with_context(|| "decoding QR image")?
            .to_luma8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            pixels: img.into_raw(),
        })
    }
}

pub trait QrEncoder: Sync {
    fn encode(&self, text: &str) -> Result<QrRaster>;
}

#[derive(Debug, Clone)]
pub struct QrCodeEncoder {
    pub margin_modules: u32,
    pub scale: u32,
    pub target_width_px: u32,
}

impl Default for QrCodeEncoder {
    fn default() -> Self {
        Self {
            margin_modules: QR_MARGIN_MODULES,
            scale: QR_SCALE,
            target_width_px: QR_TARGET_WIDTH_PX,
        }
    }
}

impl QrCodeEncoder {
    /// Pixels per module: fill the target width when it fits, else the fixed scale.
    fn module_px(&self, modules: u32) -> u32 {
        if self.target_width_px >= modules {
            (self.target_width_px / modules).max(1)
        } else {
            self.scale.max(1)
        }
    }
}

impl QrEncoder for QrCodeEncoder {
    fn encode(&self, text: &str) -> Result<QrRaster> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::M)
            .map_err(|e| anyhow!("QR encode failed for {text}: {e:?}"))?;
        let n = code.width() as u32;
        let colors = code.to_colors();

        let modules = n + 2 * self.margin_modules;
        let px = self.module_px(modules);
        let side = modules * px;
        let mut pixels = vec![255u8; (side * side) as usize];

        for my in 0..n {
            for mx in 0..n {
                if colors[(my * n + mx) as usize] != Color::Dark {
                    continue;
                }
                let x0 = (mx + self.margin_modules) * px;
                let y0 = (my + self.margin_modules) * px;
                for y in y0..y0 + px {
                    let row = (y * side) as usize;
                    pixels[row + x0 as usize..row + (x0 + px) as usize].fill(0);
                }
            }
        }

        Ok(QrRaster {
            width: side,
            height: side,
            pixels,
        })
    }
}

/// Rasters resolved for one page, keyed by report number.
#[derive(Debug, Default, Clone)]
pub struct QrTable {
    entries: HashMap<String, Option<Arc<QrRaster>>>,
}

impl QrTable {
    pub fn get(&self, report_no: &str) -> Option<&QrRaster> {
        self.entries.get(report_no).and_then(|e| e.as_deref())
    }

    pub fn contains(&self, report_no: &str) -> bool {
        self.entries.contains_key(report_no)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cache owned by a single render session.
#[derive(Debug, Default)]
pub struct QrCache {
    entries: HashMap<String, Option<Arc<QrRaster>>>,
}

impl QrCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_create(
        &mut self,
        report_no: &str,
        base_url: &str,
        encoder: &dyn QrEncoder,
    ) -> Option<Arc<QrRaster>> {
        if report_no.trim().is_empty() {
            return None;
        }
        if let Some(hit) = self.entries.get(report_no) {
            return hit.clone();
        }
        let result = encoder.encode(&verify_url(base_url, report_no));
        self.store(report_no.to_string(), result)
    }

    /// Resolve every QR needed by one page. Uncached report numbers are
    /// encoded concurrently and all results are in before this returns.
    pub fn resolve_page(
        &mut self,
        records: &[ReportRecord],
        base_url: &str,
        encoder: &dyn QrEncoder,
    ) -> QrTable {
        let mut table = QrTable::default();
        let mut pending: Vec<&str> = Vec::new();

        for r in records.iter().filter(|r| r.has_report_no()) {
            let key = r.report_no.as_str();
            if let Some(url) = r.qr_data_url.as_deref() {
                match QrRaster::from_data_url(url) {
                    Ok(raster) => {
                        table.entries.insert(key.to_string(), Some(Arc::new(raster)));
                        continue;
                    }
                    Err(err) => warn!("report {key}: ignoring precomputed QR: {err:#}"),
                }
            }
            if table.contains(key) {
                continue;
            }
            match self.entries.get(key) {
                Some(hit) => {
                    table.entries.insert(key.to_string(), hit.clone());
                }
                None if !pending.contains(&key) => pending.push(key),
                None => {}
            }
        }

        let encoded: Vec<(String, Result<QrRaster>)> = pending
            .par_iter()
            .map(|key| (key.to_string(), encoder.encode(&verify_url(base_url, key))))
            .collect();

        for (key, result) in encoded {
            let entry = self.store(key.clone(), result);
            table.entries.insert(key, entry);
        }

        debug!(resolved = table.len(), cached = self.len(), "page QR codes ready");
        table
    }

    fn store(&mut self, key: String, result: Result<QrRaster>) -> Option<Arc<QrRaster>> {
        let entry = match result {
            Ok(raster) => Some(Arc::new(raster)),
            Err(err) => {
                warn!("QR generation failed for report {key}: {err:#}");
                None
            }
        };
        self.entries.insert(key, entry.clone());
        entry
    }
}
