use std::path::PathBuf;
use tracing::debug;

pub fn asset_url(base_url: &str, filename: &str) -> String {
    format!("{}/uploads/{}", base_url.trim_end_matches('/'), filename)
}

pub fn logo_url(base_url: &str, filename: &str) -> String {
    format!("{}/uploads/logo/{}", base_url.trim_end_matches('/'), filename)
}

pub const INSTITUTE_LOGO: &str = "logo.jpg";
pub const NOTICE_BACKGROUND: &str = "notice_bg.png";

/// Source of report images, company logos and the portal's own branding.
/// Anything a store cannot supply is left out of the rendered card.
pub trait AssetStore {
    fn image(&self, _filename: &str) -> Option<Vec<u8>> {
        None
    }

    fn logo(&self, _filename: &str) -> Option<Vec<u8>> {
        None
    }

    fn branding(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

pub struct NoAssets;

impl AssetStore for NoAssets {}

/// Local mirror of the upload directory: `<dir>/<file>`, `<dir>/logo/<file>`
/// and branding under `<dir>/img/<file>`.
pub struct LocalAssetStore {
    dir: PathBuf,
    base_url: String,
}

impl LocalAssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            base_url: String::new(),
        }
    }

    /// Served location of the same files, used in log lines.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    fn read(&self, path: PathBuf, url: String) -> Option<Vec<u8>> {
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!("asset {url} unavailable at {}: {err}", path.display());
                None
            }
        }
    }
}

impl AssetStore for LocalAssetStore {
    fn image(&self, filename: &str) -> Option<Vec<u8>> {
        if !is_plain_filename(filename) {
            return None;
        }
        self.read(self.dir.join(filename), asset_url(&self.base_url, filename))
    }

    fn logo(&self, filename: &str) -> Option<Vec<u8>> {
        if !is_plain_filename(filename) {
            return None;
        }
        self.read(
            self.dir.join("logo").join(filename),
            logo_url(&self.base_url, filename),
        )
    }

    fn branding(&self, name: &str) -> Option<Vec<u8>> {
        if !is_plain_filename(name) {
            return None;
        }
        self.read(self.dir.join("img").join(name), format!("img/{name}"))
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}
