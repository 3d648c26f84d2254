use crate::util::ensure_dir;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub const PAGE_EXTENSION: &str = "pdf";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Single,
    Archive,
}

/// The one named file a batch delivers.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
    /// Entry names inside the archive, in page order. Empty for single files.
    pub parts: Vec<String>,
}

pub fn part_name(index: usize, root: &str) -> String {
    format!("{}-part-{root}.{PAGE_EXTENSION}", index + 1)
}

/// One rendered page is delivered as-is, several are zipped.
pub fn package(blobs: Vec<Vec<u8>>, root: &str) -> Result<Artifact> {
    package_with_progress(blobs, root, |_| {})
}

/// Like [`package`], reporting archive progress (0-100) after each entry.
pub fn package_with_progress(
    mut blobs: Vec<Vec<u8>>,
    root: &str,
    mut on_progress: impl FnMut(u8),
) -> Result<Artifact> {
    assert!(!blobs.is_empty(), "nothing to package");

    if blobs.len() == 1 {
        let bytes = blobs.pop().unwrap_or_default();
        return Ok(Artifact {
            file_name: format!("{root}.{PAGE_EXTENSION}"),
            kind: ArtifactKind::Single,
            bytes,
            parts: Vec::new(),
        });
    }

    let total = blobs.len();
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut parts = Vec::with_capacity(total);

    for (i, blob) in blobs.iter().enumerate() {
        let name = part_name(i, root);
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("zip: start entry {name}"))?;
        zip.write_all(blob)
            .with_context(|| format!("zip: write entry {name}"))?;
        parts.push(name);
        on_progress(crate::progress::percent(i + 1, total));
    }

    let bytes = zip.finish().with_context(|| "zip: finish archive")?.into_inner();

    Ok(Artifact {
        file_name: format!("{root}.zip"),
        kind: ArtifactKind::Archive,
        bytes,
        parts,
    })
}

pub fn write_artifact(artifact: &Artifact, dir: &Path) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(&artifact.file_name);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("writing artifact: {}", path.display()))?;
    Ok(path)
}
