use crate::{
    chunk_plan::PagePlan,
    geometry::GridGeometry,
    package::{Artifact, ArtifactKind},
    util::sha256_hex,
};
use serde::{Deserialize, Serialize};

/// Manifest written next to a delivered artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub sha256: String,
    pub bytes: u64,
    pub parts: Vec<String>,
    pub plan: PagePlan,
    pub geometry: GridGeometry,
    pub started: String,
    pub finished: String,
}

impl BatchReport {
    pub fn new(
        artifact: &Artifact,
        plan: PagePlan,
        geometry: GridGeometry,
        started: String,
        finished: String,
    ) -> Self {
        Self {
            file_name: artifact.file_name.clone(),
            kind: artifact.kind,
            sha256: sha256_hex(&artifact.bytes),
            bytes: artifact.bytes.len() as u64,
            parts: artifact.parts.clone(),
            plan,
            geometry,
            started,
            finished,
        }
    }
}
