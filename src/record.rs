use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One gemological report as supplied by the report data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRecord {
    pub report_no: String,
    pub description: String,
    pub shape_and_cut: String,
    pub tot_est_weight: String,
    pub color: String,
    pub clarity: String,
    pub style_number: String,
    pub comment: Option<String>,
    pub image_filename: Option<String>,
    pub company_logo: Option<String>,
    /// Electronic copy.
    pub isecopy: Option<bool>,
    pub notice_image: Option<bool>,
    pub igi_logo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_data_url: Option<String>,
}

impl ReportRecord {
    pub fn has_report_no(&self) -> bool {
        !self.report_no.trim().is_empty()
    }

    pub fn is_ecopy(&self) -> bool {
        self.isecopy.unwrap_or(false)
    }

    pub fn shows_notice_image(&self) -> bool {
        self.notice_image.unwrap_or(false)
    }

    pub fn shows_institute_logo(&self) -> bool {
        self.igi_logo.unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    Bare(Vec<ReportRecord>),
    Paged { items: Vec<ReportRecord> },
}

pub fn parse_records(raw: &str) -> Result<Vec<ReportRecord>> {
    let parsed: RecordsFile =
        serde_json::from_str(raw).with_context(|| "parsing report records JSON")?;
    Ok(match parsed {
        RecordsFile::Bare(items) | RecordsFile::Paged { items } => items,
    })
}

pub fn load_records(path: &Path) -> Result<Vec<ReportRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading records: {}", path.display()))?;
    parse_records(&raw).with_context(|| format!("in {}", path.display()))
}

/// Report numbers that occur more than once, in first-seen order.
pub fn duplicate_report_numbers(records: &[ReportRecord]) -> Vec<String> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    let mut order = Vec::new();
    for r in records.iter().filter(|r| r.has_report_no()) {
        let n = counts.entry(r.report_no.as_str()).or_insert(0);
        *n += 1;
        if *n == 2 {
            order.push(r.report_no.clone());
        }
    }
    order
}
