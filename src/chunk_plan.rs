use crate::{geometry::GridGeometry, record::ReportRecord};
use serde::{Deserialize, Serialize};

/// Split `items` into consecutive pages of `size`; the last page may be short.
pub fn chunk<T>(items: &[T], size: usize) -> Vec<&[T]> {
    assert!(size >= 1, "chunk size must be at least 1");
    items.chunks(size).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagePlan {
    pub record_count: usize,
    pub items_per_page: usize,
    pub pages: Vec<PlannedPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedPage {
    pub page: usize, // 1-based
    pub report_nos: Vec<String>,
    pub empty_cells: usize,
}

impl PagePlan {
    pub fn from_records(records: &[ReportRecord], geometry: &GridGeometry) -> Self {
        let per_page = geometry.items_per_page();
        let pages = chunk(records, per_page)
            .into_iter()
            .enumerate()
            .map(|(i, page)| PlannedPage {
                page: i + 1,
                report_nos: page.iter().map(|r| r.report_no.clone()).collect(),
                empty_cells: per_page - page.len(),
            })
            .collect();

        PagePlan {
            record_count: records.len(),
            items_per_page: per_page,
            pages,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
