use crate::{geometry::GridGeometry, record::ReportRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    None,
    /// Landscape certificate turned into a portrait cell.
    Deg270,
}

/// Paint passes for one cell, in paint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layer {
    Full,
    /// Header and fields again, no QR and no images.
    HeaderOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellContent {
    pub record_index: usize,
    pub report_no: String,
    pub rotation: Rotation,
    pub layers: Vec<Layer>,
}

/// Coordinates are in points from the top-left corner of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub index: usize,
    pub row: u32,
    pub col: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub content: Option<CellContent>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_width: f64,
    pub page_height: f64,
    pub border_width: f64,
    pub cells: Vec<Cell>,
    pub vertical_lines: Vec<f64>,
    pub horizontal_lines: Vec<f64>,
}

impl PageLayout {
    pub fn occupied(&self) -> impl Iterator<Item = (&Cell, &CellContent)> {
        self.cells
            .iter()
            .filter_map(|c| c.content.as_ref().map(|content| (c, content)))
    }

    pub fn empty_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_empty()).count()
    }
}

pub fn compose_page(
    records: &[ReportRecord],
    geometry: &GridGeometry,
    overprint_header: bool,
) -> PageLayout {
    let capacity = geometry.items_per_page();
    assert!(
        records.len() <= capacity,
        "{} records do not fit a {}x{} page",
        records.len(),
        geometry.cols,
        geometry.rows
    );

    let rotation = if geometry.is_single() {
        Rotation::None
    } else {
        Rotation::Deg270
    };
    let layers = if overprint_header {
        vec![Layer::Full, Layer::HeaderOnly]
    } else {
        vec![Layer::Full]
    };

    let bw = geometry.border_width;
    let cells = (0..capacity)
        .map(|index| {
            let row = index as u32 / geometry.cols;
            let col = index as u32 % geometry.cols;
            let content = records.get(index).map(|r| CellContent {
                record_index: index,
                report_no: r.report_no.clone(),
                rotation,
                layers: layers.clone(),
            });
            Cell {
                index,
                row,
                col,
                x: col as f64 * (geometry.cell_width_pts + bw) + bw,
                y: row as f64 * (geometry.cell_height_pts + bw) + bw,
                width: geometry.cell_width_pts,
                height: geometry.cell_height_pts,
                content,
            }
        })
        .collect();

    PageLayout {
        page_width: geometry.page_width_pts,
        page_height: geometry.page_height_pts,
        border_width: bw,
        cells,
        vertical_lines: geometry.vertical_line_offsets.clone(),
        horizontal_lines: geometry.horizontal_line_offsets.clone(),
    }
}
