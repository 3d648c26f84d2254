use serde::{Deserialize, Serialize};

/// Points per inch.
pub const PT_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub cols: u32,
    pub rows: u32,
    pub border_width: f64,
    pub page_width_pts: f64,
    pub page_height_pts: f64,
    pub cell_width_pts: f64,
    pub cell_height_pts: f64,
    pub vertical_line_offsets: Vec<f64>,
    pub horizontal_line_offsets: Vec<f64>,
}

impl GridGeometry {
    pub fn items_per_page(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    /// A 1x1 grid holds one full-page certificate.
    pub fn is_single(&self) -> bool {
        self.items_per_page() == 1
    }
}

pub fn px_to_pt(px: u32, dpi: u32) -> f64 {
    px as f64 / dpi as f64 * PT_PER_INCH
}

pub fn compute_geometry(
    image_px_width: u32,
    image_px_height: u32,
    dpi: u32,
    cols: u32,
    rows: u32,
    border_width_pts: f64,
) -> GridGeometry {
    assert!(cols >= 1 && rows >= 1, "grid needs at least one column and one row");
    assert!(dpi >= 1, "dpi must be positive");

    let page_width_pts = px_to_pt(image_px_width, dpi);
    let page_height_pts = px_to_pt(image_px_height, dpi);

    // Borders are subtracted before dividing: one before every cell plus one trailing.
    let total_border_x = (cols + 1) as f64 * border_width_pts;
    let total_border_y = (rows + 1) as f64 * border_width_pts;

    let cell_width_pts = (page_width_pts - total_border_x) / cols as f64;
    let cell_height_pts = (page_height_pts - total_border_y) / rows as f64;

    GridGeometry {
        cols,
        rows,
        border_width: border_width_pts,
        page_width_pts,
        page_height_pts,
        cell_width_pts,
        cell_height_pts,
        vertical_line_offsets: line_offsets(cols, cell_width_pts, border_width_pts),
        horizontal_line_offsets: line_offsets(rows, cell_height_pts, border_width_pts),
    }
}

fn line_offsets(count: u32, cell: f64, border: f64) -> Vec<f64> {
    (0..=count).map(|i| round3(i as f64 * (cell + border))).collect()
}

pub(crate) fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
