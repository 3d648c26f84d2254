use certgrid::geometry::{compute_geometry, px_to_pt};
use proptest::prelude::*;

#[test]
fn cells_and_borders_fill_the_page() {
    for (cols, rows, bw) in [(3, 3, 0.3), (2, 4, 1.0), (1, 1, 0.0), (5, 2, 0.25)] {
        let g = compute_geometry(2484, 3512, 300, cols, rows, bw);
        let width = cols as f64 * g.cell_width_pts + (cols + 1) as f64 * bw;
        let height = rows as f64 * g.cell_height_pts + (rows + 1) as f64 * bw;
        assert!((width - g.page_width_pts).abs() < 1e-3, "{cols}x{rows}");
        assert!((height - g.page_height_pts).abs() < 1e-3, "{cols}x{rows}");
    }
}

#[test]
fn default_grid_matches_print_size() {
    let g = compute_geometry(2484, 3512, 300, 3, 3, 0.3);
    assert!((g.page_width_pts - px_to_pt(2484, 300)).abs() < 1e-9);
    assert!((g.page_width_pts - 596.16).abs() < 1e-9);
    assert!((g.cell_width_pts - (596.16 - 1.2) / 3.0).abs() < 1e-9);
    assert_eq!(g.items_per_page(), 9);
    assert!(!g.is_single());
}

#[test]
fn line_offsets_step_by_cell_plus_border() {
    let g = compute_geometry(2484, 3512, 300, 3, 3, 0.3);
    assert_eq!(g.vertical_line_offsets.len(), 4);
    assert_eq!(g.horizontal_line_offsets.len(), 4);
    assert_eq!(g.vertical_line_offsets[0], 0.0);
    let step = g.cell_width_pts + g.border_width;
    for (i, off) in g.vertical_line_offsets.iter().enumerate() {
        assert!((off - i as f64 * step).abs() < 1e-3);
    }
}

#[test]
#[should_panic]
fn zero_columns_panic() {
    let _ = compute_geometry(2484, 3512, 300, 0, 3, 0.3);
}

proptest! {
    #[test]
    fn border_identity_holds_for_any_grid(
        width_px in 100_u32..10_000,
        height_px in 100_u32..10_000,
        dpi in 72_u32..1200,
        cols in 1_u32..40,
        rows in 1_u32..40,
        border in 0.0_f64..10.0,
    ) {
        let g = compute_geometry(width_px, height_px, dpi, cols, rows, border);
        let width = cols as f64 * g.cell_width_pts + (cols + 1) as f64 * border;
        let height = rows as f64 * g.cell_height_pts + (rows + 1) as f64 * border;
        prop_assert!((width - g.page_width_pts).abs() < 1e-3);
        prop_assert!((height - g.page_height_pts).abs() < 1e-3);
        prop_assert_eq!(g.vertical_line_offsets.len(), cols as usize + 1);
        prop_assert_eq!(g.horizontal_line_offsets.len(), rows as usize + 1);
    }
}
