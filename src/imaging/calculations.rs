//! Pure calculation functions for image dimensions and placement.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{Orientation, Position, StitchScale};

/// Largest edge, in pixels, of any image the toolbox will allocate.
pub const MAX_EDGE: u32 = 16_384;

/// Whether a `size` image would exceed [`MAX_EDGE`] on either side.
pub fn exceeds_max_edge(size: (u32, u32)) -> bool {
    size.0 > MAX_EDGE || size.1 > MAX_EDGE
}

/// Scale `source` so its longer edge is at most `max_edge`.
///
/// Never upscales; an image already within bounds keeps its size.
///
/// ```
/// # use image_toolbox::imaging::calculations::fit_within_edge;
/// assert_eq!(fit_within_edge((4000, 3000), 1000), (1000, 750));
/// assert_eq!(fit_within_edge((800, 600), 1000), (800, 600));
/// ```
pub fn fit_within_edge(source: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (w, h) = source;
    let longer = w.max(h);
    if longer <= max_edge || longer == 0 {
        return source;
    }
    let ratio = max_edge as f64 / longer as f64;
    (
        ((w as f64 * ratio).round() as u32).max(1),
        ((h as f64 * ratio).round() as u32).max(1),
    )
}

/// Largest size with `source`'s aspect ratio that fits inside `bounds`.
pub fn fit_dimensions(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if src_w == 0 || src_h == 0 {
        return bounds;
    }
    let ratio = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    (
        ((src_w as f64 * ratio).round() as u32).max(1),
        ((src_h as f64 * ratio).round() as u32).max(1),
    )
}

/// Size of a watermark whose width is `scale` × the base's shorter edge.
///
/// The mark keeps its own aspect ratio and is never larger than the base.
pub fn watermark_size(base: (u32, u32), mark: (u32, u32), scale: f32) -> (u32, u32) {
    let short_edge = base.0.min(base.1) as f64;
    let target_w = (short_edge * scale.clamp(0.01, 1.0) as f64).round().max(1.0);
    if mark.0 == 0 || mark.1 == 0 {
        return (target_w as u32, target_w as u32);
    }
    let sized = (
        target_w as u32,
        (target_w * mark.1 as f64 / mark.0 as f64).round().max(1.0) as u32,
    );
    if sized.0 <= base.0 && sized.1 <= base.1 {
        sized
    } else {
        fit_dimensions(sized, base)
    }
}

/// Top-left corner for placing `mark` on `base` at `position`.
///
/// `offset` is a margin pulled in from the anchored edges; centered axes
/// ignore it.
pub fn anchor_origin(
    base: (u32, u32),
    mark: (u32, u32),
    position: Position,
    offset: (u32, u32),
) -> (i64, i64) {
    let free_w = base.0 as i64 - mark.0 as i64;
    let free_h = base.1 as i64 - mark.1 as i64;
    let (ox, oy) = (offset.0 as i64, offset.1 as i64);

    let x = match position {
        Position::TopLeft | Position::CenterLeft | Position::BottomLeft => ox,
        Position::TopCenter | Position::Center | Position::BottomCenter => free_w / 2,
        Position::TopRight | Position::CenterRight | Position::BottomRight => free_w - ox,
    };
    let y = match position {
        Position::TopLeft | Position::TopCenter | Position::TopRight => oy,
        Position::CenterLeft | Position::Center | Position::CenterRight => free_h / 2,
        Position::BottomLeft | Position::BottomCenter | Position::BottomRight => free_h - oy,
    };
    (x, y)
}

/// Origins for repeating `mark` across `base` with `gap` pixels between tiles.
pub fn tile_origins(base: (u32, u32), mark: (u32, u32), gap: (u32, u32)) -> Vec<(i64, i64)> {
    let step_x = (mark.0 + gap.0).max(1) as i64;
    let step_y = (mark.1 + gap.1).max(1) as i64;
    let mut origins = Vec::new();
    let mut y = 0i64;
    while y < base.1 as i64 {
        let mut x = 0i64;
        while x < base.0 as i64 {
            origins.push((x, y));
            x += step_x;
        }
        y += step_y;
    }
    origins
}

/// Where each stitched input lands on the canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchLayout {
    pub canvas: (u32, u32),
    /// `(x, y, width, height)` per input, in input order.
    pub placements: Vec<(u32, u32, u32, u32)>,
}

/// Lay out `sizes` in a row or column sharing one edge length.
///
/// Horizontal stitching equalizes heights; vertical equalizes widths. The
/// shared edge comes from the smallest or largest input per `scale`.
pub fn stitch_layout(
    sizes: &[(u32, u32)],
    orientation: Orientation,
    spacing: u32,
    scale: StitchScale,
) -> StitchLayout {
    let shared_edges = sizes.iter().map(|&(w, h)| match orientation {
        Orientation::Horizontal => h,
        Orientation::Vertical => w,
    });
    let shared = match scale {
        StitchScale::Smallest => shared_edges.min(),
        StitchScale::Largest => shared_edges.max(),
    }
    .unwrap_or(0)
    .max(1);

    let mut placements = Vec::with_capacity(sizes.len());
    let mut cursor = 0u32;
    for (i, &(w, h)) in sizes.iter().enumerate() {
        if i > 0 {
            cursor = cursor.saturating_add(spacing);
        }
        match orientation {
            Orientation::Horizontal => {
                let scaled_w = ((w as f64 * shared as f64 / h.max(1) as f64).round() as u32).max(1);
                placements.push((cursor, 0, scaled_w, shared));
                cursor = cursor.saturating_add(scaled_w);
            }
            Orientation::Vertical => {
                let scaled_h = ((h as f64 * shared as f64 / w.max(1) as f64).round() as u32).max(1);
                placements.push((0, cursor, shared, scaled_h));
                cursor = cursor.saturating_add(scaled_h);
            }
        }
    }

    let canvas = match orientation {
        Orientation::Horizontal => (cursor.max(1), shared),
        Orientation::Vertical => (shared, cursor.max(1)),
    };
    StitchLayout { canvas, placements }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within_edge / fit_dimensions
    // =========================================================================

    #[test]
    fn fit_within_edge_landscape() {
        assert_eq!(fit_within_edge((4000, 3000), 1000), (1000, 750));
    }

    #[test]
    fn fit_within_edge_portrait() {
        assert_eq!(fit_within_edge((1500, 3000), 1000), (500, 1000));
    }

    #[test]
    fn fit_within_edge_never_upscales() {
        assert_eq!(fit_within_edge((300, 200), 1000), (300, 200));
    }

    #[test]
    fn fit_dimensions_limited_by_height() {
        // 800x600 into 400x200 → height-bound: 267x200
        assert_eq!(fit_dimensions((800, 600), (400, 200)), (267, 200));
    }

    #[test]
    fn fit_dimensions_upscales_to_bounds() {
        assert_eq!(fit_dimensions((100, 50), (400, 400)), (400, 200));
    }

    // =========================================================================
    // watermark placement
    // =========================================================================

    #[test]
    fn watermark_size_uses_short_edge() {
        // base short edge 600, scale 0.25 → width 150; mark 2:1 → 150x75
        assert_eq!(watermark_size((800, 600), (200, 100), 0.25), (150, 75));
    }

    #[test]
    fn watermark_size_never_exceeds_base() {
        // tall mark would overflow a wide base; fit keeps it inside
        let (w, h) = watermark_size((400, 100), (10, 100), 1.0);
        assert!(w <= 400 && h <= 100);
    }

    #[test]
    fn anchor_corners_respect_offset() {
        let base = (100, 80);
        let mark = (20, 10);
        assert_eq!(anchor_origin(base, mark, Position::TopLeft, (5, 5)), (5, 5));
        assert_eq!(anchor_origin(base, mark, Position::BottomRight, (5, 5)), (75, 65));
        assert_eq!(anchor_origin(base, mark, Position::TopRight, (0, 0)), (80, 0));
    }

    #[test]
    fn anchor_center_ignores_offset() {
        assert_eq!(
            anchor_origin((100, 80), (20, 10), Position::Center, (9, 9)),
            (40, 35)
        );
    }

    #[test]
    fn tiles_cover_base() {
        let origins = tile_origins((100, 50), (30, 20), (10, 5));
        // x: 0, 40, 80 ; y: 0, 25
        assert_eq!(origins.len(), 6);
        assert_eq!(origins[0], (0, 0));
        assert_eq!(origins[5], (80, 25));
    }

    // =========================================================================
    // stitch_layout
    // =========================================================================

    #[test]
    fn max_edge_applies_to_either_side() {
        assert!(!exceeds_max_edge((MAX_EDGE, MAX_EDGE)));
        assert!(exceeds_max_edge((MAX_EDGE + 1, 1)));
        assert!(exceeds_max_edge((1, 100_000)));
    }

    #[test]
    fn stitch_layout_saturates_instead_of_overflowing() {
        let layout = stitch_layout(
            &[(u32::MAX, 1), (u32::MAX, 1)],
            Orientation::Horizontal,
            u32::MAX,
            StitchScale::Smallest,
        );
        assert_eq!(layout.canvas, (u32::MAX, 1));
        assert!(exceeds_max_edge(layout.canvas));
    }

    #[test]
    fn stitch_horizontal_scales_to_smallest_height() {
        let layout = stitch_layout(
            &[(200, 100), (100, 200)],
            Orientation::Horizontal,
            0,
            StitchScale::Smallest,
        );
        // shared height 100: first 200x100, second 50x100
        assert_eq!(layout.placements, vec![(0, 0, 200, 100), (200, 0, 50, 100)]);
        assert_eq!(layout.canvas, (250, 100));
    }

    #[test]
    fn stitch_vertical_with_spacing_and_largest() {
        let layout = stitch_layout(
            &[(100, 50), (200, 100)],
            Orientation::Vertical,
            10,
            StitchScale::Largest,
        );
        // shared width 200: first 200x100, gap 10, second 200x100
        assert_eq!(layout.placements, vec![(0, 0, 200, 100), (0, 110, 200, 100)]);
        assert_eq!(layout.canvas, (200, 210));
    }

    #[test]
    fn stitch_single_image_is_identity() {
        let layout = stitch_layout(&[(64, 48)], Orientation::Horizontal, 20, StitchScale::Smallest);
        assert_eq!(layout.placements, vec![(0, 0, 64, 48)]);
        assert_eq!(layout.canvas, (64, 48));
    }
}
