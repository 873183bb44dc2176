//! Reduced-scale minimap rasterization.
//!
//! The minimap is a coarse visual index, not readable text: one texel row per
//! source line inside the sampling window, with styled lines drawn heavier
//! than plain ones. Drawing goes through the [`RasterSurface`] seam so the
//! same sampling output can back a canvas, a terminal cell grid, or the
//! in-memory buffer the tests use.

use crate::format::Severity;

/// RGBA color, 8 bits per channel
pub type Rgba = [u8; 4];

/// Coarse per-line style info sampled from the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRow {
    /// Severity of the source line, if any
    pub severity: Option<Severity>,
    /// Styled lines render with a heavier weight
    pub bold: bool,
    /// Line length in characters, for the bar width
    pub width: usize,
}

/// A canvas-like drawing surface. Assumed present in the embedding
/// environment; [`PixelBuffer`] is the bundled in-memory implementation.
pub trait RasterSurface {
    /// `(width, height)` in pixels
    fn dimensions(&self) -> (u32, u32);
    /// Fill a rectangle, clipped to the surface
    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgba);
    /// Clear the whole surface
    fn clear(&mut self, color: Rgba);
}

/// Plain RGBA pixel buffer
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0, 0, 0, 0]; (width * height) as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        self.pixels[(y * self.width + x) as usize]
    }
}

impl RasterSurface for PixelBuffer {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: Rgba) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for py in y.min(self.height)..y_end {
            for px in x.min(self.width)..x_end {
                self.pixels[(py * self.width + px) as usize] = color;
            }
        }
    }

    fn clear(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }
}

/// Draw sampled rows onto a surface. `row_px` is the height of one texel row
/// (item height at the minimap's reduced scale); `color_for` maps a row's
/// style to its bar color.
pub fn render_minimap(
    samples: &[SampleRow],
    surface: &mut dyn RasterSurface,
    row_px: f64,
    background: Rgba,
    color_for: &dyn Fn(&SampleRow) -> Rgba,
) {
    surface.clear(background);
    let (surface_w, surface_h) = surface.dimensions();
    if surface_w == 0 || surface_h == 0 {
        return;
    }

    for (i, row) in samples.iter().enumerate() {
        if row.width == 0 {
            continue;
        }
        let y = (i as f64 * row_px).floor() as u32;
        if y >= surface_h {
            break;
        }
        // One char of source text ≈ one minimap pixel, clipped to the strip.
        let bar_w = (row.width as u32).min(surface_w);
        // Heavier weight for styled lines.
        let bar_h = if row.bold { 2 } else { 1 };
        surface.fill_rect(0, y, bar_w, bar_h, color_for(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgba = [0, 0, 0, 255];
    const PLAIN: Rgba = [128, 128, 128, 255];
    const ERROR: Rgba = [255, 64, 64, 255];

    fn color_for(row: &SampleRow) -> Rgba {
        match row.severity {
            Some(Severity::Error) => ERROR,
            _ => PLAIN,
        }
    }

    fn row(width: usize) -> SampleRow {
        SampleRow {
            severity: None,
            bold: false,
            width,
        }
    }

    #[test]
    fn test_rows_land_on_their_texel_row() {
        let mut buf = PixelBuffer::new(40, 20);
        let samples = vec![row(10), row(5), row(0), row(7)];
        render_minimap(&samples, &mut buf, 2.0, BG, &color_for);

        assert_eq!(buf.pixel(0, 0), PLAIN);
        assert_eq!(buf.pixel(9, 0), PLAIN);
        assert_eq!(buf.pixel(10, 0), BG);
        assert_eq!(buf.pixel(4, 2), PLAIN);
        // Empty line leaves its row untouched.
        assert_eq!(buf.pixel(0, 4), BG);
        assert_eq!(buf.pixel(6, 6), PLAIN);
    }

    #[test]
    fn test_styled_rows_draw_heavier_and_colored() {
        let mut buf = PixelBuffer::new(40, 20);
        let samples = vec![
            SampleRow {
                severity: Some(Severity::Error),
                bold: true,
                width: 12,
            },
            row(12),
        ];
        render_minimap(&samples, &mut buf, 4.0, BG, &color_for);

        assert_eq!(buf.pixel(0, 0), ERROR);
        assert_eq!(buf.pixel(0, 1), ERROR);
        assert_eq!(buf.pixel(0, 2), BG);
        // Plain row: single-pixel weight.
        assert_eq!(buf.pixel(0, 4), PLAIN);
        assert_eq!(buf.pixel(0, 5), BG);
    }

    #[test]
    fn test_long_lines_clip_to_strip_width() {
        let mut buf = PixelBuffer::new(16, 8);
        render_minimap(&[row(500)], &mut buf, 2.0, BG, &color_for);
        assert_eq!(buf.pixel(15, 0), PLAIN);
    }

    #[test]
    fn test_overflowing_samples_stop_at_surface_bottom() {
        let mut buf = PixelBuffer::new(8, 4);
        let samples: Vec<SampleRow> = (0..100).map(|_| row(3)).collect();
        // 100 rows at 2px each would need 200px; the 4px surface clips.
        render_minimap(&samples, &mut buf, 2.0, BG, &color_for);
        assert_eq!(buf.pixel(0, 3), BG);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.fill_rect(2, 2, 10, 10, PLAIN);
        assert_eq!(buf.pixel(3, 3), PLAIN);
        assert_eq!(buf.pixel(0, 0), [0, 0, 0, 0]);
    }
}
