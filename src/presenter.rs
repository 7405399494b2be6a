//! # presenter
//!
//! Turns a snapshot of video cells into an RGBA surface. Each cell's low
//! byte is its luminance; the upper 24 bits are masked off whatever they
//! hold. Every pixel is opaque, dark ones included. Scaling is nearest
//! neighbour: each cell becomes a `scale` x `scale` block.
//!
//! `render` keeps no state, so the same cells always give the same surface.

/// RGBA colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

/// dim line colour for the optional cell grid
pub const GRID_COLOUR: Rgba = Rgba(0x33, 0x33, 0x33, 0xff);

/// Row-major RGBA8 pixels, plus the cell size and grid colour they were
/// drawn with so a coarser display can resample them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub width: usize,
    pub height: usize,
    pub scale: usize,
    pub grid: Option<Rgba>,
    pub pixels: Vec<u8>,
}

impl Surface {
    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * 4;
        Some(Rgba(
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ))
    }

    fn put(&mut self, x: usize, y: usize, colour: Rgba) {
        let i = (y * self.width + x) * 4;
        self.pixels[i..i + 4].copy_from_slice(&[colour.0, colour.1, colour.2, colour.3]);
    }
}

/// low byte of a cell
pub fn luminance(cell: u32) -> u8 {
    (cell & 0xff) as u8
}

/// Rasterize `width` x `height` cells at `scale`. Cells missing from a
/// short buffer draw as opaque black.
pub fn render(cells: &[u32], width: usize, height: usize, scale: usize) -> Surface {
    let (out_w, out_h) = (width * scale, height * scale);
    let mut surface = Surface {
        width: out_w,
        height: out_h,
        scale,
        grid: None,
        pixels: vec![0; out_w * out_h * 4],
    };
    for py in 0..out_h {
        let row = (py / scale) * width;
        for px in 0..out_w {
            let l = cells.get(row + px / scale).copied().map_or(0, luminance);
            surface.put(px, py, Rgba(l, l, l, 0xff));
        }
    }
    surface
}

/// Draw 1px lines on the interior cell boundaries. Cosmetic only.
pub fn draw_grid(surface: &mut Surface, scale: usize, colour: Rgba) {
    if scale < 2 {
        return;
    }
    surface.grid = Some(colour);
    for y in (scale..surface.height).step_by(scale) {
        for x in 0..surface.width {
            surface.put(x, y, colour);
        }
    }
    for x in (scale..surface.width).step_by(scale) {
        for y in 0..surface.height {
            surface.put(x, y, colour);
        }
    }
}

/// Geometry plus overlay settings for one display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presenter {
    pub width: usize,
    pub height: usize,
    pub scale: usize,
    pub grid: Option<Rgba>,
}

impl Presenter {
    pub fn new(width: usize, height: usize, scale: usize) -> Self {
        Presenter {
            width,
            height,
            scale,
            grid: None,
        }
    }

    pub fn with_grid(mut self, colour: Rgba) -> Self {
        self.grid = Some(colour);
        self
    }

    pub fn present(&self, cells: &[u32]) -> Surface {
        let mut surface = render(cells, self.width, self.height, self.scale);
        if let Some(colour) = self.grid {
            draw_grid(&mut surface, self.scale, colour);
        }
        surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BLACK: Rgba = Rgba(0, 0, 0, 0xff);
    const WHITE: Rgba = Rgba(0xff, 0xff, 0xff, 0xff);

    #[test]
    fn test_surface_size() {
        let s = render(&[0; 64 * 32], 64, 32, 10);
        assert_eq!((s.width, s.height), (640, 320));
        assert_eq!(s.pixels.len(), 640 * 320 * 4);
    }

    #[test]
    fn test_dark_pixels_are_opaque() {
        let s = render(&[0; 4], 2, 2, 1);
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(s.pixel(x, y), Some(BLACK));
            }
        }
    }

    #[test]
    fn test_upper_bits_ignored() {
        let s = render(&[0, 0x00ff_00ff, 0xffff_ff00, 0xffff_ffff], 2, 2, 1);
        assert_eq!(s.pixel(0, 0), Some(BLACK));
        assert_eq!(s.pixel(1, 0), Some(WHITE));
        assert_eq!(s.pixel(0, 1), Some(BLACK));
        assert_eq!(s.pixel(1, 1), Some(WHITE));
    }

    #[test]
    fn test_grey_levels_pass_through() {
        let s = render(&[0x80], 1, 1, 1);
        assert_eq!(s.pixel(0, 0), Some(Rgba(0x80, 0x80, 0x80, 0xff)));
    }

    #[test]
    fn test_nearest_neighbour_blocks() {
        let s = render(&[0xff, 0x00, 0x00, 0xff], 2, 2, 3);
        for y in 0..6 {
            for x in 0..6 {
                let lit = (x < 3) == (y < 3);
                let want = if lit { WHITE } else { BLACK };
                assert_eq!(s.pixel(x, y), Some(want), "({x}, {y})");
            }
        }
    }

    #[test]
    fn test_render_is_pure() {
        let cells: Vec<u32> = (0..64 * 32).map(|i| if i % 3 == 0 { 0xff } else { 0 }).collect();
        let a = render(&cells, 64, 32, 4);
        let b = render(&cells, 64, 32, 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_buffer_draws_black() {
        let s = render(&[0xff], 2, 1, 1);
        assert_eq!(s.pixel(0, 0), Some(WHITE));
        assert_eq!(s.pixel(1, 0), Some(BLACK));
    }

    #[test]
    fn test_grid_on_boundaries_only() {
        let p = Presenter::new(2, 2, 4).with_grid(GRID_COLOUR);
        let s = p.present(&[0xff; 4]);
        assert_eq!(s.pixel(4, 1), Some(GRID_COLOUR));
        assert_eq!(s.pixel(1, 4), Some(GRID_COLOUR));
        assert_eq!(s.pixel(1, 1), Some(WHITE));
        assert_eq!(s.pixel(0, 0), Some(WHITE));
        assert_eq!((s.scale, s.grid), (4, Some(GRID_COLOUR)));
    }

    #[test]
    fn test_no_grid_at_scale_one() {
        let mut s = render(&[0xff; 4], 2, 2, 1);
        let before = s.clone();
        draw_grid(&mut s, 1, GRID_COLOUR);
        assert_eq!(s, before);
    }
}
