use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// A pixel with zero alpha. Erased and never-painted pixels hold this value.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// RASTER SPACE GEOMETRY
// ============================================================================

/// A position in raster space (native pixel coordinates of the mask buffer).
/// Sub-pixel precision is kept so replayed strokes land exactly where they
/// were drawn.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RasterPoint {
    pub x: f32,
    pub y: f32,
}

impl RasterPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in raster space with `min <= max` on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl RasterRect {
    /// Build from an anchor and signed extents. A negative width/height grows
    /// the rectangle left/up from the anchor.
    pub fn from_anchor(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_corners(RasterPoint::new(x, y), RasterPoint::new(x + width, y + height))
    }

    pub fn from_corners(a: RasterPoint, b: RasterPoint) -> Self {
        Self {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    /// True when the rectangle covers no area (and therefore no pixels).
    pub fn is_empty(&self) -> bool {
        !(self.max_x > self.min_x && self.max_y > self.min_y)
    }

    /// Pixel span `(x0, y0, x1, y1)`, exclusive upper bounds, of the pixels whose
    /// centres fall inside `[min, max)`, clamped to a `width × height` raster.
    fn pixel_span(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.is_empty() {
            return None;
        }
        let x0 = clamp_index((self.min_x - 0.5).ceil(), width);
        let x1 = clamp_index((self.max_x - 0.5).ceil(), width);
        let y0 = clamp_index((self.min_y - 0.5).ceil(), height);
        let y1 = clamp_index((self.max_y - 0.5).ceil(), height);
        if x0 >= x1 || y0 >= y1 {
            None
        } else {
            Some((x0, y0, x1, y1))
        }
    }
}

/// Clamp a floating pixel index into `[0, limit]`. NaN maps to 0.
#[inline]
fn clamp_index(v: f32, limit: u32) -> u32 {
    if v.is_nan() || v <= 0.0 {
        0
    } else if v >= limit as f32 {
        limit
    } else {
        v as u32
    }
}

// ============================================================================
// COORDINATE MAPPING - display space → raster space
// ============================================================================

/// Where the raster is drawn on screen, in display coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl DisplayRect {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Raster shown unscaled at the origin: display and raster space coincide.
    pub fn identity(raster_width: u32, raster_height: u32) -> Self {
        Self::new(0.0, 0.0, raster_width as f32, raster_height as f32)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.left + self.width && y >= self.top && y < self.top + self.height
    }
}

/// Raster pixels per display unit along each axis. A degenerate display
/// extent maps with scale 1 on that axis.
pub fn viewport_scale(
    display_width: f32,
    display_height: f32,
    raster_width: u32,
    raster_height: u32,
) -> (f32, f32) {
    (axis_scale(display_width, raster_width), axis_scale(display_height, raster_height))
}

#[inline]
fn axis_scale(display: f32, raster: u32) -> f32 {
    if display > 0.0 { raster as f32 / display } else { 1.0 }
}

#[inline]
fn map_axis(pointer: f32, origin: f32, display: f32, raster: u32) -> f32 {
    if display > 0.0 {
        (pointer - origin) * raster as f32 / display
    } else {
        pointer - origin
    }
}

/// Map a pointer position in display space to raster space.
///
/// Pointers outside `rect` map outside the raster; nothing is clamped, so a
/// drag that leaves the element keeps producing sensible coordinates.
pub fn display_to_raster(
    pointer_x: f32,
    pointer_y: f32,
    rect: DisplayRect,
    raster_width: u32,
    raster_height: u32,
) -> RasterPoint {
    RasterPoint::new(
        map_axis(pointer_x, rect.left, rect.width, raster_width),
        map_axis(pointer_y, rect.top, rect.height, raster_height),
    )
}

// ============================================================================
// BLEND RULES
// ============================================================================

/// How a draw call combines with the destination pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BlendRule {
    /// Opaque colour composited normally (over). Alpha is forced to 255, so the
    /// destination is simply replaced.
    Paint(Rgba<u8>),
    /// Unconditional alpha clear: covered pixels become fully transparent.
    Erase,
}

impl BlendRule {
    #[inline]
    fn pixel(self) -> Rgba<u8> {
        match self {
            BlendRule::Paint(c) => Rgba([c[0], c[1], c[2], 255]),
            BlendRule::Erase => TRANSPARENT,
        }
    }
}

// ============================================================================
// RASTER BUFFER
// ============================================================================

/// The mask layer: a fixed-size RGBA grid.
///
/// Coverage is hard-edged (a pixel is either fully covered by a shape or not
/// touched at all), so every pixel is either transparent or opaque mask colour.
/// `revision` is bumped on every mutation so front ends can tell when to
/// re-upload the texture.
#[derive(Clone)]
pub struct RasterBuffer {
    pixels: RgbaImage,
    revision: u64,
}

impl RasterBuffer {
    /// Create a fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            revision: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Read a pixel (transparent outside the buffer).
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        if x < self.width() && y < self.height() {
            *self.pixels.get_pixel(x, y)
        } else {
            TRANSPARENT
        }
    }

    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        self.pixel(x, y)[3] != 0
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn to_image(&self) -> RgbaImage {
        self.pixels.clone()
    }

    /// True when no pixel carries any alpha.
    pub fn is_clear(&self) -> bool {
        let raw: &[u8] = &self.pixels;
        raw.par_chunks_exact(4).all(|px| px[3] == 0)
    }

    pub fn masked_pixel_count(&self) -> usize {
        let raw: &[u8] = &self.pixels;
        raw.par_chunks_exact(4).filter(|px| px[3] != 0).count()
    }

    #[inline]
    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Make every pixel transparent.
    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_iter_mut().for_each(|b| *b = 0);
        self.touch();
    }

    /// Draw a round-capped segment of the given width. `from == to` stamps a
    /// dot. A non-positive width draws nothing.
    pub fn draw_segment(&mut self, from: RasterPoint, to: RasterPoint, width: f32, rule: BlendRule) {
        let radius = width * 0.5;
        if !(radius > 0.0) {
            return;
        }
        let (w, h) = (self.width(), self.height());
        let x0 = clamp_index((from.x.min(to.x) - radius).floor(), w);
        let x1 = clamp_index((from.x.max(to.x) + radius).ceil() + 1.0, w);
        let y0 = clamp_index((from.y.min(to.y) - radius).floor(), h);
        let y1 = clamp_index((from.y.max(to.y) + radius).ceil() + 1.0, h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let r_sq = radius * radius;
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let len_sq = dx * dx + dy * dy;
        let value = rule.pixel();

        for y in y0..y1 {
            let cy = y as f32 + 0.5;
            for x in x0..x1 {
                let cx = x as f32 + 0.5;
                // Closest point on the segment to the pixel centre.
                let t = if len_sq > 0.0 {
                    (((cx - from.x) * dx + (cy - from.y) * dy) / len_sq).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let ex = from.x + dx * t - cx;
                let ey = from.y + dy * t - cy;
                if ex * ex + ey * ey <= r_sq {
                    self.pixels.put_pixel(x, y, value);
                }
            }
        }
        self.touch();
    }

    /// Fill every pixel whose centre lies inside `rect`. Rows are filled in parallel.
    pub fn fill_rect(&mut self, rect: RasterRect, rule: BlendRule) {
        let Some((x0, y0, x1, y1)) = rect.pixel_span(self.width(), self.height()) else {
            return;
        };
        let value = rule.pixel().0;
        let row_bytes = self.width() as usize * 4;
        let (start, end) = (x0 as usize * 4, x1 as usize * 4);
        let raw: &mut [u8] = &mut self.pixels;
        raw.par_chunks_exact_mut(row_bytes)
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|row| {
                for px in row[start..end].chunks_exact_mut(4) {
                    px.copy_from_slice(&value);
                }
            });
        self.touch();
    }

    /// Stroke the border of `rect` with a band `line_width` wide, kept inside the
    /// rectangle's bounds. With `dash = Some(len)` the band alternates on/off
    /// every `len` pixels measured clockwise along the perimeter from the top-left.
    pub fn stroke_rect_outline(
        &mut self,
        rect: RasterRect,
        line_width: f32,
        dash: Option<f32>,
        rule: BlendRule,
    ) {
        if !(line_width > 0.0) {
            return;
        }
        let Some((x0, y0, x1, y1)) = rect.pixel_span(self.width(), self.height()) else {
            return;
        };
        let value = rule.pixel();
        let band = (line_width.ceil() as u32).saturating_add(1);
        let (rw, rh) = (rect.width(), rect.height());

        for y in y0..y1 {
            let cy = y as f32 + 0.5;
            let near_horizontal_edge =
                cy - rect.min_y <= line_width || rect.max_y - cy <= line_width;
            // Interior rows only need the left and right bands.
            let (left_end, right_start) = if near_horizontal_edge {
                (x1, x1)
            } else {
                ((x0 + band).min(x1), x1.saturating_sub(band).max(x0))
            };
            for x in (x0..left_end).chain(right_start.max(left_end)..x1) {
                let cx = x as f32 + 0.5;
                let d_top = cy - rect.min_y;
                let d_right = rect.max_x - cx;
                let d_bottom = rect.max_y - cy;
                let d_left = cx - rect.min_x;
                let edge = d_top.min(d_right).min(d_bottom).min(d_left);
                if edge > line_width {
                    continue;
                }
                if let Some(dash) = dash.filter(|d| *d > 0.0) {
                    let along = if edge == d_top {
                        d_left
                    } else if edge == d_right {
                        rw + d_top
                    } else if edge == d_bottom {
                        rw + rh + d_right
                    } else {
                        2.0 * rw + rh + d_bottom
                    };
                    if (along / dash).floor() as i64 % 2 == 1 {
                        continue;
                    }
                }
                self.pixels.put_pixel(x, y, value);
            }
        }
        self.touch();
    }
}

impl std::fmt::Debug for RasterBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("revision", &self.revision)
            .finish()
    }
}
