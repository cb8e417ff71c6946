// ============================================================================
// MASK COMPOSITOR - renders operations and previews onto the mask buffer
// ============================================================================
//
// The live stroke path (`stamp` on press, `stroke_segment` per move) and the
// replay path (`render`) issue the same draw calls in the same order, so a
// replayed stroke is bit-identical to the one drawn under the pointer.

use image::Rgba;

use crate::canvas::{BlendRule, RasterBuffer, RasterPoint, RasterRect};
use crate::components::history::MaskOperation;
use crate::components::tools::MaskMode;

/// Opaque red, the classic mask colour.
pub const DEFAULT_MASK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
/// Width of the boundary drawn around painted rectangles.
pub const DEFAULT_OUTLINE_WIDTH: f32 = 2.0;
/// On/off run length of the dashed rectangle preview.
pub const DEFAULT_DASH_LENGTH: f32 = 6.0;

#[derive(Clone, Debug, PartialEq)]
pub struct Compositor {
    pub mask_color: Rgba<u8>,
    pub preview_color: Rgba<u8>,
    pub outline_width: f32,
    pub dash_length: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            mask_color: DEFAULT_MASK_COLOR,
            preview_color: DEFAULT_MASK_COLOR,
            outline_width: DEFAULT_OUTLINE_WIDTH,
            dash_length: DEFAULT_DASH_LENGTH,
        }
    }
}

impl Compositor {
    pub fn blend_rule(&self, mode: MaskMode) -> BlendRule {
        match mode {
            MaskMode::Paint => BlendRule::Paint(self.mask_color),
            MaskMode::Erase => BlendRule::Erase,
        }
    }

    /// Zero-length segment at `at`, so a tap without drag still marks pixels.
    pub fn stamp(&self, buffer: &mut RasterBuffer, at: RasterPoint, width: u32, mode: MaskMode) {
        self.stroke_segment(buffer, at, at, width, mode);
    }

    pub fn stroke_segment(
        &self,
        buffer: &mut RasterBuffer,
        from: RasterPoint,
        to: RasterPoint,
        width: u32,
        mode: MaskMode,
    ) {
        buffer.draw_segment(from, to, width as f32, self.blend_rule(mode));
    }

    /// Non-interactive render of one committed operation.
    pub fn render(&self, buffer: &mut RasterBuffer, op: &MaskOperation) {
        match op {
            MaskOperation::Stroke { mode, width, points } => {
                let Some(&first) = points.first() else { return };
                self.stamp(buffer, first, *width, *mode);
                for pair in points.windows(2) {
                    self.stroke_segment(buffer, pair[0], pair[1], *width, *mode);
                }
            }
            MaskOperation::Rectangle { mode, x, y, width, height } => {
                let rect = RasterRect::from_anchor(*x, *y, *width, *height);
                let rule = self.blend_rule(*mode);
                buffer.fill_rect(rect, rule);
                if *mode == MaskMode::Paint {
                    buffer.stroke_rect_outline(rect, self.outline_width, None, rule);
                }
            }
        }
    }

    /// Dashed outline from `anchor` to `current`. Drawn over a freshly replayed
    /// buffer and never recorded, so an abandoned drag leaves no trace.
    pub fn render_rect_preview(&self, buffer: &mut RasterBuffer, anchor: RasterPoint, current: RasterPoint) {
        let rect = RasterRect::from_corners(anchor, current);
        buffer.stroke_rect_outline(
            rect,
            self.outline_width.max(1.0),
            Some(self.dash_length),
            BlendRule::Paint(self.preview_color),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::TRANSPARENT;

    #[test]
    fn test_live_stroke_matches_replay() {
        let c = Compositor::default();
        let pts = [
            RasterPoint::new(10.0, 10.0),
            RasterPoint::new(30.5, 12.25),
            RasterPoint::new(31.0, 40.0),
            RasterPoint::new(5.0, 45.0),
        ];

        let mut live = RasterBuffer::new(64, 64);
        c.stamp(&mut live, pts[0], 7, MaskMode::Paint);
        for w in pts.windows(2) {
            c.stroke_segment(&mut live, w[0], w[1], 7, MaskMode::Paint);
        }

        let mut replayed = RasterBuffer::new(64, 64);
        c.render(
            &mut replayed,
            &MaskOperation::Stroke {
                mode: MaskMode::Paint,
                width: 7,
                points: pts.to_vec(),
            },
        );
        assert_eq!(live.as_raw(), replayed.as_raw());
    }

    #[test]
    fn test_single_point_stroke_scenario() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(100, 100);
        c.render(
            &mut buf,
            &MaskOperation::Stroke {
                mode: MaskMode::Paint,
                width: 20,
                points: vec![RasterPoint::new(50.0, 50.0)],
            },
        );
        assert_eq!(buf.pixel(50, 50), DEFAULT_MASK_COLOR);
        assert_eq!(buf.pixel(0, 0), TRANSPARENT);
    }

    #[test]
    fn test_erase_rectangle_removes_painted_rectangle() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(60, 60);
        // Surrounding strokes of a different size must not matter.
        c.render(
            &mut buf,
            &MaskOperation::Stroke {
                mode: MaskMode::Paint,
                width: 3,
                points: vec![RasterPoint::new(2.0, 50.0), RasterPoint::new(55.0, 50.0)],
            },
        );
        let paint = MaskOperation::Rectangle { mode: MaskMode::Paint, x: 10.0, y: 10.0, width: 20.0, height: 20.0 };
        let erase = MaskOperation::Rectangle { mode: MaskMode::Erase, x: 10.0, y: 10.0, width: 20.0, height: 20.0 };
        c.render(&mut buf, &paint);
        assert!(buf.is_masked(15, 15));
        c.render(&mut buf, &erase);
        for y in 10..30 {
            for x in 10..30 {
                assert_eq!(buf.pixel(x, y), TRANSPARENT, "pixel ({x},{y}) still masked");
            }
        }
        assert!(buf.is_masked(20, 50));
    }

    #[test]
    fn test_zero_width_stroke_is_invisible() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(16, 16);
        c.render(
            &mut buf,
            &MaskOperation::Stroke {
                mode: MaskMode::Paint,
                width: 0,
                points: vec![RasterPoint::new(8.0, 8.0), RasterPoint::new(2.0, 3.0)],
            },
        );
        assert!(buf.is_clear());
    }

    #[test]
    fn test_preview_uses_preview_color() {
        let c = Compositor {
            preview_color: Rgba([0, 200, 255, 255]),
            ..Compositor::default()
        };
        let mut buf = RasterBuffer::new(40, 40);
        c.render_rect_preview(&mut buf, RasterPoint::new(30.0, 30.0), RasterPoint::new(5.0, 5.0));
        assert_eq!(buf.pixel(5, 5), Rgba([0, 200, 255, 255]));
        assert!(!buf.is_masked(17, 17));
    }
}
