use crate::canvas::RasterPoint;
use crate::components::history::MaskOperation;

/// Default brush diameter in raster pixels.
pub const DEFAULT_BRUSH_SIZE: u32 = 20;

/// Blend half of a tool: does it add to the mask or remove from it?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MaskMode {
    #[default]
    Paint,
    Erase,
}

impl MaskMode {
    pub fn label(&self) -> &'static str {
        match self {
            MaskMode::Paint => "Paint",
            MaskMode::Erase => "Erase",
        }
    }
}

/// The active tool. Brush tools draw freehand strokes, rectangle tools drag
/// out a box; each comes in a paint and an erase flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ToolMode {
    #[default]
    Paint,
    Erase,
    RectPaint,
    RectErase,
}

impl ToolMode {
    pub fn all() -> &'static [ToolMode] {
        &[
            ToolMode::Paint,
            ToolMode::Erase,
            ToolMode::RectPaint,
            ToolMode::RectErase,
        ]
    }

    pub fn mask_mode(self) -> MaskMode {
        match self {
            ToolMode::Paint | ToolMode::RectPaint => MaskMode::Paint,
            ToolMode::Erase | ToolMode::RectErase => MaskMode::Erase,
        }
    }

    pub fn is_rectangle(self) -> bool {
        matches!(self, ToolMode::RectPaint | ToolMode::RectErase)
    }

    /// Toolbar label, named after what the tool does to the mask.
    pub fn label(&self) -> &'static str {
        match self {
            ToolMode::Paint => "Mask",
            ToolMode::Erase => "Unmask",
            ToolMode::RectPaint => "Rect Mask",
            ToolMode::RectErase => "Rect Unmask",
        }
    }

    /// Stable key used in the settings file.
    pub fn config_key(&self) -> &'static str {
        match self {
            ToolMode::Paint => "paint",
            ToolMode::Erase => "erase",
            ToolMode::RectPaint => "rect_paint",
            ToolMode::RectErase => "rect_erase",
        }
    }

    pub fn from_config_key(key: &str) -> Option<Self> {
        ToolMode::all().iter().copied().find(|m| m.config_key() == key)
    }
}

/// Coerce a raw size control value into a brush size. Negative input becomes
/// 0, which is a valid no-draw size.
pub fn coerce_brush_size(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

/// Current tool and brush size. Setters are total.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToolState {
    mode: ToolMode,
    size: u32,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            mode: ToolMode::default(),
            size: DEFAULT_BRUSH_SIZE,
        }
    }
}

impl ToolState {
    pub fn new(mode: ToolMode, size: u32) -> Self {
        Self { mode, size }
    }

    pub fn mode(&self) -> ToolMode {
        self.mode
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_mode(&mut self, mode: ToolMode) {
        self.mode = mode;
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }
}

// ============================================================================
// GESTURE TRACKING
// ============================================================================

/// Per-gesture state between pointer-down and pointer-up.
///
/// Mode and width are captured when the gesture starts, so changing the tool
/// mid-drag does not alter what gets committed.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    /// Freehand stroke in progress; `points` holds every visited position.
    Drawing {
        mode: MaskMode,
        width: u32,
        points: Vec<RasterPoint>,
    },
    /// Rectangle drag in progress; nothing is committed until release.
    Previewing {
        mode: MaskMode,
        anchor: RasterPoint,
        current: RasterPoint,
    },
}

impl GestureState {
    /// Start a gesture for `tool` at `at`. Any previous gesture is replaced, so
    /// callers must finish it first.
    pub fn begin(tool: &ToolState, at: RasterPoint) -> Self {
        let mode = tool.mode().mask_mode();
        if tool.mode().is_rectangle() {
            GestureState::Previewing {
                mode,
                anchor: at,
                current: at,
            }
        } else {
            GestureState::Drawing {
                mode,
                width: tool.size(),
                points: vec![at],
            }
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, GestureState::Idle)
    }

    /// Record a pointer move. Returns the previous point for strokes so the
    /// caller can render the new segment; `None` for rectangles and idle.
    pub fn advance(&mut self, to: RasterPoint) -> Option<RasterPoint> {
        match self {
            GestureState::Drawing { points, .. } => {
                let prev = points.last().copied();
                points.push(to);
                prev
            }
            GestureState::Previewing { current, .. } => {
                *current = to;
                None
            }
            GestureState::Idle => None,
        }
    }

    /// Close the gesture and produce the operation to commit, leaving `Idle`.
    pub fn finish(&mut self) -> Option<MaskOperation> {
        match std::mem::take(self) {
            GestureState::Idle => None,
            GestureState::Drawing { mode, width, points } => {
                Some(MaskOperation::Stroke { mode, width, points })
            }
            GestureState::Previewing { mode, anchor, current } => Some(MaskOperation::Rectangle {
                mode,
                x: anchor.x,
                y: anchor.y,
                width: current.x - anchor.x,
                height: current.y - anchor.y,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_mode_decomposition() {
        assert_eq!(ToolMode::Paint.mask_mode(), MaskMode::Paint);
        assert_eq!(ToolMode::RectErase.mask_mode(), MaskMode::Erase);
        assert!(ToolMode::RectPaint.is_rectangle());
        assert!(!ToolMode::Erase.is_rectangle());
        for mode in ToolMode::all() {
            assert_eq!(ToolMode::from_config_key(mode.config_key()), Some(*mode));
        }
        assert_eq!(ToolMode::from_config_key("lasso"), None);
    }

    #[test]
    fn test_coerce_brush_size() {
        assert_eq!(coerce_brush_size(-4), 0);
        assert_eq!(coerce_brush_size(0), 0);
        assert_eq!(coerce_brush_size(35), 35);
    }

    #[test]
    fn test_tap_commits_single_point_stroke() {
        let tool = ToolState::new(ToolMode::Paint, 12);
        let mut g = GestureState::begin(&tool, RasterPoint::new(3.0, 4.0));
        assert!(g.is_active());
        let op = g.finish().unwrap();
        assert_eq!(
            op,
            MaskOperation::Stroke {
                mode: MaskMode::Paint,
                width: 12,
                points: vec![RasterPoint::new(3.0, 4.0)],
            }
        );
        assert_eq!(g, GestureState::Idle);
        assert!(g.finish().is_none());
    }

    #[test]
    fn test_stroke_accumulates_points_in_order() {
        let mut tool = ToolState::new(ToolMode::Erase, 5);
        let mut g = GestureState::begin(&tool, RasterPoint::new(0.0, 0.0));
        assert_eq!(g.advance(RasterPoint::new(1.0, 0.0)), Some(RasterPoint::new(0.0, 0.0)));
        // Resizing mid-stroke must not leak into the committed width.
        tool.set_size(40);
        assert_eq!(g.advance(RasterPoint::new(2.0, 1.0)), Some(RasterPoint::new(1.0, 0.0)));
        match g.finish() {
            Some(MaskOperation::Stroke { mode, width, points }) => {
                assert_eq!(mode, MaskMode::Erase);
                assert_eq!(width, 5);
                assert_eq!(points.len(), 3);
            }
            other => panic!("expected stroke, got {other:?}"),
        }
    }

    #[test]
    fn test_rectangle_gesture_keeps_signed_extent() {
        let tool = ToolState::new(ToolMode::RectErase, 1);
        let mut g = GestureState::begin(&tool, RasterPoint::new(30.0, 40.0));
        assert_eq!(g.advance(RasterPoint::new(35.0, 45.0)), None);
        g.advance(RasterPoint::new(10.0, 25.0));
        assert_eq!(
            g.finish(),
            Some(MaskOperation::Rectangle {
                mode: MaskMode::Erase,
                x: 30.0,
                y: 40.0,
                width: -20.0,
                height: -15.0,
            })
        );
    }
}
