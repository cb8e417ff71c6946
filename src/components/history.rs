use crate::canvas::{RasterBuffer, RasterPoint, RasterRect};
use crate::components::tools::MaskMode;
use crate::ops::compositor::Compositor;

// ============================================================================
// MASK OPERATION - one committed, replayable edit
// ============================================================================

/// A committed edit. Carries every parameter needed to redraw it, so replay
/// depends only on the target buffer and the blend rule implied by `mode`.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskOperation {
    /// Freehand path. `points` is never empty; a tap is a one-point stroke.
    Stroke {
        mode: MaskMode,
        width: u32,
        points: Vec<RasterPoint>,
    },
    /// Rectangle anchored at `(x, y)`. Negative extents grow left / up.
    Rectangle {
        mode: MaskMode,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
}

impl MaskOperation {
    pub fn mode(&self) -> MaskMode {
        match self {
            MaskOperation::Stroke { mode, .. } | MaskOperation::Rectangle { mode, .. } => *mode,
        }
    }

    pub fn description(&self) -> String {
        match self {
            MaskOperation::Stroke { mode, .. } => format!("{} Stroke", mode.label()),
            MaskOperation::Rectangle { mode, .. } => format!("{} Rectangle", mode.label()),
        }
    }

    /// Normalized bounds of a rectangle operation.
    pub fn rect(&self) -> Option<RasterRect> {
        match *self {
            MaskOperation::Rectangle { x, y, width, height, .. } => {
                Some(RasterRect::from_anchor(x, y, width, height))
            }
            MaskOperation::Stroke { .. } => None,
        }
    }

    /// True for operations that commit but leave no visible mark
    /// (zero brush width, zero-area rectangle).
    pub fn is_degenerate(&self) -> bool {
        match self {
            MaskOperation::Stroke { width, points, .. } => *width == 0 || points.is_empty(),
            MaskOperation::Rectangle { .. } => self.rect().is_none_or(|r| r.is_empty()),
        }
    }

    /// Rough heap footprint, for the history panel.
    pub fn memory_size(&self) -> usize {
        let points = match self {
            MaskOperation::Stroke { points, .. } => points.len() * std::mem::size_of::<RasterPoint>(),
            MaskOperation::Rectangle { .. } => 0,
        };
        std::mem::size_of::<MaskOperation>() + points
    }
}

// ============================================================================
// HISTORY LOG - cursor-addressed operation log with replay
// ============================================================================

/// Ordered operation log plus a cursor at the last applied operation.
///
/// `cursor == None` means nothing is applied. Operations after the cursor are
/// the redo branch; they survive until the next `push`. The committed mask is
/// always `replay(ops[..=cursor])` from an empty buffer.
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    ops: Vec<MaskOperation>,
    cursor: Option<usize>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed operation, discarding the redo branch.
    pub fn push(&mut self, op: MaskOperation) {
        self.ops.truncate(self.applied_len());
        self.ops.push(op);
        self.cursor = Some(self.ops.len() - 1);
    }

    /// Step back one operation and rebuild `buffer`. Returns the description of
    /// the undone operation, or `None` when there is nothing to undo.
    pub fn undo(&mut self, buffer: &mut RasterBuffer, compositor: &Compositor) -> Option<String> {
        let current = self.cursor?;
        let description = self.ops[current].description();
        self.cursor = current.checked_sub(1);
        self.replay(buffer, compositor);
        Some(description)
    }

    /// Re-apply the next operation of the redo branch and rebuild `buffer`.
    pub fn redo(&mut self, buffer: &mut RasterBuffer, compositor: &Compositor) -> Option<String> {
        let next = self.applied_len();
        let description = self.ops.get(next)?.description();
        self.cursor = Some(next);
        self.replay(buffer, compositor);
        Some(description)
    }

    /// Undo `steps` operations with a single replay.
    pub fn undo_to(&mut self, steps: usize, buffer: &mut RasterBuffer, compositor: &Compositor) -> usize {
        let applied = self.applied_len();
        let steps = steps.min(applied);
        if steps == 0 {
            return 0;
        }
        self.cursor = (applied - steps).checked_sub(1);
        self.replay(buffer, compositor);
        steps
    }

    /// Drop every operation and clear `buffer` directly.
    pub fn clear(&mut self, buffer: &mut RasterBuffer) {
        self.ops.clear();
        self.cursor = None;
        buffer.clear();
    }

    /// Rebuild `buffer` from empty by applying every operation up to the cursor.
    pub fn replay(&self, buffer: &mut RasterBuffer, compositor: &Compositor) {
        buffer.clear();
        for op in self.applied() {
            compositor.render(buffer, op);
        }
    }

    /// Operations currently applied, oldest first.
    pub fn applied(&self) -> &[MaskOperation] {
        &self.ops[..self.applied_len()]
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    fn applied_len(&self) -> usize {
        self.cursor.map_or(0, |c| c + 1)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.applied_len() < self.ops.len()
    }

    pub fn undo_count(&self) -> usize {
        self.applied_len()
    }

    pub fn redo_count(&self) -> usize {
        self.ops.len() - self.applied_len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.applied().last().map(MaskOperation::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.ops.get(self.applied_len()).map(MaskOperation::description)
    }

    /// Descriptions of applied operations, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.applied().iter().rev().map(MaskOperation::description).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.ops.iter().map(MaskOperation::memory_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(mode: MaskMode, width: u32, pts: &[(f32, f32)]) -> MaskOperation {
        MaskOperation::Stroke {
            mode,
            width,
            points: pts.iter().map(|&(x, y)| RasterPoint::new(x, y)).collect(),
        }
    }

    fn rect(mode: MaskMode, x: f32, y: f32, w: f32, h: f32) -> MaskOperation {
        MaskOperation::Rectangle { mode, x, y, width: w, height: h }
    }

    fn sample_ops() -> Vec<MaskOperation> {
        vec![
            stroke(MaskMode::Paint, 9, &[(5.0, 5.0), (40.0, 12.0), (60.0, 50.0)]),
            rect(MaskMode::Paint, 20.0, 20.0, 30.0, -15.0),
            stroke(MaskMode::Erase, 6, &[(25.0, 10.0), (45.0, 10.0)]),
            rect(MaskMode::Erase, 50.0, 45.0, 10.0, 10.0),
        ]
    }

    /// Apply ops one at a time like a live session would.
    fn commit_all(log: &mut HistoryLog, buf: &mut RasterBuffer, c: &Compositor, ops: &[MaskOperation]) {
        for op in ops {
            c.render(buf, op);
            log.push(op.clone());
        }
    }

    #[test]
    fn test_push_moves_cursor() {
        let mut log = HistoryLog::new();
        assert_eq!(log.cursor(), None);
        log.push(rect(MaskMode::Paint, 0.0, 0.0, 1.0, 1.0));
        log.push(rect(MaskMode::Paint, 1.0, 1.0, 1.0, 1.0));
        assert_eq!(log.cursor(), Some(1));
        assert_eq!(log.len(), 2);
        assert!(log.can_undo());
        assert!(!log.can_redo());
    }

    #[test]
    fn test_undo_all_then_redo_all_is_bit_exact() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(80, 64);
        let mut log = HistoryLog::new();
        let ops = sample_ops();
        commit_all(&mut log, &mut buf, &c, &ops);
        let drawn = buf.to_image();
        assert!(!buf.is_clear());

        for _ in 0..ops.len() {
            assert!(log.undo(&mut buf, &c).is_some());
        }
        assert!(buf.is_clear());
        assert!(log.undo(&mut buf, &c).is_none());

        for _ in 0..ops.len() {
            assert!(log.redo(&mut buf, &c).is_some());
        }
        assert_eq!(buf.as_raw(), drawn.as_raw());
        assert!(log.redo(&mut buf, &c).is_none());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let c = Compositor::default();
        let mut log = HistoryLog::new();
        for op in sample_ops() {
            log.push(op);
        }
        let mut a = RasterBuffer::new(80, 64);
        let mut b = RasterBuffer::new(80, 64);
        // Start from different garbage to prove replay clears first.
        c.render(&mut b, &rect(MaskMode::Paint, 0.0, 0.0, 80.0, 64.0));
        log.replay(&mut a, &c);
        log.replay(&mut b, &c);
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_new_edit_discards_redo_branch() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(80, 64);
        let mut log = HistoryLog::new();
        commit_all(&mut log, &mut buf, &c, &sample_ops());

        log.undo(&mut buf, &c);
        assert!(log.can_redo());
        let extra = stroke(MaskMode::Paint, 3, &[(1.0, 1.0)]);
        c.render(&mut buf, &extra);
        log.push(extra.clone());

        assert!(!log.can_redo());
        assert!(log.redo(&mut buf, &c).is_none());
        assert_eq!(log.len(), 4);
        assert_eq!(log.applied().last(), Some(&extra));
    }

    #[test]
    fn test_undo_to_and_descriptions() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(80, 64);
        let mut log = HistoryLog::new();
        commit_all(&mut log, &mut buf, &c, &sample_ops());
        assert_eq!(
            log.undo_history(),
            vec!["Erase Rectangle", "Erase Stroke", "Paint Rectangle", "Paint Stroke"]
        );

        assert_eq!(log.undo_to(2, &mut buf, &c), 2);
        assert_eq!(log.cursor(), Some(1));
        assert_eq!(log.redo_count(), 2);
        assert_eq!(log.redo_description().as_deref(), Some("Erase Stroke"));

        assert_eq!(log.undo_to(10, &mut buf, &c), 2);
        assert_eq!(log.cursor(), None);
        assert!(buf.is_clear());
    }

    #[test]
    fn test_clear_resets_log_and_buffer() {
        let c = Compositor::default();
        let mut buf = RasterBuffer::new(80, 64);
        let mut log = HistoryLog::new();
        commit_all(&mut log, &mut buf, &c, &sample_ops());
        log.clear(&mut buf);
        assert!(log.is_empty());
        assert_eq!(log.cursor(), None);
        assert!(buf.is_clear());
    }

    #[test]
    fn test_degenerate_operations() {
        assert!(stroke(MaskMode::Paint, 0, &[(1.0, 1.0)]).is_degenerate());
        assert!(rect(MaskMode::Paint, 4.0, 4.0, 0.0, 9.0).is_degenerate());
        assert!(!rect(MaskMode::Erase, 4.0, 4.0, -3.0, 9.0).is_degenerate());
    }
}
