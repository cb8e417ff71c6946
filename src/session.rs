use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{DisplayRect, RasterBuffer, RasterPoint, display_to_raster};
use crate::components::history::{HistoryLog, MaskOperation};
use crate::components::tools::{GestureState, ToolMode, ToolState};
use crate::error::{MaskError, MaskResult};
use crate::io::DecodedImage;
use crate::ops::compositor::Compositor;
use crate::settings::MaskSettings;
use crate::{log_err, log_info, log_warn};

/// The image currently being masked. Buffer and history live and die together.
pub struct LoadedImage {
    pub id: Uuid,
    pub name: String,
    source: RgbaImage,
    buffer: RasterBuffer,
    history: HistoryLog,
}

impl LoadedImage {
    fn new(decoded: DecodedImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: decoded.name,
            buffer: RasterBuffer::new(decoded.width, decoded.height),
            source: decoded.pixels,
            history: HistoryLog::new(),
        }
    }

    pub fn source(&self) -> &RgbaImage {
        &self.source
    }

    pub fn mask(&self) -> &RasterBuffer {
        &self.buffer
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.buffer.width(), self.buffer.height())
    }
}

/// What became of a finished background decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { width: u32, height: u32 },
    /// A newer load or a clear superseded this one.
    Discarded,
}

/// Input events accepted by [`MaskSession::handle`]. Pointer coordinates are
/// in display space.
#[derive(Clone, Debug)]
pub enum MaskEvent {
    LoadImage(DecodedImage),
    ClearImage,
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    PointerLeave { x: f32, y: f32 },
    SetToolMode(ToolMode),
    SetBrushSize(u32),
    Undo,
    Redo,
    ClearMask,
}

// ============================================================================
// MASK SESSION
// ============================================================================

/// One masking session: tool state, the loaded image with its mask buffer and
/// operation log, and the in-progress pointer gesture.
pub struct MaskSession {
    compositor: Compositor,
    tool: ToolState,
    display_rect: Option<DisplayRect>,
    image: Option<LoadedImage>,
    gesture: GestureState,
    load_generation: u64,
    pending_load: Option<u64>,
}

impl Default for MaskSession {
    fn default() -> Self {
        Self::new(Compositor::default(), ToolState::default())
    }
}

impl MaskSession {
    pub fn new(compositor: Compositor, tool: ToolState) -> Self {
        Self {
            compositor,
            tool,
            display_rect: None,
            image: None,
            gesture: GestureState::Idle,
            load_generation: 0,
            pending_load: None,
        }
    }

    pub fn from_settings(settings: &MaskSettings) -> Self {
        Self::new(
            settings.compositor(),
            ToolState::new(settings.default_tool, settings.default_brush_size),
        )
    }

    /// Dispatch one input event.
    pub fn handle(&mut self, event: MaskEvent) -> MaskResult<()> {
        match event {
            MaskEvent::LoadImage(decoded) => self.load_image(decoded),
            MaskEvent::ClearImage => self.clear_image(),
            MaskEvent::PointerDown { x, y } => self.pointer_down(x, y),
            MaskEvent::PointerMove { x, y } => self.pointer_move(x, y),
            MaskEvent::PointerUp { x, y } => self.pointer_up(x, y),
            MaskEvent::PointerLeave { x, y } => self.pointer_leave(x, y),
            MaskEvent::SetToolMode(mode) => self.set_tool_mode(mode),
            MaskEvent::SetBrushSize(size) => self.set_brush_size(size),
            MaskEvent::Undo => return self.undo().map(|_| ()),
            MaskEvent::Redo => return self.redo().map(|_| ()),
            MaskEvent::ClearMask => return self.clear_mask(),
        }
        Ok(())
    }

    // ========================================================================
    // IMAGE LIFECYCLE
    // ========================================================================

    /// Start an asynchronous load. Returns the generation the completion must
    /// carry; any earlier pending load becomes stale.
    pub fn begin_load(&mut self) -> u64 {
        self.finish_gesture();
        self.load_generation += 1;
        self.pending_load = Some(self.load_generation);
        self.load_generation
    }

    /// Deliver the result of a load started with `begin_load`.
    ///
    /// Stale generations are dropped. A failed decode clears the pending flag
    /// and leaves the current image untouched.
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: MaskResult<DecodedImage>,
    ) -> MaskResult<LoadOutcome> {
        if self.pending_load != Some(generation) {
            log_warn!(
                "Discarding stale image load (generation {}, latest {})",
                generation,
                self.load_generation
            );
            return Ok(LoadOutcome::Discarded);
        }
        self.pending_load = None;
        match result {
            Ok(decoded) => {
                let (width, height) = (decoded.width, decoded.height);
                self.install(decoded);
                Ok(LoadOutcome::Loaded { width, height })
            }
            Err(e) => {
                log_err!("Image load failed: {}", e);
                Err(e)
            }
        }
    }

    /// Synchronous load. Supersedes any pending background load.
    pub fn load_image(&mut self, decoded: DecodedImage) {
        self.load_generation += 1;
        self.pending_load = None;
        self.install(decoded);
    }

    fn install(&mut self, decoded: DecodedImage) {
        self.gesture = GestureState::Idle;
        self.display_rect = None;
        let loaded = LoadedImage::new(decoded);
        log_info!(
            "Loaded image '{}' ({}x{}) as session {}",
            loaded.name,
            loaded.buffer.width(),
            loaded.buffer.height(),
            loaded.id
        );
        self.image = Some(loaded);
    }

    /// Drop the image, its mask and history. Pending loads are invalidated.
    pub fn clear_image(&mut self) {
        self.load_generation += 1;
        self.pending_load = None;
        self.gesture = GestureState::Idle;
        self.display_rect = None;
        if let Some(old) = self.image.take() {
            log_info!("Closed image '{}' (session {})", old.name, old.id);
        }
    }

    // ========================================================================
    // VIEWPORT & TOOL
    // ========================================================================

    /// Where the front end currently draws the image. Until set, display and
    /// raster space coincide.
    pub fn set_display_rect(&mut self, rect: DisplayRect) {
        self.display_rect = Some(rect);
    }

    pub fn set_tool_mode(&mut self, mode: ToolMode) {
        self.tool.set_mode(mode);
    }

    pub fn set_brush_size(&mut self, size: u32) {
        self.tool.set_size(size);
    }

    /// Map a display-space point, or `None` when there is nothing to draw on.
    fn to_raster(&self, x: f32, y: f32) -> Option<RasterPoint> {
        if self.pending_load.is_some() {
            return None;
        }
        let (w, h) = self.image.as_ref()?.dimensions();
        let rect = self.display_rect.unwrap_or_else(|| DisplayRect::identity(w, h));
        Some(display_to_raster(x, y, rect, w, h))
    }

    // ========================================================================
    // POINTER INPUT
    // ========================================================================

    pub fn pointer_down(&mut self, x: f32, y: f32) {
        let Some(at) = self.to_raster(x, y) else { return };
        self.finish_gesture();
        self.gesture = GestureState::begin(&self.tool, at);

        let Self { image, gesture, compositor, .. } = self;
        let Some(img) = image.as_mut() else { return };
        if let GestureState::Drawing { mode, width, .. } = gesture {
            compositor.stamp(&mut img.buffer, at, *width, *mode);
        }
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) {
        if !self.gesture.is_active() {
            return;
        }
        let Some(at) = self.to_raster(x, y) else { return };
        let prev = self.gesture.advance(at);

        let Self { image, gesture, compositor, .. } = self;
        let Some(img) = image.as_mut() else { return };
        match gesture {
            GestureState::Drawing { mode, width, .. } => {
                if let Some(prev) = prev {
                    compositor.stroke_segment(&mut img.buffer, prev, at, *width, *mode);
                }
            }
            GestureState::Previewing { anchor, current, .. } => {
                img.history.replay(&mut img.buffer, compositor);
                compositor.render_rect_preview(&mut img.buffer, *anchor, *current);
            }
            GestureState::Idle => {}
        }
    }

    pub fn pointer_up(&mut self, x: f32, y: f32) {
        if let GestureState::Previewing { .. } = self.gesture
            && let Some(at) = self.to_raster(x, y)
        {
            self.gesture.advance(at);
        }
        self.finish_gesture();
    }

    /// Leaving the canvas ends the gesture exactly like releasing the button.
    pub fn pointer_leave(&mut self, x: f32, y: f32) {
        self.pointer_up(x, y);
    }

    /// Commit the in-progress gesture, if any.
    fn finish_gesture(&mut self) {
        let Some(op) = self.gesture.finish() else { return };
        let Some(img) = self.image.as_mut() else { return };
        if let MaskOperation::Rectangle { .. } = op {
            // Drop the dashed preview before drawing the committed rectangle.
            img.history.replay(&mut img.buffer, &self.compositor);
            self.compositor.render(&mut img.buffer, &op);
        }
        log_commit(&op);
        img.history.push(op);
    }

    /// Render and record a complete operation, bypassing pointer input.
    pub fn commit(&mut self, op: MaskOperation) -> MaskResult<()> {
        self.ensure_ready()?;
        self.finish_gesture();
        let img = self.image.as_mut().ok_or(MaskError::NoImage)?;
        self.compositor.render(&mut img.buffer, &op);
        log_commit(&op);
        img.history.push(op);
        Ok(())
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    fn ensure_ready(&self) -> MaskResult<()> {
        if self.pending_load.is_some() {
            return Err(MaskError::Loading);
        }
        if self.image.is_none() {
            return Err(MaskError::NoImage);
        }
        Ok(())
    }

    /// Undo the most recent operation. Returns its description.
    pub fn undo(&mut self) -> MaskResult<String> {
        self.ensure_ready()?;
        self.finish_gesture();
        let img = self.image.as_mut().ok_or(MaskError::NoImage)?;
        let description = img
            .history
            .undo(&mut img.buffer, &self.compositor)
            .ok_or(MaskError::NothingToUndo)?;
        log_info!("Undo: {}", description);
        Ok(description)
    }

    /// Redo the next operation of the redo branch. Returns its description.
    pub fn redo(&mut self) -> MaskResult<String> {
        self.ensure_ready()?;
        self.finish_gesture();
        let img = self.image.as_mut().ok_or(MaskError::NoImage)?;
        let description = img
            .history
            .redo(&mut img.buffer, &self.compositor)
            .ok_or(MaskError::NothingToRedo)?;
        log_info!("Redo: {}", description);
        Ok(description)
    }

    /// Undo `steps` operations at once (history panel).
    pub fn undo_to(&mut self, steps: usize) -> MaskResult<usize> {
        self.ensure_ready()?;
        self.finish_gesture();
        let img = self.image.as_mut().ok_or(MaskError::NoImage)?;
        match img.history.undo_to(steps, &mut img.buffer, &self.compositor) {
            0 => Err(MaskError::NothingToUndo),
            n => {
                log_info!("Undo {} steps", n);
                Ok(n)
            }
        }
    }

    /// Wipe the mask and forget its history.
    pub fn clear_mask(&mut self) -> MaskResult<()> {
        self.ensure_ready()?;
        self.finish_gesture();
        let img = self.image.as_mut().ok_or(MaskError::NoImage)?;
        img.history.clear(&mut img.buffer);
        log_info!("Mask cleared");
        Ok(())
    }

    // ========================================================================
    // EXPORT & ACCESSORS
    // ========================================================================

    /// The committed mask as an image. An in-progress gesture is not included.
    pub fn export_mask(&self) -> MaskResult<RgbaImage> {
        let img = self.image.as_ref().ok_or(MaskError::NoImage)?;
        if !self.gesture.is_active() {
            return Ok(img.buffer.to_image());
        }
        let (w, h) = img.dimensions();
        let mut scratch = RasterBuffer::new(w, h);
        img.history.replay(&mut scratch, &self.compositor);
        Ok(scratch.to_image())
    }

    pub fn image(&self) -> Option<&LoadedImage> {
        self.image.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_load.is_some()
    }

    pub fn tool(&self) -> &ToolState {
        &self.tool
    }

    pub fn gesture(&self) -> &GestureState {
        &self.gesture
    }
}

fn log_commit(op: &MaskOperation) {
    if op.is_degenerate() {
        log_info!("Commit: {} (no visible effect)", op.description());
    } else {
        log_info!("Commit: {}", op.description());
    }
}
