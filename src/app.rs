use crate::canvas::DisplayRect;
use crate::components::tools::{ToolMode, coerce_brush_size};
use crate::error::MaskResult;
use crate::io::{
    DecodedImage, FileHandler, MASK_FILE_NAME, decode_image_bytes, decode_image_file,
    is_supported_image, write_mask_png,
};
use crate::session::{LoadOutcome, MaskSession};
use crate::settings::MaskSettings;
use crate::{log_err, log_info};
use eframe::egui;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::mpsc;
use uuid::Uuid;

// ============================================================================
// ASYNC IO PIPELINE - background image loading / exporting
// ============================================================================

/// Result delivered from a background IO thread.
pub enum IoResult {
    /// A decode finished. `generation` is the token handed out by
    /// `MaskSession::begin_load`; stale generations are dropped by the session.
    Decoded {
        generation: u64,
        result: MaskResult<DecodedImage>,
    },
    /// The mask PNG was written.
    ExportComplete(PathBuf),
    /// Encoding or writing the mask failed.
    ExportFailed(String),
}

/// Source texture plus the id of the image it was uploaded from.
struct SourceTexture {
    image_id: Uuid,
    handle: egui::TextureHandle,
}

/// Mask texture plus the buffer revision it mirrors.
struct MaskTexture {
    image_id: Uuid,
    revision: u64,
    handle: egui::TextureHandle,
}

pub struct MaskApp {
    session: MaskSession,
    settings: MaskSettings,
    file_handler: FileHandler,

    // Async IO
    io_sender: mpsc::Sender<IoResult>,
    io_receiver: mpsc::Receiver<IoResult>,

    // GPU textures mirrored from the session
    source_texture: Option<SourceTexture>,
    mask_texture: Option<MaskTexture>,

    /// Pointer is down on the canvas and feeding the current gesture.
    pointer_captured: bool,
    /// Slider value mirrors the session's brush size.
    brush_size: u32,
    /// Last notice or error shown in the status bar.
    status: Option<String>,
}

impl MaskApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = MaskSettings::load();
        let (io_sender, io_receiver) = mpsc::channel();
        Self {
            session: MaskSession::from_settings(&settings),
            brush_size: settings.default_brush_size,
            settings,
            file_handler: FileHandler::new(),
            io_sender,
            io_receiver,
            source_texture: None,
            mask_texture: None,
            pointer_captured: false,
            status: None,
        }
    }

    /// Show the outcome of a session call in the status bar.
    fn report<T>(&mut self, result: MaskResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                if !e.is_notice() {
                    log_err!("{}", e);
                }
                self.status = Some(e.to_string());
                None
            }
        }
    }

    // ========================================================================
    // LOADING & EXPORT
    // ========================================================================

    fn open_dialog(&mut self, ctx: &egui::Context) {
        if let Some(path) = self.file_handler.pick_image_path() {
            self.load_path(ctx, path);
        }
    }

    fn load_path(&mut self, ctx: &egui::Context, path: PathBuf) {
        self.pointer_captured = false;
        let generation = self.session.begin_load();
        self.status = Some(format!("Loading {}…", path.display()));
        log_info!("Decoding {} (generation {})", path.display(), generation);
        let sender = self.io_sender.clone();
        let ctx = ctx.clone();
        rayon::spawn(move || {
            let result = decode_image_file(&path);
            let _ = sender.send(IoResult::Decoded { generation, result });
            ctx.request_repaint();
        });
    }

    fn load_bytes(&mut self, ctx: &egui::Context, bytes: std::sync::Arc<[u8]>, name: String) {
        self.pointer_captured = false;
        let generation = self.session.begin_load();
        self.status = Some(format!("Loading {}…", name));
        let sender = self.io_sender.clone();
        let ctx = ctx.clone();
        rayon::spawn(move || {
            let result = decode_image_bytes(&bytes, &name);
            let _ = sender.send(IoResult::Decoded { generation, result });
            ctx.request_repaint();
        });
    }

    fn export(&mut self, ctx: &egui::Context) {
        let exported = self.session.export_mask();
        let Some(mask) = self.report(exported) else { return };
        let suggested = self
            .session
            .image()
            .map(|img| format!("{}_mask.png", img.name))
            .unwrap_or_else(|| MASK_FILE_NAME.to_string());
        let Some(path) = self.file_handler.pick_export_path(&suggested) else { return };
        self.spawn_export(ctx, mask, path);
    }

    fn spawn_export(&self, ctx: &egui::Context, mask: RgbaImage, path: PathBuf) {
        let sender = self.io_sender.clone();
        let ctx = ctx.clone();
        rayon::spawn(move || {
            let msg = match write_mask_png(&mask, &path) {
                Ok(()) => IoResult::ExportComplete(path),
                Err(e) => IoResult::ExportFailed(e.to_string()),
            };
            let _ = sender.send(msg);
            ctx.request_repaint();
        });
    }

    fn poll_io(&mut self) {
        while let Ok(msg) = self.io_receiver.try_recv() {
            match msg {
                IoResult::Decoded { generation, result } => {
                    match self.session.finish_load(generation, result) {
                        Ok(LoadOutcome::Loaded { width, height }) => {
                            self.status = Some(format!("Loaded {}×{}", width, height));
                        }
                        Ok(LoadOutcome::Discarded) => {}
                        Err(e) => {
                            self.status = Some(e.to_string());
                        }
                    }
                }
                IoResult::ExportComplete(path) => {
                    log_info!("Exported mask to {}", path.display());
                    self.status = Some(format!("Mask saved to {}", path.display()));
                }
                IoResult::ExportFailed(error) => {
                    log_err!("Export failed: {}", error);
                    self.status = Some(format!("Export failed: {}", error));
                }
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped: Vec<egui::DroppedFile> = ctx.input(|i| i.raw.dropped_files.clone());
        // Only the last file counts; earlier ones would be superseded anyway.
        let Some(file) = dropped.into_iter().last() else { return };
        if let Some(path) = file.path {
            if is_supported_image(&path) {
                self.load_path(ctx, path);
            } else {
                self.status = Some(format!("Unsupported file: {}", path.display()));
            }
        } else if let Some(bytes) = file.bytes {
            self.load_bytes(ctx, bytes, file.name);
        }
    }

    // ========================================================================
    // INPUT
    // ========================================================================

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (undo, redo) = ctx.input(|i| {
            let cmd = i.modifiers.command;
            let undo = cmd && !i.modifiers.shift && i.key_pressed(egui::Key::Z);
            let redo = cmd && (i.key_pressed(egui::Key::Y) || (i.modifiers.shift && i.key_pressed(egui::Key::Z)));
            (undo, redo)
        });
        if undo {
            self.pointer_captured = false;
            let r = self.session.undo();
            self.report(r);
        } else if redo {
            self.pointer_captured = false;
            let r = self.session.redo();
            self.report(r);
        }
    }

    // ========================================================================
    // PANELS
    // ========================================================================

    fn persist_tool_defaults(&mut self) {
        self.settings.default_tool = self.session.tool().mode();
        self.settings.default_brush_size = self.session.tool().size();
        self.settings.save();
    }

    fn show_toolbar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                if ui.button("Open…").clicked() {
                    self.open_dialog(ctx);
                }
                ui.separator();

                let current = self.session.tool().mode();
                for &mode in ToolMode::all() {
                    if ui.selectable_label(current == mode, mode.label()).clicked() && current != mode {
                        self.session.set_tool_mode(mode);
                        self.persist_tool_defaults();
                    }
                }

                let max = self.settings.max_brush_size.max(1);
                let slider = ui.add(egui::Slider::new(&mut self.brush_size, 0..=max).text("Size"));
                if slider.changed() {
                    self.session.set_brush_size(coerce_brush_size(self.brush_size as i64));
                }
                if slider.drag_released() || slider.lost_focus() {
                    self.persist_tool_defaults();
                }
                ui.separator();

                let (can_undo, can_redo) = self
                    .session
                    .image()
                    .map(|img| (img.history().can_undo(), img.history().can_redo()))
                    .unwrap_or((false, false));
                let (undo_hint, redo_hint) = self
                    .session
                    .image()
                    .map(|img| (img.history().undo_description(), img.history().redo_description()))
                    .unwrap_or((None, None));
                let undo = ui.add_enabled(can_undo, egui::Button::new("Undo"));
                let undo = match undo_hint {
                    Some(hint) => undo.on_hover_text(format!("Undo {} (Ctrl+Z)", hint)),
                    None => undo,
                };
                if undo.clicked() {
                    let r = self.session.undo();
                    self.report(r);
                }
                let redo = ui.add_enabled(can_redo, egui::Button::new("Redo"));
                let redo = match redo_hint {
                    Some(hint) => redo.on_hover_text(format!("Redo {} (Ctrl+Y)", hint)),
                    None => redo,
                };
                if redo.clicked() {
                    let r = self.session.redo();
                    self.report(r);
                }
                if ui.button("Clear Mask").clicked() {
                    let r = self.session.clear_mask();
                    self.report(r);
                }
                ui.separator();

                if ui.button("Close Image").clicked() {
                    self.pointer_captured = false;
                    self.session.clear_image();
                    self.status = None;
                }
                if ui.button("Export Mask").clicked() {
                    self.export(ctx);
                }
            });
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match self.session.image() {
                    Some(img) => {
                        let (w, h) = img.dimensions();
                        ui.label(format!("{}  {}×{}", img.name, w, h));
                    }
                    None if self.session.is_loading() => {
                        ui.spinner();
                    }
                    None => {
                        ui.label("No image");
                    }
                }
                if let Some(status) = &self.status {
                    ui.separator();
                    ui.label(status.as_str());
                }
            });
        });
    }

    fn show_history(&mut self, ctx: &egui::Context) {
        let Some(img) = self.session.image() else { return };
        let entries = img.history().undo_history();
        let undo_count = img.history().undo_count();
        let redo_count = img.history().redo_count();
        let memory = img.history().memory_usage();

        let mut revert_steps = None;
        egui::SidePanel::right("history").resizable(false).show(ctx, |ui| {
            ui.heading("History");
            ui.label(format!("{} steps, {:.1} KB", undo_count, memory as f64 / 1024.0));
            if redo_count > 0 {
                ui.weak(format!("{} undone", redo_count));
            }
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                for (steps_back, entry) in entries.iter().enumerate() {
                    if ui.selectable_label(steps_back == 0, entry.as_str()).clicked() && steps_back > 0 {
                        revert_steps = Some(steps_back);
                    }
                }
            });
        });
        if let Some(steps) = revert_steps {
            let r = self.session.undo_to(steps);
            self.report(r);
        }
    }

    // ========================================================================
    // CANVAS
    // ========================================================================

    fn sync_textures(&mut self, ctx: &egui::Context) {
        let Some(img) = self.session.image() else {
            self.source_texture = None;
            self.mask_texture = None;
            return;
        };
        let (w, h) = img.dimensions();
        let size = [w as usize, h as usize];

        if self.source_texture.as_ref().is_none_or(|t| t.image_id != img.id) {
            let color = egui::ColorImage::from_rgba_unmultiplied(size, img.source().as_raw());
            self.source_texture = Some(SourceTexture {
                image_id: img.id,
                handle: ctx.load_texture("source", color, egui::TextureOptions::LINEAR),
            });
        }

        let revision = img.mask().revision();
        let current = self
            .mask_texture
            .as_ref()
            .map(|t| (t.image_id == img.id, t.revision == revision));
        match current {
            Some((true, true)) => {}
            Some((true, false)) => {
                if let Some(t) = &mut self.mask_texture {
                    let color = egui::ColorImage::from_rgba_unmultiplied(size, img.mask().as_raw());
                    t.handle.set(color, egui::TextureOptions::NEAREST);
                    t.revision = revision;
                }
            }
            _ => {
                let color = egui::ColorImage::from_rgba_unmultiplied(size, img.mask().as_raw());
                self.mask_texture = Some(MaskTexture {
                    image_id: img.id,
                    revision,
                    handle: ctx.load_texture("mask", color, egui::TextureOptions::NEAREST),
                });
            }
        }
    }

    fn show_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let (area, _response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());

            let Some((w, h)) = self.session.image().map(|img| img.dimensions()) else {
                let hovering = ctx.input(|i| !i.raw.hovered_files.is_empty());
                let stroke_color = if hovering {
                    ui.visuals().selection.stroke.color
                } else {
                    ui.visuals().weak_text_color()
                };
                ui.painter().rect_stroke(area.shrink(16.0), 8.0, egui::Stroke::new(2.0, stroke_color));
                let hint = if self.session.is_loading() {
                    "Loading…"
                } else {
                    "Drop an image here or click Open"
                };
                ui.painter().text(
                    area.center(),
                    egui::Align2::CENTER_CENTER,
                    hint,
                    egui::FontId::proportional(18.0),
                    ui.visuals().text_color(),
                );
                return;
            };

            // Letterbox the image into the available area.
            let scale = (area.width() / w as f32).min(area.height() / h as f32);
            let image_rect =
                egui::Rect::from_center_size(area.center(), egui::vec2(w as f32 * scale, h as f32 * scale));
            let display_rect = DisplayRect::new(
                image_rect.left(),
                image_rect.top(),
                image_rect.width(),
                image_rect.height(),
            );
            self.session.set_display_rect(display_rect);
            let events = ctx.input(|i| i.events.clone());
            self.pointer_captured =
                feed_pointer_events(&mut self.session, &events, display_rect, self.pointer_captured);
            self.sync_textures(ctx);

            let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            if let Some(t) = &self.source_texture {
                ui.painter().image(t.handle.id(), image_rect, uv, egui::Color32::WHITE);
            }
            if let Some(t) = &self.mask_texture {
                let alpha = (self.settings.overlay_opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
                ui.painter().image(t.handle.id(), image_rect, uv, egui::Color32::from_white_alpha(alpha));
            }
        });
    }
}

// ============================================================================
// POINTER EVENTS
// ============================================================================

/// Forward this frame's raw pointer events to the session, in arrival order.
/// Every sub-frame `PointerMoved` becomes a `pointer_move`, so fast drags keep
/// their full path. Returns whether the pointer is still captured afterwards.
fn feed_pointer_events(
    session: &mut MaskSession,
    events: &[egui::Event],
    image_rect: DisplayRect,
    mut captured: bool,
) -> bool {
    let mut last = egui::pos2(
        image_rect.left + image_rect.width * 0.5,
        image_rect.top + image_rect.height * 0.5,
    );
    for event in events {
        match event {
            egui::Event::PointerButton {
                pos,
                button: egui::PointerButton::Primary,
                pressed,
                ..
            } => {
                last = *pos;
                if *pressed {
                    if !captured
                        && image_rect.contains(pos.x, pos.y)
                        && session.has_image()
                        && !session.is_loading()
                    {
                        session.pointer_down(pos.x, pos.y);
                        captured = true;
                    }
                } else if captured {
                    session.pointer_up(pos.x, pos.y);
                    captured = false;
                }
            }
            egui::Event::PointerMoved(pos) => {
                last = *pos;
                if !captured {
                    continue;
                }
                if image_rect.contains(pos.x, pos.y) {
                    session.pointer_move(pos.x, pos.y);
                } else {
                    session.pointer_leave(pos.x, pos.y);
                    captured = false;
                }
            }
            egui::Event::PointerGone if captured => {
                session.pointer_leave(last.x, last.y);
                captured = false;
            }
            _ => {}
        }
    }
    captured
}

impl eframe::App for MaskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let title = match self.session.image() {
            Some(img) => format!("MaskFE - {}", img.name),
            None => "MaskFE".to_string(),
        };
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        self.poll_io();
        self.handle_dropped_files(ctx);
        self.handle_shortcuts(ctx);

        self.show_toolbar(ctx);
        self.show_status_bar(ctx);
        self.show_history(ctx);
        self.show_canvas(ctx);
    }
}
