//! End-to-end session tests through the public API: load from disk, draw with
//! display-space pointer events, undo/redo, and export to PNG.

use image::{Rgba, RgbaImage};
use maskfe::io::{decode_image_bytes, decode_image_file, encode_mask_png, write_mask_png};
use maskfe::{DisplayRect, LoadOutcome, MaskError, MaskEvent, MaskSession, ToolMode};

const MASK_RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

fn write_source(dir: &std::path::Path, w: u32, h: u32) -> std::path::PathBuf {
    let path = dir.join("source.png");
    RgbaImage::from_pixel(w, h, Rgba([40, 80, 120, 255])).save(&path).unwrap();
    path
}

#[test]
fn test_full_masking_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), 100, 50);

    let mut session = MaskSession::default();
    let generation = session.begin_load();
    let outcome = session.finish_load(generation, decode_image_file(&source)).unwrap();
    assert_eq!(outcome, LoadOutcome::Loaded { width: 100, height: 50 });

    // Image shown at twice its size, offset inside the window.
    session.set_display_rect(DisplayRect::new(10.0, 20.0, 200.0, 100.0));

    let events = [
        MaskEvent::SetToolMode(ToolMode::RectPaint),
        MaskEvent::PointerDown { x: 30.0, y: 40.0 },
        MaskEvent::PointerMove { x: 90.0, y: 80.0 },
        MaskEvent::PointerUp { x: 90.0, y: 80.0 },
        MaskEvent::SetToolMode(ToolMode::Erase),
        MaskEvent::SetBrushSize(4),
        MaskEvent::PointerDown { x: 50.0, y: 60.0 },
        MaskEvent::PointerUp { x: 50.0, y: 60.0 },
    ];
    for event in events {
        session.handle(event).unwrap();
    }

    // Rectangle covers raster [10, 40) x [10, 30); the tap erased around (20, 20).
    let mask = session.export_mask().unwrap();
    assert_eq!(*mask.get_pixel(35, 25), MASK_RED);
    assert_eq!(mask.get_pixel(20, 20)[3], 0);
    assert_eq!(mask.get_pixel(50, 40)[3], 0);

    let out = dir.path().join("mask.png");
    write_mask_png(&mask, &out).unwrap();
    let reloaded = decode_image_file(&out).unwrap();
    assert_eq!(reloaded.pixels.as_raw(), mask.as_raw());

    // Undo both edits, then redo them: bit-identical to what was exported.
    assert_eq!(session.undo().unwrap(), "Erase Stroke");
    assert_eq!(session.undo().unwrap(), "Paint Rectangle");
    assert!(matches!(session.undo(), Err(MaskError::NothingToUndo)));
    assert!(session.export_mask().unwrap().pixels().all(|p| p[3] == 0));
    session.redo().unwrap();
    session.redo().unwrap();
    assert_eq!(session.export_mask().unwrap().as_raw(), mask.as_raw());
}

#[test]
fn test_replacing_image_resets_history() {
    let mut session = MaskSession::default();
    let first = encode_mask_png(&RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 255]))).unwrap();
    session.load_image(decode_image_bytes(&first, "first").unwrap());
    session.pointer_down(5.0, 5.0);
    session.pointer_up(5.0, 5.0);
    let first_id = session.image().map(|img| img.id);

    let second = encode_mask_png(&RgbaImage::new(8, 12)).unwrap();
    let generation = session.begin_load();
    session
        .finish_load(generation, decode_image_bytes(&second, "second"))
        .unwrap();

    let img = session.image().unwrap();
    assert_ne!(Some(img.id), first_id);
    assert_eq!(img.dimensions(), (8, 12));
    assert!(img.history().is_empty());
    assert!(matches!(session.redo(), Err(MaskError::NothingToRedo)));
}

#[test]
fn test_malformed_upload_is_rejected_without_side_effects() {
    let mut session = MaskSession::default();
    let generation = session.begin_load();
    let err = session
        .finish_load(generation, decode_image_bytes(b"\x89PNG garbage", "broken"))
        .unwrap_err();
    assert!(matches!(err, MaskError::Decode(_)));
    assert!(!session.has_image());
    assert!(!session.is_loading());
    assert!(matches!(session.export_mask(), Err(MaskError::NoImage)));
}
