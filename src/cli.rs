// ============================================================================
// MaskFE CLI - headless mask rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   maskfe -i photo.png --op "stroke:paint:20:50,50;80,60" -o mask.png
//   maskfe -i photo.png --op "rect:paint:10,10,40,30" --op "rect:erase:20,15,5,5" -o mask.png
//   maskfe -i "shots/*.jpg" --op "rect:paint:0,0,64,64" --output-dir masks/
//
// No window is opened in CLI mode. Each input gets a fresh session, the
// operations are committed in order, and the mask is written as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::RasterPoint;
use crate::components::history::MaskOperation;
use crate::components::tools::MaskMode;
use crate::error::{MaskError, MaskResult};
use crate::io::{decode_image_file, is_supported_image, write_mask_png};
use crate::session::MaskSession;
use crate::settings::MaskSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// MaskFE headless mask renderer.
#[derive(Parser, Debug)]
#[command(
    name = "maskfe",
    about = "MaskFE headless mask renderer",
    long_about = "Replay mask operations onto images and export the masks as PNG\n\
                  without opening the GUI.\n\n\
                  Operations:\n  \
                  stroke:<paint|erase>:<width>:<x,y>[;<x,y>...]\n  \
                  rect:<paint|erase>:<x>,<y>,<w>,<h>\n\n\
                  Example:\n  \
                  maskfe -i photo.png --op \"stroke:paint:20:50,50;80,60\" -o mask.png"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Mask operation, in raster coordinates. Repeat to apply several in order.
    #[arg(long = "op", value_name = "OP")]
    pub ops: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing. Masks are written as `<stem>_mask.png`.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print per-file timing and mirror the session log to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = bad arguments or one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo_stderr(args.verbose);

    let ops = match args.ops.iter().map(|s| parse_operation(s)).collect::<MaskResult<Vec<_>>>() {
        Ok(ops) => ops,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let settings = MaskSettings::load();
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&settings, input_path, &output_path, &ops) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(settings: &MaskSettings, input: &Path, output: &Path, ops: &[MaskOperation]) -> MaskResult<()> {
    let mut session = MaskSession::from_settings(settings);
    session.load_image(decode_image_file(input)?);
    for op in ops {
        session.commit(op.clone())?;
    }
    let mask = session.export_mask()?;
    write_mask_png(&mask, output)?;
    crate::log_info!("Exported mask to {}", output.display());
    Ok(())
}

// ============================================================================
// Operation parsing
// ============================================================================

fn invalid(input: &str, reason: impl Into<String>) -> MaskError {
    MaskError::InvalidOperation {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn parse_mode(input: &str, s: &str) -> MaskResult<MaskMode> {
    match s.trim().to_lowercase().as_str() {
        "paint" | "mask" => Ok(MaskMode::Paint),
        "erase" | "unmask" => Ok(MaskMode::Erase),
        other => Err(invalid(input, format!("unknown mode '{}'", other))),
    }
}

fn parse_numbers(input: &str, s: &str, expected: usize) -> MaskResult<Vec<f32>> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f32>().map_err(|_| invalid(input, format!("'{}' is not a number", v.trim()))))
        .collect::<MaskResult<Vec<f32>>>()?;
    if values.len() != expected {
        return Err(invalid(input, format!("expected {} numbers, got {}", expected, values.len())));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid(input, "coordinates must be finite"));
    }
    Ok(values)
}

/// Parse one `--op` argument into a committed operation.
pub fn parse_operation(input: &str) -> MaskResult<MaskOperation> {
    let parts: Vec<&str> = input.split(':').collect();
    match parts.first().map(|k| k.trim().to_lowercase()).as_deref() {
        Some("stroke") => {
            let [_, mode, width, points] = parts[..] else {
                return Err(invalid(input, "expected stroke:<mode>:<width>:<x,y>[;<x,y>...]"));
            };
            let mode = parse_mode(input, mode)?;
            let width = width
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid(input, format!("'{}' is not a brush width", width.trim())))?;
            let points = points
                .split(';')
                .filter(|p| !p.trim().is_empty())
                .map(|p| parse_numbers(input, p, 2).map(|v| RasterPoint::new(v[0], v[1])))
                .collect::<MaskResult<Vec<_>>>()?;
            if points.is_empty() {
                return Err(invalid(input, "a stroke needs at least one point"));
            }
            Ok(MaskOperation::Stroke { mode, width, points })
        }
        Some("rect") => {
            let [_, mode, geometry] = parts[..] else {
                return Err(invalid(input, "expected rect:<mode>:<x>,<y>,<w>,<h>"));
            };
            let mode = parse_mode(input, mode)?;
            let v = parse_numbers(input, geometry, 4)?;
            Ok(MaskOperation::Rectangle {
                mode,
                x: v[0],
                y: v[1],
                width: v[2],
                height: v[3],
            })
        }
        _ => Err(invalid(input, "operation must start with 'stroke' or 'rect'")),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
/// Only files with a supported image extension are kept.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !as_path.is_file() || !is_supported_image(as_path) {
                eprintln!("warning: skipping '{}': not a supported image file.", pattern);
            } else if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !entry.is_file() || !is_supported_image(&entry) {
                        continue;
                    }
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no image files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the mask path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (`<dir>/<stem>_mask.png`)
/// 3. Fallback: `<stem>_mask.png` next to the input
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    let file_name = format!("{}_mask.png", stem);
    match output_dir {
        Some(dir) => Some(dir.join(file_name)),
        None => Some(input.parent().unwrap_or(Path::new(".")).join(file_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use rstest::rstest;

    #[rstest]
    #[case("stroke:paint:20:50,50", MaskOperation::Stroke {
        mode: MaskMode::Paint,
        width: 20,
        points: vec![RasterPoint::new(50.0, 50.0)],
    })]
    #[case("stroke:erase:3:1,2;3.5,4", MaskOperation::Stroke {
        mode: MaskMode::Erase,
        width: 3,
        points: vec![RasterPoint::new(1.0, 2.0), RasterPoint::new(3.5, 4.0)],
    })]
    #[case("rect:paint:10,10,-20,5", MaskOperation::Rectangle {
        mode: MaskMode::Paint, x: 10.0, y: 10.0, width: -20.0, height: 5.0,
    })]
    #[case("RECT:Unmask:0,0,4,4", MaskOperation::Rectangle {
        mode: MaskMode::Erase, x: 0.0, y: 0.0, width: 4.0, height: 4.0,
    })]
    fn test_parse_operation(#[case] input: &str, #[case] expected: MaskOperation) {
        assert_eq!(parse_operation(input).unwrap(), expected);
    }

    #[rstest]
    #[case("lasso:paint:1,1")]
    #[case("stroke:paint:-1:1,1")]
    #[case("stroke:blur:4:1,1")]
    #[case("stroke:paint:4:")]
    #[case("rect:paint:1,2,3")]
    #[case("rect:paint:a,b,c,d")]
    #[case("rect:paint:1,2,3,4:extra")]
    fn test_parse_operation_rejects(#[case] input: &str) {
        assert!(matches!(parse_operation(input), Err(MaskError::InvalidOperation { .. })));
    }

    #[test]
    fn test_build_output_path() {
        let input = Path::new("shots/cat.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), None),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out"))),
            Some(PathBuf::from("out/cat_mask.png"))
        );
        assert_eq!(
            build_output_path(input, None, None),
            Some(PathBuf::from("shots/cat_mask.png"))
        );
    }

    #[test]
    fn test_run_writes_mask_for_each_input() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.png"] {
            RgbaImage::from_pixel(30, 20, Rgba([9, 9, 9, 255]))
                .save(dir.path().join(name))
                .unwrap();
        }
        let out_dir = dir.path().join("masks");
        let args = CliArgs {
            input: vec![dir.path().join("*.png").to_string_lossy().into_owned()],
            ops: vec!["rect:paint:0,0,10,10".into(), "stroke:erase:2:5,5".into()],
            output: None,
            output_dir: Some(out_dir.clone()),
            verbose: false,
        };
        assert_eq!(run(args), ExitCode::SUCCESS);

        let mask = image::open(out_dir.join("a_mask.png")).unwrap().to_rgba8();
        assert_eq!(mask.dimensions(), (30, 20));
        assert_eq!(mask.get_pixel(8, 2)[3], 255);
        assert_eq!(mask.get_pixel(5, 5)[3], 0);
        assert_eq!(mask.get_pixel(20, 15)[3], 0);
        assert!(out_dir.join("b_mask.png").exists());
    }

    #[test]
    fn test_resolve_inputs_skips_unsupported_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255]))
            .save(dir.path().join("a.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
        std::fs::create_dir(dir.path().join("sub.png")).unwrap();

        let pattern = dir.path().join("*").to_string_lossy().into_owned();
        assert_eq!(resolve_inputs(&[pattern]), vec![dir.path().join("a.png")]);

        let literal = dir.path().join("notes.txt").to_string_lossy().into_owned();
        assert!(resolve_inputs(&[literal]).is_empty());
    }

    #[test]
    fn test_run_fails_on_bad_operation() {
        let args = CliArgs {
            input: vec!["does-not-matter.png".into()],
            ops: vec!["circle:paint:1,1".into()],
            output: None,
            output_dir: None,
            verbose: false,
        };
        assert_eq!(run(args), ExitCode::FAILURE);
    }
}
