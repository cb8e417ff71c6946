//! MaskFE: paint a binary mask over an image with brush and rectangle tools,
//! undo and redo through an operation log, and export the mask as PNG.

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod session;
pub mod settings;

pub use canvas::{DisplayRect, RasterBuffer, RasterPoint};
pub use components::history::{HistoryLog, MaskOperation};
pub use components::tools::{MaskMode, ToolMode, ToolState};
pub use error::{MaskError, MaskResult};
pub use io::DecodedImage;
pub use ops::compositor::Compositor;
pub use session::{LoadOutcome, MaskEvent, MaskSession};
