use thiserror::Error;

/// Errors surfaced by the mask session and its file collaborators.
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Please load an image first.")]
    NoImage,
    #[error("An image is still loading.")]
    Loading,
    #[error("Nothing to undo.")]
    NothingToUndo,
    #[error("Nothing to redo.")]
    NothingToRedo,
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Invalid operation '{input}': {reason}")]
    InvalidOperation { input: String, reason: String },
    #[error("Image encode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaskError {
    /// Precondition violations: shown to the user as a notice, nothing changed.
    pub fn is_notice(&self) -> bool {
        matches!(
            self,
            MaskError::NoImage | MaskError::Loading | MaskError::NothingToUndo | MaskError::NothingToRedo
        )
    }
}

pub type MaskResult<T> = Result<T, MaskError>;
