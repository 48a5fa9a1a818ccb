//! Per-beam analysis errors.
//!
//! Every failure raised while analysing one beam is local to that beam: the
//! sweep records it against the beam key and moves on. Warning-only
//! conditions (ambiguous regions, pitch mismatch, implausible first fits) are
//! not errors and never appear here.

use std::path::{Path, PathBuf};

/// Errors raised while analysing a single beam's spot images.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The spot file could not be read.
    Io {
        /// File that failed to open or read.
        path: PathBuf,
        /// Underlying I/O error message.
        message: String,
    },
    /// The spot file does not follow the delimited export layout.
    MalformedImageFile {
        /// Offending file.
        path: PathBuf,
        /// What was missing or unparseable.
        reason: String,
    },
    /// A labelled metadata value (e.g. `Diameter:`) is absent from the file.
    MissingMetadata {
        /// Offending file.
        path: PathBuf,
        /// Label that was searched for.
        label: String,
    },
    /// Entry and exit images have different dimensions `[nrows, ncols]`.
    ShapeMismatch {
        /// Entry image dimensions.
        entry: [usize; 2],
        /// Exit image dimensions.
        exit: [usize; 2],
    },
    /// Image maximum is not positive, so it cannot be normalized.
    DegenerateImage,
    /// Profile maximum is not positive, or a sample is not finite.
    DegenerateProfile,
    /// The Gaussian fit ended on a non-finite sigma.
    NonFiniteFit,
    /// Image is too small to host a profile chord with the configured margin.
    ImageTooSmall {
        /// Image rows.
        nrows: usize,
        /// Image columns.
        ncols: usize,
        /// Edge margin in pixels.
        margin_px: usize,
    },
    /// Thresholding produced no connected region.
    NoRegionFound {
        /// Threshold used, in percent of the image maximum.
        threshold_pct: f64,
    },
}

impl AnalysisError {
    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    pub(crate) fn malformed(path: &Path, reason: impl Into<String>) -> Self {
        Self::MalformedImageFile {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "cannot read {}: {}", path.display(), message)
            }
            Self::MalformedImageFile { path, reason } => {
                write!(f, "malformed image file {}: {}", path.display(), reason)
            }
            Self::MissingMetadata { path, label } => {
                write!(f, "label '{}' not found in {}", label, path.display())
            }
            Self::ShapeMismatch { entry, exit } => write!(
                f,
                "entry image is {}x{} but exit image is {}x{}",
                entry[0], entry[1], exit[0], exit[1]
            ),
            Self::DegenerateImage => write!(f, "image maximum is not positive"),
            Self::DegenerateProfile => {
                write!(f, "profile maximum is not positive or a sample is not finite")
            }
            Self::NonFiniteFit => write!(f, "profile fit produced a non-finite sigma"),
            Self::ImageTooSmall {
                nrows,
                ncols,
                margin_px,
            } => write!(
                f,
                "image {}x{} too small for a profile with {} px margin",
                nrows, ncols, margin_px
            ),
            Self::NoRegionFound { threshold_pct } => {
                write!(f, "no region found above {}% threshold", threshold_pct)
            }
        }
    }
}

impl std::error::Error for AnalysisError {}
