use std::{io, path::PathBuf};
use thiserror::Error;

/// Errors produced while reading or writing font sources
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown file type for file {path:?}")]
    /// The file type is not handled by any backend
    UnknownFileType {
        /// The path of the file
        path: PathBuf,
    },

    /// General error with a message
    #[error("Error handling font source: {0}")]
    General(String),

    #[error("IO Error: {0}")]
    /// IO error
    IO(#[from] io::Error),

    #[error("Malformed outline for glyph {glyph} in layer {layer}: {reason}")]
    /// Outline data could not be parsed or does not form valid contours
    MalformedOutline {
        /// The glyph whose outline is broken
        glyph: String,
        /// The layer the outline was read from or written to
        layer: String,
        /// What was wrong with it
        reason: String,
    },

    #[error("Glyph {glyph} not found")]
    /// A glyph was not found
    GlyphNotFound {
        /// The name of the glyph requested
        glyph: String,
    },

    #[error("Glyph {glyph} is not variation-compatible: {reason}")]
    /// Components do not correspond across the sources of a glyph
    VariationConsistency {
        /// The name of the glyph
        glyph: String,
        /// The reason the sources do not correspond
        reason: String,
    },

    #[error("Backing container {path:?} failed: {reason}")]
    /// A UFO container could not be opened, created or written
    BackingContainer {
        /// Path to the container
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    #[error("No source sits at the default location")]
    /// None of the design-space sources is at the default location
    NoDefaultSource,

    #[error("Remote API error: {0}")]
    /// The remote glyph database returned an error or an unusable response
    RemoteTransport(String),

    #[error("Error parsing designspace file: {0}")]
    /// Error parsing designspace file
    DesignSpaceLoad(#[from] norad::error::DesignSpaceLoadError),

    #[error("Error saving designspace file: {0}")]
    /// Error saving designspace file
    DesignSpaceSave(#[from] norad::error::DesignSpaceSaveError),

    #[error("Error in UFO naming: {0}")]
    /// Error in UFO naming
    UfoName(#[from] norad::error::NamingError),

    #[error("Error reading property list: {0}")]
    /// Error reading one of a UFO's plist index files
    Plist(#[from] plist::Error),

    #[error("JSON conversion error: {0}")]
    /// JSON conversion error
    JsonSerialize(#[from] serde_json::Error),

    #[cfg(feature = "watch")]
    #[error("File watcher error: {0}")]
    /// The file-system watcher could not be set up
    Watch(#[from] notify::Error),
}

impl StoreError {
    pub(crate) fn container(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StoreError::BackingContainer {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(glyph: &str, layer: &str, reason: impl ToString) -> Self {
        StoreError::MalformedOutline {
            glyph: glyph.to_string(),
            layer: layer.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn inconsistent(glyph: &str, reason: impl ToString) -> Self {
        StoreError::VariationConsistency {
            glyph: glyph.to_string(),
            reason: reason.to_string(),
        }
    }
}
