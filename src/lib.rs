#![deny(clippy::unwrap_used, clippy::expect_used)]
//! Storage for a variable-font editor
//!
//! Font sources are read into [`VariableGlyph`]s, one glyph at a time, and
//! edited glyphs are written back. Two kinds of storage are supported: a
//! designspace (or bare UFO) on disk, and a remote robocjk database of
//! deep-component glyphs.
//!
//! ```no_run
//! use glyphstore::{open, ReadableFontBackend};
//!
//! # async fn demo() -> Result<(), glyphstore::StoreError> {
//! let mut font = open("MutatorSans.designspace")?;
//! let glyph = font.get_glyph("A").await?;
//! println!("{} has {} sources", glyph.name, glyph.sources.len());
//! # Ok(())
//! # }
//! ```
mod axis;
mod backend;
pub mod backends;
mod error;
pub mod glif;
mod glyph;
pub mod path;
mod transform;
pub mod variation;

#[cfg(feature = "watch")]
pub use crate::backend::WatchableFontBackend;
pub use crate::{
    axis::{default_location, Axis, RawAxis},
    backend::{open, GlyphMap, ReadableFontBackend, WritableFontBackend},
    backends::designspace::DesignspaceBackend,
    error::StoreError,
    glyph::{Component, Layer, Location, Source, StaticGlyph, VariableGlyph, DEFAULT_SOURCE_NAME},
    path::{PackedPath, Path},
    transform::Transformation,
};
