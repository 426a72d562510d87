//! The capabilities every storage backend offers
//!
//! A backend is opened once and then asked for glyphs by name. All
//! operations are `async`; the backends expect to be driven from a single
//! task and do no locking of their own, so callers must not overlap two
//! writes of the same glyph.
use crate::{axis::Axis, backends::designspace::DesignspaceBackend, glyph::VariableGlyph, StoreError};
use indexmap::IndexMap;
use std::path::PathBuf;

/// Glyph names, each with the codepoints that map to it
pub type GlyphMap = IndexMap<String, Vec<u32>>;

/// Reading glyphs and font-wide data
#[allow(async_fn_in_trait)]
pub trait ReadableFontBackend {
    /// Every glyph in the font with its codepoints
    async fn get_glyph_map(&mut self) -> Result<GlyphMap, StoreError>;

    /// Assemble one glyph from storage
    async fn get_glyph(&mut self, name: &str) -> Result<VariableGlyph, StoreError>;

    /// The axes of the font's design space
    async fn get_global_axes(&self) -> Result<Vec<Axis>, StoreError>;

    /// The font-level lib, as an opaque JSON object
    async fn get_font_lib(&self) -> Result<serde_json::Value, StoreError>;

    /// Release anything the backend holds open
    fn close(&mut self) {}
}

/// Writing glyphs back to storage
#[allow(async_fn_in_trait)]
pub trait WritableFontBackend: ReadableFontBackend {
    /// Store an edited glyph
    ///
    /// `glyph` is usually a glyph obtained from
    /// [`get_glyph`](ReadableFontBackend::get_glyph) and then edited;
    /// `codepoints` is the glyph's current entry in the glyph map and is
    /// used for glyphs the storage has not seen before.
    async fn put_glyph(
        &mut self,
        name: &str,
        glyph: &VariableGlyph,
        codepoints: &[u32],
    ) -> Result<(), StoreError>;
}

/// Reporting changes made to the storage by someone else
#[cfg(feature = "watch")]
pub trait WatchableFontBackend {
    /// Start watching; each item is a set of changed glyph names
    fn watch_external_changes(
        &self,
    ) -> Result<crate::backends::watch::ExternalChanges, StoreError>;
}

/// Open a font source on disk, choosing the backend by file extension
///
/// `.designspace` files open every UFO they reference; a bare `.ufo`
/// opens as a single-source font.
pub fn open(filename: impl Into<PathBuf>) -> Result<DesignspaceBackend, StoreError> {
    let pb = filename.into();
    match pb.extension() {
        Some(ext) if ext == "designspace" => DesignspaceBackend::load(pb),
        Some(ext) if ext == "ufo" => DesignspaceBackend::load_ufo(pb),
        _ => Err(StoreError::UnknownFileType { path: pb }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(
            open("font.glyphs"),
            Err(StoreError::UnknownFileType { .. })
        ));
        assert!(matches!(
            open("no-extension"),
            Err(StoreError::UnknownFileType { .. })
        ));
    }
}
