//! A UFO on disk, read and written one glyph at a time
//!
//! Nothing about the glyphs is held in memory: every read goes to the glif
//! file, so edits made by other tools are seen straight away, and every
//! write touches only the glif being stored (plus the plist indexes, when a
//! glyph or layer is new). Files are written next to their final location
//! and renamed into place.
use crate::{glif::parse_glif, StoreError};
use indexmap::IndexMap;
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

const LAYER_CONTENTS: &str = "layercontents.plist";
const CONTENTS: &str = "contents.plist";
const FONT_INFO: &str = "fontinfo.plist";
const FONT_LIB: &str = "lib.plist";
const METAINFO: &str = "metainfo.plist";
const DEFAULT_GLYPHS_DIR: &str = "glyphs";
const DEFAULT_LAYER_NAME: &str = "public.default";
const LAYER_DIR_PREFIX: &str = "glyphs.";
const GLIF_SUFFIX: &str = ".glif";
const MAX_FILE_NAME: usize = 255;

const ILLEGAL_CHARS: &[char] = &['"', '*', '+', '/', ':', '<', '>', '?', '[', '\\', ']', '|'];
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "CLOCK$", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6",
    "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8",
    "LPT9",
];

/// Glyph name to glif file name, in file order
type Contents = IndexMap<String, String>;

/// One UFO font and the layers inside it
#[derive(Debug)]
pub(crate) struct UfoContainer {
    path: PathBuf,
    /// Layer name and glyph directory, default layer first
    layers: Vec<(String, String)>,
}

impl UfoContainer {
    /// Open an existing UFO
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !path.join(METAINFO).is_file() {
            return Err(StoreError::container(&path, "not a UFO"));
        }
        let layercontents = path.join(LAYER_CONTENTS);
        let mut layers: Vec<(String, String)> = if layercontents.exists() {
            plist::from_file(&layercontents)
                .map_err(|e| StoreError::container(&layercontents, e))?
        } else {
            vec![(DEFAULT_LAYER_NAME.to_string(), DEFAULT_GLYPHS_DIR.to_string())]
        };
        match layers.iter().position(|(_, dir)| dir == DEFAULT_GLYPHS_DIR) {
            Some(index) => {
                let default = layers.remove(index);
                layers.insert(0, default);
            }
            None => return Err(StoreError::container(&path, "no default layer")),
        }
        log::debug!("Opened {} with {} layers", path.display(), layers.len());
        Ok(UfoContainer { path, layers })
    }

    /// Create a new, empty UFO on disk, copying the font info of `seed`
    pub(crate) fn create(
        path: impl Into<PathBuf>,
        seed: Option<&UfoContainer>,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if path.exists() {
            return Err(StoreError::container(&path, "refusing to overwrite"));
        }
        let staging = sibling(&path, "saving");
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        let built = norad::Font::new()
            .save(&staging)
            .map_err(|e| StoreError::container(&path, e))
            .and_then(|()| match seed {
                Some(seed) if seed.path.join(FONT_INFO).exists() => {
                    fs::copy(seed.path.join(FONT_INFO), staging.join(FONT_INFO))?;
                    Ok(())
                }
                _ => Ok(()),
            })
            .and_then(|()| Ok(fs::rename(&staging, &path)?));
        if let Err(e) = built {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }
        log::info!("Created {}", path.display());
        UfoContainer::open(path)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Layer names, default layer first
    pub(crate) fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|(name, _)| name.clone()).collect()
    }

    pub(crate) fn default_layer_name(&self) -> String {
        self.layers[0].0.clone()
    }

    pub(crate) fn has_layer(&self, layer: &str) -> bool {
        self.layers.iter().any(|(name, _)| name == layer)
    }

    /// The style name recorded in the font info, if any
    pub(crate) fn style_name(&self) -> Result<Option<String>, StoreError> {
        let info = self.path.join(FONT_INFO);
        if !info.exists() {
            return Ok(None);
        }
        let info: plist::Dictionary = plist::from_file(&info)?;
        Ok(info
            .get("styleName")
            .and_then(|v| v.as_string())
            .map(|s| s.to_string()))
    }

    /// The font-level lib
    pub(crate) fn lib(&self) -> Result<plist::Dictionary, StoreError> {
        let lib = self.path.join(FONT_LIB);
        if !lib.exists() {
            return Ok(plist::Dictionary::new());
        }
        Ok(plist::from_file(&lib)?)
    }

    fn layer_dir(&self, layer: &str) -> Result<PathBuf, StoreError> {
        self.layers
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, dir)| self.path.join(dir))
            .ok_or_else(|| StoreError::container(&self.path, format!("no layer named {layer}")))
    }

    fn contents(&self, layer: &str) -> Result<Contents, StoreError> {
        let contents = self.layer_dir(layer)?.join(CONTENTS);
        if !contents.exists() {
            return Ok(Contents::new());
        }
        plist::from_file(&contents).map_err(|e| StoreError::container(&contents, e))
    }

    /// Names of the glyphs in a layer, in file order
    pub(crate) fn glyph_names(&self, layer: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.contents(layer)?.into_keys().collect())
    }

    /// Read a glyph from its glif file
    pub(crate) fn read_glyph(
        &self,
        layer: &str,
        glyph: &str,
    ) -> Result<Option<norad::Glyph>, StoreError> {
        if !self.has_layer(layer) {
            return Ok(None);
        }
        let Some(file) = self.contents(layer)?.shift_remove(glyph) else {
            return Ok(None);
        };
        let data = fs::read(self.layer_dir(layer)?.join(file))?;
        parse_glif(&data, glyph, layer).map(Some)
    }

    /// Write one glyph's glif file, then register it if it is new
    pub(crate) fn write_glyph(
        &self,
        layer: &str,
        glyph: &norad::Glyph,
    ) -> Result<(), StoreError> {
        let dir = self.layer_dir(layer)?;
        let mut contents = self.contents(layer)?;
        let name = glyph.name().to_string();
        let (file, is_new) = match contents.get(&name) {
            Some(file) => (file.clone(), false),
            None => {
                let taken: HashSet<String> =
                    contents.values().map(|f| f.to_lowercase()).collect();
                (user_name_to_file_name(&name, "", GLIF_SUFFIX, &taken), true)
            }
        };
        write_atomically(&dir.join(&file), |staging| {
            glyph
                .save(staging)
                .map_err(|e| StoreError::malformed(&name, layer, e))
        })?;
        if is_new {
            contents.insert(name.clone(), file.clone());
            write_atomically(&dir.join(CONTENTS), |staging| {
                Ok(plist::to_file_xml(staging, &contents)?)
            })?;
        }
        log::debug!("Wrote {} to {}", name, dir.join(&file).display());
        Ok(())
    }

    /// Add an empty layer with its own glyph directory
    pub(crate) fn add_layer(&mut self, layer: &str) -> Result<(), StoreError> {
        if self.has_layer(layer) {
            return Ok(());
        }
        let taken: HashSet<String> = self.layers.iter().map(|(_, d)| d.to_lowercase()).collect();
        let dir = user_name_to_file_name(layer, LAYER_DIR_PREFIX, "", &taken);
        fs::create_dir(self.path.join(&dir))?;
        write_atomically(&self.path.join(&dir).join(CONTENTS), |staging| {
            Ok(plist::to_file_xml(staging, &Contents::new())?)
        })?;
        let mut layers = self.layers.clone();
        layers.push((layer.to_string(), dir));
        write_atomically(&self.path.join(LAYER_CONTENTS), |staging| {
            Ok(plist::to_file_xml(staging, &layers)?)
        })?;
        self.layers = layers;
        log::debug!("Added layer {} to {}", layer, self.path.display());
        Ok(())
    }

    /// Map from glif file name to glyph name, across every layer on disk
    pub(crate) fn glif_file_names(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut file_names = HashMap::new();
        for (layer, _) in &self.layers {
            for (glyph, file) in self.contents(layer)? {
                file_names.insert(file, glyph);
            }
        }
        Ok(file_names)
    }
}

/// Write a file beside `path` and move it into place
///
/// On failure the partial file is removed and `path` is left as it was.
fn write_atomically(
    path: &Path,
    write: impl FnOnce(&Path) -> Result<(), StoreError>,
) -> Result<(), StoreError> {
    let staging = sibling(path, "saving");
    let written = write(&staging).and_then(|()| Ok(fs::rename(&staging, path)?));
    if written.is_err() {
        let _ = fs::remove_file(&staging);
    }
    written
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Turn a glyph or layer name into a file name that is safe on any
/// filesystem, following the UFO naming convention
///
/// Capitals get an underscore after them so that names differing only in
/// case still map to different files on case-insensitive systems. `taken`
/// holds the lowercased names already in use.
fn user_name_to_file_name(
    name: &str,
    prefix: &str,
    suffix: &str,
    taken: &HashSet<String>,
) -> String {
    let mut escaped = String::new();
    for (i, c) in name.chars().enumerate() {
        if ILLEGAL_CHARS.contains(&c) || (c as u32) < 0x20 || c as u32 == 0x7f {
            escaped.push('_');
        } else if i == 0 && c == '.' && prefix.is_empty() {
            escaped.push('_');
        } else if c.is_uppercase() {
            escaped.push(c);
            escaped.push('_');
        } else {
            escaped.push(c);
        }
    }
    let escaped = escaped
        .split('.')
        .map(|part| {
            if RESERVED_NAMES.contains(&part.to_uppercase().as_str()) {
                format!("_{part}")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".");
    let room = MAX_FILE_NAME.saturating_sub(prefix.len() + suffix.len());
    let mut stem: String = escaped.chars().take(room).collect();
    while stem.len() > room {
        stem.pop();
    }
    let candidate = format!("{prefix}{stem}{suffix}");
    if !taken.contains(&candidate.to_lowercase()) {
        return candidate;
    }
    let mut counter: u64 = 1;
    loop {
        let numbered = format!("{prefix}{stem}{counter:015}{suffix}");
        if !taken.contains(&numbered.to_lowercase()) {
            return numbered;
        }
        counter += 1;
    }
}
