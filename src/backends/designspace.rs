//! Fonts stored as UFOs, optionally tied together by a designspace file
//!
//! Every layer of every UFO the font uses is exposed under a name of the
//! form `"{styleName}/{ufoLayerName}"`, where the style name comes from the
//! first descriptor source that uses the UFO. A bare UFO opened on its own
//! exposes its layers under their own names.
use crate::{
    axis::{default_location, Axis},
    backend::{GlyphMap, ReadableFontBackend, WritableFontBackend},
    backends::container::UfoContainer,
    glif::{lib_axes, read_static_glyph},
    glyph::{Location, Source, VariableGlyph},
    variation::flatten,
    StoreError,
};
use indexmap::IndexMap;
use norad::designspace::{DesignSpaceDocument, Dimension};
use regex::Regex;
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::LazyLock,
};

static UNSAFE_FILE_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // Safe because the regex is valid
    Regex::new(r"[^A-Za-z0-9._-]").unwrap()
});

/// Hands out names that have not been handed out before
///
/// A colliding name gets a `#1`, `#2`, ... suffix. Names are never
/// recycled.
#[derive(Debug, Default)]
pub(crate) struct UniqueNameMaker {
    used: HashSet<String>,
}

impl UniqueNameMaker {
    pub(crate) fn make(&mut self, name: &str) -> String {
        let mut unique = name.to_string();
        let mut count = 0;
        while self.used.contains(&unique) {
            count += 1;
            unique = format!("{name}#{count}");
        }
        self.used.insert(unique.clone());
        unique
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LayerRef {
    container: usize,
    layer: String,
}

#[derive(Debug)]
struct Descriptor {
    path: PathBuf,
    document: DesignSpaceDocument,
}

impl Descriptor {
    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "font".to_string())
    }
}

/// How a layer the storage does not have yet gets created
#[derive(Debug)]
enum NewLayer {
    /// An extra layer in an existing UFO, recorded against that UFO's
    /// descriptor file name when the layer belongs to a source
    Sparse {
        container: usize,
        source: Option<(Source, String)>,
    },
    /// A new UFO of its own
    Dense { source: Source },
}

/// A font held in one or more UFOs on disk
#[derive(Debug)]
pub struct DesignspaceBackend {
    descriptor: Option<Descriptor>,
    axes: Vec<Axis>,
    containers: Vec<UfoContainer>,
    layers: IndexMap<String, LayerRef>,
    layer_names: HashMap<(usize, String), String>,
    sources: Vec<Source>,
    default_layer: String,
    style_names: UniqueNameMaker,
    glif_file_names: HashMap<String, String>,
}

impl DesignspaceBackend {
    /// Open a designspace file and every UFO it references
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let document = DesignSpaceDocument::load(&path)?;
        let axes = document
            .axes
            .iter()
            .map(Axis::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut backend = DesignspaceBackend {
            descriptor: None,
            axes,
            containers: vec![],
            layers: IndexMap::new(),
            layer_names: HashMap::new(),
            sources: vec![],
            default_layer: String::new(),
            style_names: UniqueNameMaker::default(),
            glif_file_names: HashMap::new(),
        };
        let descriptor = Descriptor { path, document };
        for ds_source in &descriptor.document.sources {
            let source = backend.open_source(descriptor.dir(), ds_source)?;
            backend.sources.push(source);
        }
        let defaults = default_location(&backend.axes);
        backend.default_layer = backend
            .sources
            .iter()
            .find(|source| backend.full_location(&source.location) == defaults)
            .map(|source| source.layer_name.clone())
            .ok_or(StoreError::NoDefaultSource)?;
        backend.descriptor = Some(descriptor);
        backend.refresh_file_names()?;
        log::info!(
            "Loaded {} sources across {} UFOs, {} layers",
            backend.sources.len(),
            backend.containers.len(),
            backend.layers.len()
        );
        Ok(backend)
    }

    /// Open a single UFO as a font with one source and no axes
    pub fn load_ufo(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let container = UfoContainer::open(path)?;
        let default_layer = container.default_layer_name();
        let style_name = container
            .style_name()?
            .unwrap_or_else(|| default_layer.clone());
        let mut backend = DesignspaceBackend {
            descriptor: None,
            axes: vec![],
            containers: vec![],
            layers: IndexMap::new(),
            layer_names: HashMap::new(),
            sources: vec![],
            default_layer: default_layer.clone(),
            style_names: UniqueNameMaker::default(),
            glif_file_names: HashMap::new(),
        };
        for layer in container.layer_names() {
            backend.register_layer(0, &layer, layer.clone());
        }
        backend.containers.push(container);
        backend.sources.push(Source {
            name: backend.style_names.make(&style_name),
            location: Location::new(),
            layer_name: default_layer,
        });
        backend.refresh_file_names()?;
        Ok(backend)
    }

    /// The sources of the font, in descriptor order
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Every layer name the backend exposes
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(|s| s.as_str())
    }

    /// The UFO that holds a layer, and the layer's name inside it
    pub fn layer_location(&self, layer_name: &str) -> Option<(&Path, &str)> {
        let layer = self.layers.get(layer_name)?;
        Some((self.containers[layer.container].path(), layer.layer.as_str()))
    }

    /// Path of the designspace file, if there is one
    pub fn descriptor_path(&self) -> Option<&Path> {
        self.descriptor.as_ref().map(|d| d.path.as_path())
    }

    fn register_layer(&mut self, container: usize, ufo_layer: &str, name: String) {
        self.layer_names
            .entry((container, ufo_layer.to_string()))
            .or_insert_with(|| name.clone());
        self.layers.entry(name).or_insert(LayerRef {
            container,
            layer: ufo_layer.to_string(),
        });
    }

    fn open_source(
        &mut self,
        dir: &Path,
        ds_source: &norad::designspace::Source,
    ) -> Result<Source, StoreError> {
        let style_name = self.style_names.make(
            ds_source
                .stylename
                .as_deref()
                .or(ds_source.name.as_deref())
                .unwrap_or(&ds_source.filename),
        );
        let ufo_path = dir.join(&ds_source.filename);
        let container = match self.containers.iter().position(|c| c.path() == ufo_path) {
            Some(index) => index,
            None => {
                self.containers.push(UfoContainer::open(&ufo_path)?);
                self.containers.len() - 1
            }
        };
        for layer in self.containers[container].layer_names() {
            if !self.layer_names.contains_key(&(container, layer.clone())) {
                self.register_layer(container, &layer, format!("{style_name}/{layer}"));
            }
        }
        let ufo_layer = ds_source
            .layer
            .clone()
            .unwrap_or_else(|| self.containers[container].default_layer_name());
        let layer_name = self
            .layer_names
            .get(&(container, ufo_layer.clone()))
            .cloned()
            .ok_or_else(|| {
                StoreError::container(&ufo_path, format!("no layer named {ufo_layer}"))
            })?;
        let location = ds_source
            .location
            .iter()
            .map(|dim| {
                let value = match (dim.xvalue, dim.uservalue) {
                    (Some(x), _) => x as f64,
                    (None, Some(user)) => self
                        .axes
                        .iter()
                        .find(|a| a.name == dim.name)
                        .map(|a| a.map_forward(user as f64))
                        .unwrap_or(user as f64),
                    (None, None) => 0.0,
                };
                (dim.name.clone(), value)
            })
            .collect();
        Ok(Source {
            name: style_name,
            location,
            layer_name,
        })
    }

    /// A location with every axis filled in, in axis order
    fn full_location(&self, location: &Location) -> Location {
        self.axes
            .iter()
            .map(|axis| {
                let value = location
                    .get(&axis.name)
                    .copied()
                    .unwrap_or_else(|| axis.design_default());
                (axis.name.clone(), value)
            })
            .collect()
    }

    fn refresh_file_names(&mut self) -> Result<(), StoreError> {
        let mut names = HashMap::new();
        for container in &self.containers {
            names.extend(container.glif_file_names()?);
        }
        self.glif_file_names = names;
        Ok(())
    }

    /// Read a glyph from disk, if the layer exists and holds it
    fn read_glyph(
        &self,
        layer_name: &str,
        glyph: &str,
    ) -> Result<Option<norad::Glyph>, StoreError> {
        match self.layers.get(layer_name) {
            Some(layer) => self.containers[layer.container].read_glyph(&layer.layer, glyph),
            None => Ok(None),
        }
    }

    fn default_container(&self) -> Result<usize, StoreError> {
        self.layers
            .get(&self.default_layer)
            .map(|l| l.container)
            .ok_or(StoreError::NoDefaultSource)
    }

    /// Decide how to create a layer nobody has seen before
    ///
    /// Only the axes on which the new source sits at a pole (the axis
    /// minimum, default or maximum) are compared. The layer goes into the
    /// UFO of the first source that agrees with it on all of those axes;
    /// when no source does, it gets a UFO of its own.
    fn plan_new_layer(
        &self,
        layer_name: &str,
        glyph: &VariableGlyph,
    ) -> Result<NewLayer, StoreError> {
        let default_container = self.default_container()?;
        let (Some(descriptor), Some(source)) = (
            self.descriptor.as_ref(),
            glyph.sources.iter().find(|s| s.layer_name == layer_name),
        ) else {
            return Ok(NewLayer::Sparse {
                container: default_container,
                source: None,
            });
        };
        let location = self.full_location(&source.location);
        let poles: Vec<(&str, f64)> = self
            .axes
            .iter()
            .filter_map(|axis| {
                let value = *location.get(&axis.name)?;
                let at_pole = [
                    axis.map_forward(axis.min_value),
                    axis.design_default(),
                    axis.map_forward(axis.max_value),
                ]
                .contains(&value);
                at_pole.then_some((axis.name.as_str(), value))
            })
            .collect();
        let source = Source {
            location,
            ..source.clone()
        };
        let matching = self.sources.iter().enumerate().find(|(_, existing)| {
            let existing = self.full_location(&existing.location);
            poles
                .iter()
                .all(|(axis, value)| existing.get(*axis) == Some(value))
        });
        let Some((index, _)) = matching else {
            return Ok(NewLayer::Dense { source });
        };
        let ds_source = descriptor
            .document
            .sources
            .get(index)
            .ok_or(StoreError::NoDefaultSource)?;
        let ufo_path = descriptor.dir().join(&ds_source.filename);
        let container = self
            .containers
            .iter()
            .position(|c| c.path() == ufo_path)
            .ok_or_else(|| StoreError::container(&ufo_path, "source UFO is not open"))?;
        Ok(NewLayer::Sparse {
            container,
            source: Some((source, ds_source.filename.clone())),
        })
    }

    fn dense_file_name(&self, descriptor: &Descriptor, source_name: &str) -> String {
        let base = format!(
            "{}_{}",
            descriptor.stem(),
            UNSAFE_FILE_CHARS.replace_all(source_name, "_")
        );
        let mut file_name = format!("{base}.ufo");
        let mut count = 0;
        while descriptor.dir().join(&file_name).exists()
            || self
                .containers
                .iter()
                .any(|c| c.path() == descriptor.dir().join(&file_name))
        {
            count += 1;
            file_name = format!("{base}_{count}.ufo");
        }
        file_name
    }

    /// Create the storage for a new layer and record it in the descriptor
    ///
    /// Returns whether the descriptor needs saving.
    fn materialize_layer(
        &mut self,
        layer_name: &str,
        plan: NewLayer,
    ) -> Result<bool, StoreError> {
        match plan {
            NewLayer::Sparse { container, source } => {
                let ufo_layer = layer_name.to_string();
                self.containers[container].add_layer(&ufo_layer)?;
                self.register_layer(container, &ufo_layer, layer_name.to_string());
                log::info!(
                    "New layer {} stored sparsely in {}",
                    layer_name,
                    self.containers[container].path().display()
                );
                let Some((source, filename)) = source else {
                    return Ok(false);
                };
                self.record_source(source, filename, ufo_layer)?;
                Ok(true)
            }
            NewLayer::Dense { source } => {
                let descriptor = self
                    .descriptor
                    .as_ref()
                    .ok_or(StoreError::NoDefaultSource)?;
                let filename = self.dense_file_name(descriptor, &source.name);
                let path = descriptor.dir().join(&filename);
                let default_container = self.default_container()?;
                let container =
                    UfoContainer::create(&path, Some(&self.containers[default_container]))?;
                let ufo_layer = container.default_layer_name();
                self.containers.push(container);
                let index = self.containers.len() - 1;
                self.register_layer(index, &ufo_layer, layer_name.to_string());
                log::info!("New layer {} stored densely in {}", layer_name, path.display());
                self.record_source(source, filename, ufo_layer)?;
                Ok(true)
            }
        }
    }

    fn default_descriptor_source(&self) -> Result<&norad::designspace::Source, StoreError> {
        let descriptor = self.descriptor.as_ref().ok_or(StoreError::NoDefaultSource)?;
        let default_index = self
            .sources
            .iter()
            .position(|s| s.layer_name == self.default_layer)
            .ok_or(StoreError::NoDefaultSource)?;
        descriptor
            .document
            .sources
            .get(default_index)
            .ok_or(StoreError::NoDefaultSource)
    }

    fn record_source(
        &mut self,
        source: Source,
        filename: String,
        ufo_layer: String,
    ) -> Result<(), StoreError> {
        let style_name = self.style_names.make(&source.name);
        let familyname = self.default_descriptor_source()?.familyname.clone();
        let location: Vec<Dimension> = source
            .location
            .iter()
            .map(|(axis, value)| Dimension {
                name: axis.clone(),
                uservalue: None,
                xvalue: Some(*value as f32),
                yvalue: None,
            })
            .collect();
        let descriptor = self
            .descriptor
            .as_mut()
            .ok_or(StoreError::NoDefaultSource)?;
        descriptor
            .document
            .sources
            .push(norad::designspace::Source {
                familyname,
                stylename: Some(style_name.clone()),
                name: Some(style_name.clone()),
                filename,
                location,
                layer: Some(ufo_layer),
            });
        self.sources.push(Source {
            name: style_name,
            location: source.location,
            layer_name: source.layer_name,
        });
        Ok(())
    }
}

impl ReadableFontBackend for DesignspaceBackend {
    async fn get_glyph_map(&mut self) -> Result<GlyphMap, StoreError> {
        let layer = self
            .layers
            .get(&self.default_layer)
            .ok_or(StoreError::NoDefaultSource)?;
        let container = &self.containers[layer.container];
        let mut glyph_map = GlyphMap::new();
        for name in container.glyph_names(&layer.layer)? {
            let codepoints = match container.read_glyph(&layer.layer, &name)? {
                Some(glyph) => glyph.codepoints.iter().map(|c| c as u32).collect(),
                None => vec![],
            };
            glyph_map.insert(name, codepoints);
        }
        Ok(glyph_map)
    }

    async fn get_glyph(&mut self, name: &str) -> Result<VariableGlyph, StoreError> {
        let mut glyph = VariableGlyph::new(name);
        for layer_name in self.layers.keys() {
            let Some(norad_glyph) = self.read_glyph(layer_name, name)? else {
                continue;
            };
            if *layer_name == self.default_layer {
                glyph.unicodes = norad_glyph.codepoints.iter().map(|c| c as u32).collect();
                glyph.axes = lib_axes(&norad_glyph)?;
            }
            glyph.layers.insert(
                layer_name.clone(),
                read_static_glyph(&norad_glyph, layer_name)?.into(),
            );
        }
        if glyph.layers.is_empty() {
            return Err(StoreError::GlyphNotFound {
                glyph: name.to_string(),
            });
        }
        glyph.sources = self
            .sources
            .iter()
            .filter(|source| glyph.layers.contains_key(&source.layer_name))
            .cloned()
            .collect();
        Ok(glyph)
    }

    async fn get_global_axes(&self) -> Result<Vec<Axis>, StoreError> {
        Ok(self.axes.clone())
    }

    async fn get_font_lib(&self) -> Result<serde_json::Value, StoreError> {
        Ok(match &self.descriptor {
            Some(descriptor) => serde_json::to_value(&descriptor.document.lib)?,
            None => match self.containers.first() {
                Some(container) => serde_json::to_value(container.lib()?)?,
                None => serde_json::Value::Object(Default::default()),
            },
        })
    }
}

impl WritableFontBackend for DesignspaceBackend {
    async fn put_glyph(
        &mut self,
        name: &str,
        glyph: &VariableGlyph,
        codepoints: &[u32],
    ) -> Result<(), StoreError> {
        let mut existing = HashMap::new();
        for layer_name in glyph.layers.keys() {
            if let Some(stored) = self.read_glyph(layer_name, name)? {
                existing.insert(layer_name.clone(), stored);
            }
        }
        let rendered = flatten(name, glyph, codepoints, |layer| existing.get(layer).cloned())?;

        let mut descriptor_changed = false;
        for (layer_name, _) in &rendered {
            if !self.layers.contains_key(layer_name) {
                let plan = self.plan_new_layer(layer_name, glyph)?;
                descriptor_changed |= self.materialize_layer(layer_name, plan)?;
            }
        }

        for (layer_name, norad_glyph) in rendered {
            if existing.get(&layer_name) == Some(&norad_glyph) {
                log::debug!("{} is unchanged in {}", name, layer_name);
                continue;
            }
            let layer = self
                .layers
                .get(&layer_name)
                .ok_or_else(|| StoreError::GlyphNotFound {
                    glyph: name.to_string(),
                })?;
            self.containers[layer.container].write_glyph(&layer.layer, &norad_glyph)?;
        }
        if descriptor_changed {
            if let Some(descriptor) = &self.descriptor {
                descriptor.document.save(&descriptor.path)?;
                log::info!("Updated {}", descriptor.path.display());
            }
        }
        self.refresh_file_names()?;
        Ok(())
    }
}

#[cfg(feature = "watch")]
impl crate::backend::WatchableFontBackend for DesignspaceBackend {
    fn watch_external_changes(
        &self,
    ) -> Result<crate::backends::watch::ExternalChanges, StoreError> {
        crate::backends::watch::ExternalChanges::new(
            self.containers
                .iter()
                .map(|c| c.path().to_path_buf())
                .collect(),
            self.glif_file_names.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unique_names() {
        let mut maker = UniqueNameMaker::default();
        assert_eq!(maker.make("Bold"), "Bold");
        assert_eq!(maker.make("Bold"), "Bold#1");
        assert_eq!(maker.make("Bold#1"), "Bold#1#1");
        assert_eq!(maker.make("Bold"), "Bold#2");
        assert_eq!(maker.make("Light"), "Light");
    }
}
