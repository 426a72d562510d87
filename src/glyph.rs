use crate::{axis::Axis, path::PackedPath, transform::Transformation};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A point in design space, keyed by axis name
///
/// Axes which are absent sit at their default.
pub type Location = IndexMap<String, f64>;

/// Name of the source at the default location of a deep-component glyph
pub const DEFAULT_SOURCE_NAME: &str = "<default>";

/// A reference to another glyph, placed with a transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Name of the referenced glyph
    pub name: SmolStr,
    /// Location within the referenced glyph's own axes
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub location: Location,
    /// Placement of the component
    #[serde(default)]
    pub transformation: Transformation,
}

impl Component {
    /// A component with an identity transformation and no location
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Component {
            name: name.into(),
            location: Location::new(),
            transformation: Transformation::default(),
        }
    }
}

/// One concrete outline of a glyph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticGlyph {
    /// The outline; empty if the glyph has no contours
    #[serde(default, skip_serializing_if = "PackedPath::is_empty")]
    pub path: PackedPath,
    /// Components, in drawing order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    /// Horizontal advance
    #[serde(default)]
    pub x_advance: f64,
    /// Vertical advance, if the glyph has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_advance: Option<f64>,
}

impl StaticGlyph {
    /// The names of the components, in order
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A location in design space together with the layer that draws it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display name of the source
    #[serde(default)]
    pub name: String,
    /// Where the source sits
    #[serde(default)]
    pub location: Location,
    /// Key into [`VariableGlyph::layers`]
    pub layer_name: String,
}

/// A named outline of a variable glyph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// The outline data
    pub glyph: StaticGlyph,
}

impl From<StaticGlyph> for Layer {
    fn from(glyph: StaticGlyph) -> Self {
        Layer { glyph }
    }
}

/// A glyph with all of its sources and layers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableGlyph {
    /// Glyph name
    pub name: SmolStr,
    /// Codepoints mapped to this glyph
    #[serde(default)]
    pub unicodes: Vec<u32>,
    /// Axes local to this glyph
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axes: Vec<Axis>,
    /// Sources, in order
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Layers by name
    #[serde(default)]
    pub layers: IndexMap<String, Layer>,
}

impl VariableGlyph {
    /// Create an empty glyph
    pub fn new(name: impl Into<SmolStr>) -> Self {
        VariableGlyph {
            name: name.into(),
            ..Default::default()
        }
    }

    /// The layer a source draws with
    pub fn source_layer(&self, source: &Source) -> Option<&StaticGlyph> {
        self.layers.get(&source.layer_name).map(|l| &l.glyph)
    }

    /// The source whose location matches `default_location`
    ///
    /// Axes missing from a source's location are taken to be at their
    /// default.
    pub fn default_source(&self, default_location: &Location) -> Option<&Source> {
        self.sources.iter().find(|source| {
            source.location.iter().all(|(axis, value)| {
                default_location
                    .get(axis)
                    .is_none_or(|default| default == value)
            })
        })
    }

    /// Check that every source's layer exists and that all sources use the
    /// same components in the same order
    ///
    /// Returns a description of the first problem found.
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut reference: Option<(&str, Vec<&str>)> = None;
        for source in &self.sources {
            let layer = self.source_layer(source).ok_or_else(|| {
                format!(
                    "source {} refers to missing layer {}",
                    source.name, source.layer_name
                )
            })?;
            let names = layer.component_names();
            if let Some((first, expected)) = &reference {
                if *expected != names {
                    return Err(format!(
                        "source {} has components {:?} but source {} has {:?}",
                        source.name, names, first, expected
                    ));
                }
                continue;
            }
            reference = Some((source.name.as_str(), names));
        }
        Ok(())
    }
}
