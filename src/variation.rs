//! Turning per-layer outline data into variable glyphs and back
//!
//! Deep-component glyphs keep their variation data in the glyph lib of the
//! default outline: `robocjk.deepComponents` lists the components of the
//! default source, and each entry of `robocjk.variationGlyphs` describes one
//! further source, optionally backed by an outline layer of its own.
use crate::{
    glif::{lib_axes, new_norad_glyph, parse_glif, read_static_glyph, write_static_glyph},
    glyph::{Component, Layer, Location, Source, StaticGlyph, VariableGlyph, DEFAULT_SOURCE_NAME},
    transform::Transformation,
    StoreError,
};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use smol_str::SmolStr;
use std::collections::HashMap;

/// Glyph lib key holding the default source's deep components
pub const LIB_DEEP_COMPONENTS_KEY: &str = "robocjk.deepComponents";
/// Glyph lib key holding the variation sources
pub const LIB_VARIATION_GLYPHS_KEY: &str = "robocjk.variationGlyphs";

/// For each glyph name, the default value of every axis the glyph declares
pub type AxisDefaults = HashMap<String, IndexMap<String, f64>>;

#[derive(Debug, Clone, Default, Deserialize)]
struct DeepComponent {
    #[serde(default)]
    name: Option<SmolStr>,
    #[serde(default)]
    coord: Location,
    #[serde(default)]
    transform: Transformation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariationEntry {
    #[serde(default = "enabled", deserialize_with = "lenient_bool")]
    on: bool,
    #[serde(default)]
    layer_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    #[serde(default)]
    location: Location,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    deep_components: Vec<DeepComponent>,
}

fn enabled() -> bool {
    true
}

// Older databases store the flag as 0/1
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::Null => true,
        other => return Err(serde::de::Error::custom(format!("bad flag {other}"))),
    })
}

fn lib_entry<T: serde::de::DeserializeOwned + Default>(
    glyph: &norad::Glyph,
    key: &str,
) -> Result<T, StoreError> {
    match glyph.lib.get(key) {
        Some(value) => Ok(serde_json::from_value(serde_json::to_value(value)?)?),
        None => Ok(T::default()),
    }
}

/// Restrict a component location to the axes its base glyph declares
///
/// Each declared axis takes the explicit coordinate if there is one, then
/// the coordinate of the corresponding component in the default source,
/// then the axis default.
pub fn cleanup_location(
    location: &Location,
    axis_defaults: &IndexMap<String, f64>,
    neutral: &Location,
) -> Location {
    axis_defaults
        .iter()
        .map(|(axis, default)| {
            let value = location
                .get(axis)
                .or_else(|| neutral.get(axis))
                .copied()
                .unwrap_or(*default);
            (axis.clone(), value)
        })
        .collect()
}

fn serialize_components(
    glyph_name: &str,
    deep_components: &[DeepComponent],
    default_names: Option<&[SmolStr]>,
    axis_defaults: &AxisDefaults,
    neutral_locations: &[Location],
) -> Result<Vec<Component>, StoreError> {
    if let Some(names) = default_names {
        if names.len() != deep_components.len() {
            return Err(StoreError::inconsistent(
                glyph_name,
                format!(
                    "variation has {} deep components, default has {}",
                    deep_components.len(),
                    names.len()
                ),
            ));
        }
    }
    let empty = Location::new();
    deep_components
        .iter()
        .enumerate()
        .map(|(index, deep)| {
            let name = deep
                .name
                .clone()
                .or_else(|| default_names.and_then(|names| names.get(index).cloned()))
                .ok_or_else(|| {
                    StoreError::inconsistent(glyph_name, format!("deep component {index} has no name"))
                })?;
            let location = if deep.coord.is_empty() {
                Location::new()
            } else {
                let defaults = axis_defaults
                    .get(name.as_str())
                    .ok_or_else(|| StoreError::GlyphNotFound {
                        glyph: name.to_string(),
                    })?;
                cleanup_location(
                    &deep.coord,
                    defaults,
                    neutral_locations.get(index).unwrap_or(&empty),
                )
            };
            Ok(Component {
                name,
                location,
                transformation: deep.transform,
            })
        })
        .collect()
}

fn foreground(source_name: &str) -> String {
    format!("{source_name}/foreground")
}

/// Build a variable glyph from a deep-component GLIF and its layers
///
/// `layers` maps outline layer names to GLIF data; `axis_defaults` must
/// hold an entry for every glyph used as a deep component with a location.
pub fn assemble_deep_glyph(
    glif: &str,
    layers: &HashMap<String, String>,
    axis_defaults: &AxisDefaults,
) -> Result<VariableGlyph, StoreError> {
    let norad_glyph = parse_glif(glif.as_bytes(), "", DEFAULT_SOURCE_NAME)?;
    let glyph_name = norad_glyph.name().to_string();
    let mut default_glyph = read_static_glyph(&norad_glyph, DEFAULT_SOURCE_NAME)?;

    let deep: Vec<DeepComponent> = lib_entry(&norad_glyph, LIB_DEEP_COMPONENTS_KEY)?;
    let default_deep = serialize_components(&glyph_name, &deep, None, axis_defaults, &[])?;
    let dc_names: Vec<SmolStr> = default_deep.iter().map(|c| c.name.clone()).collect();
    let outline_components = std::mem::take(&mut default_glyph.components);
    default_glyph.components = if default_deep.is_empty() {
        outline_components.clone()
    } else {
        default_deep
    };
    let component_names: Vec<SmolStr> =
        default_glyph.components.iter().map(|c| c.name.clone()).collect();
    let neutral_locations: Vec<Location> = default_glyph
        .components
        .iter()
        .map(|c| c.location.clone())
        .collect();
    let has_default_path = !default_glyph.path.is_empty();
    let default_advance = default_glyph.x_advance;

    let mut glyph = VariableGlyph::new(glyph_name.as_str());
    glyph.unicodes = norad_glyph.codepoints.iter().map(|c| c as u32).collect();
    glyph.axes = lib_axes(&norad_glyph)?;
    glyph.sources.push(Source {
        name: DEFAULT_SOURCE_NAME.to_string(),
        location: Location::new(),
        layer_name: foreground(DEFAULT_SOURCE_NAME),
    });
    glyph
        .layers
        .insert(foreground(DEFAULT_SOURCE_NAME), default_glyph.into());

    let variations: Vec<VariationEntry> = lib_entry(&norad_glyph, LIB_VARIATION_GLYPHS_KEY)?;
    for (index, variation) in variations.into_iter().enumerate() {
        if !variation.on {
            continue;
        }
        let mut source_glyph = StaticGlyph {
            x_advance: default_advance,
            ..Default::default()
        };
        let mut layer_components = None;
        if let Some(layer_name) = variation.layer_name.as_deref() {
            if let Some(data) = layers.get(layer_name).filter(|_| has_default_path) {
                let layer_glyph = parse_glif(data.as_bytes(), &glyph_name, layer_name)?;
                let parsed = read_static_glyph(&layer_glyph, layer_name)?;
                source_glyph.x_advance = parsed.x_advance;
                source_glyph.path = parsed.path;
                layer_components = Some(parsed.components);
            }
        }
        let mut components = serialize_components(
            &glyph_name,
            &variation.deep_components,
            Some(&dc_names),
            axis_defaults,
            &neutral_locations,
        )?;
        if components.is_empty() {
            components = layer_components.unwrap_or_else(|| outline_components.clone());
        }
        let names: Vec<SmolStr> = components.iter().map(|c| c.name.clone()).collect();
        if names != component_names {
            return Err(StoreError::inconsistent(
                &glyph_name,
                format!(
                    "variation {index} has components {names:?}, default has {component_names:?}"
                ),
            ));
        }
        source_glyph.components = components;
        if let Some(width) = variation.width {
            source_glyph.x_advance = width;
        }
        let source_name = variation
            .source_name
            .filter(|n| !n.is_empty())
            .or(variation.layer_name.filter(|n| !n.is_empty()))
            .unwrap_or_else(|| format!("variation{index}"));
        let layer_name = foreground(&source_name);
        glyph.sources.push(Source {
            name: source_name,
            location: variation.location,
            layer_name: layer_name.clone(),
        });
        glyph.layers.insert(layer_name, source_glyph.into());
    }
    log::debug!(
        "Assembled {} with {} sources",
        glyph.name,
        glyph.sources.len()
    );
    Ok(glyph)
}

/// Check a variable glyph and render each of its layers as a norad glyph
///
/// `existing` supplies the glyph currently stored for a layer, so that data
/// the variation model does not cover survives the write; layers with no
/// stored glyph start from scratch and take `codepoints`. Nothing is written
/// here, so a malformed layer rejects the whole glyph.
pub fn flatten<F>(
    name: &str,
    glyph: &VariableGlyph,
    codepoints: &[u32],
    mut existing: F,
) -> Result<Vec<(String, norad::Glyph)>, StoreError>
where
    F: FnMut(&str) -> Option<norad::Glyph>,
{
    glyph
        .check_consistency()
        .map_err(|reason| StoreError::inconsistent(name, reason))?;
    glyph
        .layers
        .iter()
        .map(|(layer_name, Layer { glyph: static_glyph })| {
            let mut target = match existing(layer_name) {
                Some(target) => target,
                None => {
                    let mut fresh = new_norad_glyph(name)?;
                    fresh.codepoints =
                        norad::Codepoints::new(codepoints.iter().flat_map(|&u| char::from_u32(u)));
                    fresh
                }
            };
            write_static_glyph(static_glyph, &mut target, layer_name)?;
            Ok((layer_name.clone(), target))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    fn glif(name: &str, width: u32, lib: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<glyph name="{name}" format="2">
  <advance width="{width}"/>
  <unicode hex="4E00"/>
  <lib>
    <dict>
{lib}
    </dict>
  </lib>
</glyph>
"#
        )
    }

    const DEEP: &str = r#"
      <key>robocjk.axes</key>
      <array/>
      <key>robocjk.deepComponents</key>
      <array>
        <dict>
          <key>name</key><string>DC_one</string>
          <key>coord</key><dict><key>wght</key><real>0.25</real></dict>
          <key>transform</key><dict><key>x</key><real>10</real><key>y</key><real>20</real></dict>
        </dict>
        <dict>
          <key>name</key><string>DC_two</string>
          <key>coord</key><dict/>
          <key>transform</key><dict/>
        </dict>
      </array>
      <key>robocjk.variationGlyphs</key>
      <array>
        <dict>
          <key>sourceName</key><string>bold</string>
          <key>location</key><dict><key>wght</key><real>1</real></dict>
          <key>width</key><real>1100</real>
          <key>deepComponents</key>
          <array>
            <dict>
              <key>coord</key><dict><key>opsz</key><real>5</real></dict>
              <key>transform</key><dict/>
            </dict>
            <dict>
              <key>coord</key><dict/>
              <key>transform</key><dict/>
            </dict>
          </array>
        </dict>
        <dict>
          <key>on</key><false/>
          <key>sourceName</key><string>disabled</string>
          <key>location</key><dict/>
        </dict>
        <dict>
          <key>location</key><dict><key>wght</key><real>0.5</real></dict>
          <key>deepComponents</key>
          <array>
            <dict><key>coord</key><dict/><key>transform</key><dict/></dict>
            <dict><key>coord</key><dict/><key>transform</key><dict/></dict>
          </array>
        </dict>
      </array>
"#;

    fn defaults() -> AxisDefaults {
        let mut defaults = AxisDefaults::new();
        defaults.insert(
            "DC_one".into(),
            IndexMap::from([("wght".to_string(), 0.0), ("opsz".to_string(), 1.0)]),
        );
        defaults.insert("DC_two".into(), IndexMap::new());
        defaults
    }

    #[test]
    fn test_cleanup_location_precedence() {
        let location = Location::from([("a".to_string(), 1.0), ("junk".to_string(), 9.0)]);
        let neutral = Location::from([("b".to_string(), 2.0)]);
        let defaults = IndexMap::from([
            ("a".to_string(), 0.0),
            ("b".to_string(), 0.0),
            ("c".to_string(), 3.0),
        ]);
        assert_eq!(
            cleanup_location(&location, &defaults, &neutral),
            Location::from([
                ("a".to_string(), 1.0),
                ("b".to_string(), 2.0),
                ("c".to_string(), 3.0)
            ])
        );
    }

    #[test]
    fn test_assemble() {
        let data = glif("uni4E00", 1000, DEEP);
        let glyph = assemble_deep_glyph(&data, &HashMap::new(), &defaults()).unwrap();
        assert_eq!(glyph.name, "uni4E00");
        assert_eq!(glyph.unicodes, vec![0x4E00]);
        let names: Vec<_> = glyph.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["<default>", "bold", "variation2"]);
        let layers: Vec<_> = glyph.layers.keys().map(|s| s.as_str()).collect();
        assert_eq!(
            layers,
            vec!["<default>/foreground", "bold/foreground", "variation2/foreground"]
        );

        let default = &glyph.layers["<default>/foreground"].glyph;
        assert_eq!(default.component_names(), vec!["DC_one", "DC_two"]);
        assert_eq!(
            default.components[0].location,
            Location::from([("wght".to_string(), 0.25), ("opsz".to_string(), 1.0)])
        );
        assert_eq!(default.components[0].transformation.x, 10.0);
        assert!(default.components[1].location.is_empty());

        let bold = &glyph.layers["bold/foreground"].glyph;
        assert_eq!(bold.x_advance, 1100.0);
        // wght comes from the default source, opsz is explicit
        assert_eq!(
            bold.components[0].location,
            Location::from([("wght".to_string(), 0.25), ("opsz".to_string(), 5.0)])
        );
        assert_eq!(glyph.layers["variation2/foreground"].glyph.x_advance, 1000.0);
        assert!(glyph.check_consistency().is_ok());
    }

    #[test]
    fn test_assemble_component_count_mismatch() {
        let lib = r#"
      <key>robocjk.deepComponents</key>
      <array>
        <dict><key>name</key><string>DC_two</string><key>coord</key><dict/><key>transform</key><dict/></dict>
      </array>
      <key>robocjk.variationGlyphs</key>
      <array>
        <dict>
          <key>location</key><dict/>
          <key>deepComponents</key>
          <array/>
        </dict>
      </array>
"#;
        let err = assemble_deep_glyph(&glif("x", 10, lib), &HashMap::new(), &defaults())
            .unwrap_err();
        assert!(matches!(err, StoreError::VariationConsistency { .. }));
    }

    #[test]
    fn test_assemble_missing_axis_defaults() {
        let err = assemble_deep_glyph(&glif("x", 10, DEEP), &HashMap::new(), &AxisDefaults::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::GlyphNotFound { glyph } if glyph == "DC_one"));
    }

    #[test]
    fn test_flatten_new_layer_takes_codepoints() {
        let mut glyph = VariableGlyph::new("A");
        glyph.sources.push(Source {
            name: "mid".into(),
            location: Location::new(),
            layer_name: "mid".into(),
        });
        glyph.layers.insert(
            "mid".into(),
            StaticGlyph {
                x_advance: 420.0,
                ..Default::default()
            }
            .into(),
        );
        let written = flatten("A", &glyph, &[0x41], |_| None).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].0, "mid");
        assert_eq!(written[0].1.width, 420.0);
        assert_eq!(written[0].1.codepoints.iter().collect::<Vec<_>>(), vec!['A']);
    }

    #[test]
    fn test_flatten_rejects_inconsistent() {
        let mut glyph = VariableGlyph::new("A");
        for (layer, comps) in [("a", vec!["x"]), ("b", vec![])] {
            glyph.sources.push(Source {
                name: layer.into(),
                location: Location::new(),
                layer_name: layer.into(),
            });
            glyph.layers.insert(
                layer.into(),
                StaticGlyph {
                    components: comps.into_iter().map(Component::new).collect(),
                    ..Default::default()
                }
                .into(),
            );
        }
        let mut calls = 0;
        let err = flatten("A", &glyph, &[], |_| {
            calls += 1;
            None
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::VariationConsistency { .. }));
        assert_eq!(calls, 0);
    }
}
