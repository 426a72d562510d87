use super::api::GlyphRecord;
use crate::{
    glif::{lib_axes, parse_glif},
    glyph::DEFAULT_SOURCE_NAME,
    variation::AxisDefaults,
    StoreError,
};
use indexmap::IndexMap;

/// Collect the axis defaults of every glyph a glyph is made of
///
/// Walks the `made_of` tree depth first, so deep components nested inside
/// deep components are covered too. A glyph that turns up again below itself
/// is an error rather than an endless walk.
pub(crate) fn resolve_axis_defaults(made_of: &[GlyphRecord]) -> Result<AxisDefaults, StoreError> {
    let mut defaults = AxisDefaults::new();
    let mut ancestors = vec![];
    for record in made_of {
        visit(record, &mut ancestors, &mut defaults)?;
    }
    Ok(defaults)
}

fn visit(
    record: &GlyphRecord,
    ancestors: &mut Vec<String>,
    defaults: &mut AxisDefaults,
) -> Result<(), StoreError> {
    let glyph = parse_glif(record.data.as_bytes(), &record.name, DEFAULT_SOURCE_NAME)?;
    let name = glyph.name().to_string();
    if ancestors.contains(&name) {
        return Err(StoreError::inconsistent(
            &name,
            format!("glyph is made of itself via {}", ancestors.join(" > ")),
        ));
    }
    if defaults.contains_key(&name) {
        return Ok(());
    }
    let axes: IndexMap<String, f64> = lib_axes(&glyph)?
        .into_iter()
        .map(|axis| (axis.name, axis.default_value))
        .collect();
    defaults.insert(name.clone(), axes);
    ancestors.push(name);
    for child in &record.made_of {
        visit(child, ancestors, defaults)?;
    }
    ancestors.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, axes: &[(&str, f64, f64)], made_of: Vec<GlyphRecord>) -> GlyphRecord {
        let axes: String = axes
            .iter()
            .map(|(axis, min, max)| {
                format!(
                    "<dict><key>name</key><string>{axis}</string>\
                     <key>minValue</key><real>{min}</real>\
                     <key>maxValue</key><real>{max}</real></dict>"
                )
            })
            .collect();
        GlyphRecord {
            id: 0,
            name: name.to_string(),
            type_code: None,
            data: format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<glyph name="{name}" format="2">
  <lib><dict><key>robocjk.axes</key><array>{axes}</array></dict></lib>
</glyph>
"#
            ),
            layers: vec![],
            made_of,
        }
    }

    #[test]
    fn test_nested_defaults() {
        let atom = record("AE_stroke", &[("len", 0.0, 100.0)], vec![]);
        let dc = record("DC_tree", &[("wght", 200.0, 800.0)], vec![atom.clone()]);
        let defaults = resolve_axis_defaults(&[dc, atom]).unwrap();
        assert_eq!(defaults.len(), 2);
        assert_eq!(defaults["DC_tree"], IndexMap::from([("wght".to_string(), 200.0)]));
        assert_eq!(defaults["AE_stroke"], IndexMap::from([("len".to_string(), 0.0)]));
    }

    #[test]
    fn test_cycle() {
        let inner = record("DC_loop", &[], vec![]);
        let outer = record("DC_loop", &[], vec![inner]);
        let err = resolve_axis_defaults(&[outer]).unwrap_err();
        assert!(matches!(err, StoreError::VariationConsistency { glyph, .. } if glyph == "DC_loop"));
    }
}
