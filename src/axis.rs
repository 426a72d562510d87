use crate::{glyph::Location, StoreError};
use serde::{Deserialize, Serialize};

/// A variation axis, either global to the font or local to a glyph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    /// The name locations refer to the axis by
    pub name: String,
    /// A human-facing name, when it differs from `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Minimum value
    pub min_value: f64,
    /// Default value
    pub default_value: f64,
    /// Maximum value
    pub max_value: f64,
    /// Piecewise-linear map from user to design coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<(f64, f64)>>,
    /// Whether the axis should be hidden from users
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl Axis {
    /// Create an axis with no mapping
    pub fn new(name: impl Into<String>, min_value: f64, default_value: f64, max_value: f64) -> Self {
        Axis {
            name: name.into(),
            label: None,
            min_value,
            default_value,
            max_value,
            mapping: None,
            hidden: false,
        }
    }

    /// Map a user-space value into design space
    pub fn map_forward(&self, value: f64) -> f64 {
        match &self.mapping {
            Some(mapping) if !mapping.is_empty() => piecewise_linear(value, mapping),
            _ => value,
        }
    }

    /// The default value in design space
    pub fn design_default(&self) -> f64 {
        self.map_forward(self.default_value)
    }
}

fn piecewise_linear(value: f64, mapping: &[(f64, f64)]) -> f64 {
    let mut sorted = mapping.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return value,
    };
    if value <= first.0 {
        return value + (first.1 - first.0);
    }
    if value >= last.0 {
        return value + (last.1 - last.0);
    }
    for pair in sorted.windows(2) {
        let ((a_in, a_out), (b_in, b_out)) = (pair[0], pair[1]);
        if value <= b_in {
            if b_in == a_in {
                return b_out;
            }
            return a_out + (b_out - a_out) * (value - a_in) / (b_in - a_in);
        }
    }
    value
}

/// The design-space location where every axis sits at its default
pub fn default_location(axes: &[Axis]) -> Location {
    axes.iter()
        .map(|axis| (axis.name.clone(), axis.design_default()))
        .collect()
}

/// An axis record as it arrives from a source, before normalization
///
/// The extremes may be given in either order and the default may be
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAxis {
    /// Axis name
    pub name: String,
    /// Human-facing name
    #[serde(default)]
    pub label: Option<String>,
    /// Four-letter axis tag
    #[serde(default)]
    pub tag: Option<String>,
    /// One extreme
    #[serde(alias = "min_value", alias = "minimum")]
    pub min_value: f64,
    /// The default, if given
    #[serde(default, alias = "default_value", alias = "default")]
    pub default_value: Option<f64>,
    /// The other extreme
    #[serde(alias = "max_value", alias = "maximum")]
    pub max_value: f64,
    /// User to design mapping
    #[serde(default, alias = "map")]
    pub mapping: Option<Vec<(f64, f64)>>,
    /// Hidden flag
    #[serde(default)]
    pub hidden: bool,
}

impl RawAxis {
    /// Sort the extremes, fill in the default and keep it within range
    pub fn normalize(self) -> Axis {
        let (min_value, max_value) = if self.min_value > self.max_value {
            (self.max_value, self.min_value)
        } else {
            (self.min_value, self.max_value)
        };
        let mut default_value = self.default_value.unwrap_or(min_value);
        if default_value < min_value || default_value > max_value {
            log::warn!(
                "Default {} of axis {} lies outside {}..{}, clamping",
                default_value,
                self.name,
                min_value,
                max_value
            );
            default_value = default_value.clamp(min_value, max_value);
        }
        Axis {
            name: self.name,
            label: self.label,
            min_value,
            default_value,
            max_value,
            mapping: self.mapping,
            hidden: self.hidden,
        }
    }

    /// Normalize a record whose machine-facing identifier is its tag
    ///
    /// The record's name becomes the label and the tag becomes the name.
    pub fn normalize_tagged(mut self) -> Axis {
        if let Some(tag) = self.tag.take() {
            self.label = Some(std::mem::replace(&mut self.name, tag));
        }
        self.normalize()
    }
}

impl From<RawAxis> for Axis {
    fn from(raw: RawAxis) -> Self {
        raw.normalize()
    }
}

impl TryFrom<&norad::designspace::Axis> for Axis {
    type Error = StoreError;

    fn try_from(dsax: &norad::designspace::Axis) -> Result<Self, Self::Error> {
        let values = dsax.values.as_deref().unwrap_or_default();
        let lowest = values.iter().copied().reduce(f32::min);
        let highest = values.iter().copied().reduce(f32::max);
        let min_value = dsax.minimum.or(lowest).ok_or_else(|| {
            StoreError::General(format!("Axis {} has no minimum", dsax.name))
        })?;
        let max_value = dsax.maximum.or(highest).ok_or_else(|| {
            StoreError::General(format!("Axis {} has no maximum", dsax.name))
        })?;
        Ok(RawAxis {
            name: dsax.name.clone(),
            label: None,
            tag: None,
            min_value: min_value as f64,
            default_value: Some(dsax.default as f64),
            max_value: max_value as f64,
            mapping: dsax.map.as_ref().map(|map| {
                map.iter()
                    .map(|m| (m.input as f64, m.output as f64))
                    .collect()
            }),
            hidden: dsax.hidden,
        }
        .normalize())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, Some(100.0), 1000.0, (0.0, 100.0, 1000.0))]
    #[case(1000.0, Some(100.0), 0.0, (0.0, 100.0, 1000.0))]
    #[case(900.0, None, 100.0, (100.0, 100.0, 900.0))]
    #[case(10.0, Some(50.0), 0.0, (0.0, 10.0, 10.0))]
    fn test_normalize(
        #[case] min: f64,
        #[case] default: Option<f64>,
        #[case] max: f64,
        #[case] expected: (f64, f64, f64),
    ) {
        let axis = RawAxis {
            name: "wght".into(),
            min_value: min,
            default_value: default,
            max_value: max,
            ..Default::default()
        }
        .normalize();
        assert_eq!(
            (axis.min_value, axis.default_value, axis.max_value),
            expected
        );
        assert!(axis.min_value <= axis.default_value && axis.default_value <= axis.max_value);
    }

    #[test]
    fn test_tagged_axis_moves_name_to_label() {
        let raw: RawAxis = serde_json::from_value(serde_json::json!({
            "name": "Weight",
            "tag": "wght",
            "minValue": 100,
            "defaultValue": 400,
            "maxValue": 900,
        }))
        .unwrap();
        let axis = raw.normalize_tagged();
        assert_eq!(axis.name, "wght");
        assert_eq!(axis.label.as_deref(), Some("Weight"));
        let json = serde_json::to_value(&axis).unwrap();
        assert!(json.get("tag").is_none());
        assert_eq!(json["label"], "Weight");
    }

    #[test]
    fn test_mapping() {
        let mut axis = Axis::new("weight", 100.0, 400.0, 900.0);
        assert_eq!(axis.design_default(), 400.0);
        axis.mapping = Some(vec![(100.0, 20.0), (400.0, 80.0), (900.0, 200.0)]);
        assert_eq!(axis.design_default(), 80.0);
        assert_eq!(axis.map_forward(250.0), 50.0);
        assert_eq!(axis.map_forward(900.0), 200.0);
    }

    #[test]
    fn test_default_location() {
        let axes = vec![
            Axis::new("width", 0.0, 0.0, 1000.0),
            Axis::new("weight", 100.0, 150.0, 900.0),
        ];
        let loc = default_location(&axes);
        assert_eq!(loc.get("width"), Some(&0.0));
        assert_eq!(loc.get("weight"), Some(&150.0));
    }
}
