//! Moving outlines between norad glyphs and [`StaticGlyph`]s
use crate::{
    axis::{Axis, RawAxis},
    glyph::{Component, StaticGlyph},
    path::{draw_packed_path, PathBuilder, PointPen, SegmentType},
    transform::Transformation,
    StoreError,
};
use kurbo::{Affine, Point};

/// Glyph lib key holding glyph-local axis records
pub const LIB_AXES_KEY: &str = "robocjk.axes";

/// Parse GLIF data held in memory
pub fn parse_glif(data: &[u8], glyph: &str, layer: &str) -> Result<norad::Glyph, StoreError> {
    norad::Glyph::parse_raw(data).map_err(|e| StoreError::malformed(glyph, layer, e))
}

/// Create an empty norad glyph, checking the name is legal first
pub fn new_norad_glyph(name: &str) -> Result<norad::Glyph, StoreError> {
    let name = norad::Name::new(name)?;
    Ok(norad::Glyph::new(name.as_str()))
}

fn norad_affine(t: &norad::AffineTransform) -> Affine {
    Affine::new([
        t.x_scale, t.xy_scale, t.yx_scale, t.y_scale, t.x_offset, t.y_offset,
    ])
}

/// Replay a norad glyph's outline into a point pen
pub fn draw_norad_glyph(glyph: &norad::Glyph, pen: &mut impl PointPen) {
    for contour in &glyph.contours {
        pen.begin_path();
        for p in &contour.points {
            let segment = match p.typ {
                norad::PointType::Move => Some(SegmentType::Move),
                norad::PointType::Line => Some(SegmentType::Line),
                norad::PointType::OffCurve => None,
                norad::PointType::Curve => Some(SegmentType::Curve),
                norad::PointType::QCurve => Some(SegmentType::QCurve),
            };
            pen.add_point(Point::new(p.x, p.y), segment, p.smooth);
        }
        pen.end_path();
    }
    for component in &glyph.components {
        pen.add_component(component.base.as_str(), norad_affine(&component.transform));
    }
}

/// Read the outline, components and advances of a norad glyph
pub fn read_static_glyph(glyph: &norad::Glyph, layer: &str) -> Result<StaticGlyph, StoreError> {
    let mut builder = PathBuilder::new();
    draw_norad_glyph(glyph, &mut builder);
    let (path, refs) = builder
        .build()
        .map_err(|e| StoreError::malformed(glyph.name().as_str(), layer, e))?;
    Ok(StaticGlyph {
        path,
        components: refs
            .into_iter()
            .map(|r| Component {
                name: r.base,
                location: Default::default(),
                transformation: Transformation::from_affine(r.transform),
            })
            .collect(),
        x_advance: glyph.width,
        y_advance: (glyph.height != 0.0).then_some(glyph.height),
    })
}

/// Collects a point stream into norad contours and components
#[derive(Default)]
struct NoradPen {
    contours: Vec<norad::Contour>,
    components: Vec<norad::Component>,
    current: Vec<norad::ContourPoint>,
    error: Option<StoreError>,
}

impl PointPen for NoradPen {
    fn begin_path(&mut self) {
        self.current.clear();
    }

    fn add_point(&mut self, pt: Point, segment: Option<SegmentType>, smooth: bool) {
        let typ = match segment {
            Some(SegmentType::Move) => norad::PointType::Move,
            Some(SegmentType::Line) => norad::PointType::Line,
            Some(SegmentType::Curve) => norad::PointType::Curve,
            Some(SegmentType::QCurve) => norad::PointType::QCurve,
            None => norad::PointType::OffCurve,
        };
        self.current
            .push(norad::ContourPoint::new(pt.x, pt.y, typ, smooth, None, None));
    }

    fn end_path(&mut self) {
        let points = std::mem::take(&mut self.current);
        self.contours.push(norad::Contour::new(points, None));
    }

    fn add_component(&mut self, base: &str, transform: Affine) {
        let [x_scale, xy_scale, yx_scale, y_scale, x_offset, y_offset] = transform.as_coeffs();
        match norad::Name::new(base) {
            Ok(name) => self.components.push(norad::Component::new(
                name,
                norad::AffineTransform {
                    x_scale,
                    xy_scale,
                    yx_scale,
                    y_scale,
                    x_offset,
                    y_offset,
                },
                None,
            )),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e.into());
                }
            }
        }
    }
}

/// Replace the outline and advances of `target` with those of `glyph`
///
/// Everything else on the target (codepoints, anchors, guidelines, lib,
/// note) is left alone. Components lose their variation locations, which
/// UFO components cannot carry. A component whose base and decomposed
/// transformation match the one already at its position keeps the stored
/// matrix untouched, so unedited components do not pick up rounding noise.
pub fn write_static_glyph(
    glyph: &StaticGlyph,
    target: &mut norad::Glyph,
    layer: &str,
) -> Result<(), StoreError> {
    let mut pen = NoradPen::default();
    draw_packed_path(&glyph.path, &mut pen)
        .map_err(|e| StoreError::malformed(target.name().as_str(), layer, e))?;
    for component in &glyph.components {
        pen.add_component(&component.name, component.transformation.to_affine());
    }
    if let Some(e) = pen.error {
        return Err(e);
    }
    for (written, (component, stored)) in pen
        .components
        .iter_mut()
        .zip(glyph.components.iter().zip(&target.components))
    {
        if stored.base.as_str() == component.name
            && Transformation::from_affine(norad_affine(&stored.transform))
                == component.transformation
        {
            *written = stored.clone();
        }
    }
    target.width = glyph.x_advance;
    if let Some(height) = glyph.y_advance {
        target.height = height;
    }
    target.contours = pen.contours;
    target.components = pen.components;
    Ok(())
}

/// A glyph's lib as JSON
pub fn lib_json(glyph: &norad::Glyph) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::to_value(&glyph.lib)?)
}

/// Glyph-local axes recorded in a glyph's lib
pub fn lib_axes(glyph: &norad::Glyph) -> Result<Vec<Axis>, StoreError> {
    let Some(value) = glyph.lib.get(LIB_AXES_KEY) else {
        return Ok(vec![]);
    };
    let raw: Vec<RawAxis> = serde_json::from_value(serde_json::to_value(value)?)?;
    Ok(raw.into_iter().map(RawAxis::normalize).collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use pretty_assertions::assert_eq;

    const GLIF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<glyph name="A" format="2">
  <advance width="600"/>
  <unicode hex="0041"/>
  <anchor x="300" y="700" name="top"/>
  <outline>
    <contour>
      <point x="0" y="0" type="line"/>
      <point x="300" y="700" type="line"/>
      <point x="600" y="0" type="line"/>
    </contour>
    <contour>
      <point x="100" y="100" type="move"/>
      <point x="150" y="200"/>
      <point x="250" y="200"/>
      <point x="300" y="100" type="curve" smooth="yes"/>
    </contour>
    <component base="acute" xOffset="200" yOffset="650"/>
  </outline>
  <lib>
    <dict>
      <key>robocjk.axes</key>
      <array>
        <dict>
          <key>name</key>
          <string>wght</string>
          <key>minValue</key>
          <real>1000</real>
          <key>maxValue</key>
          <real>0</real>
        </dict>
      </array>
    </dict>
  </lib>
</glyph>
"#;

    #[test]
    fn test_read_static_glyph() {
        let glyph = parse_glif(GLIF.as_bytes(), "A", "public.default").unwrap();
        let static_glyph = read_static_glyph(&glyph, "public.default").unwrap();
        assert_eq!(static_glyph.x_advance, 600.0);
        assert_eq!(static_glyph.y_advance, None);
        assert_eq!(static_glyph.path.number_of_points(), 7);
        assert_eq!(static_glyph.path.contour_info.len(), 2);
        assert!(static_glyph.path.contour_info[0].is_closed);
        assert!(!static_glyph.path.contour_info[1].is_closed);
        assert_eq!(static_glyph.component_names(), vec!["acute"]);
        assert_eq!(static_glyph.components[0].transformation.x, 200.0);
        assert_eq!(static_glyph.components[0].transformation.y, 650.0);
    }

    #[test]
    fn test_write_preserves_the_rest() {
        let original = parse_glif(GLIF.as_bytes(), "A", "public.default").unwrap();
        let static_glyph = read_static_glyph(&original, "public.default").unwrap();
        let mut target = original.clone();
        target.contours.clear();
        target.components.clear();
        write_static_glyph(&static_glyph, &mut target, "public.default").unwrap();
        assert_eq!(target, original);
    }

    const ROTATED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<glyph name="Arot" format="2">
  <advance width="600"/>
  <outline>
    <component base="A" xScale="0.866" xyScale="0.5" yxScale="-0.5" yScale="0.866" xOffset="120" yOffset="-40"/>
  </outline>
</glyph>
"#;

    #[test]
    fn test_write_keeps_unedited_component_matrix() {
        let original = parse_glif(ROTATED.as_bytes(), "Arot", "public.default").unwrap();
        let static_glyph = read_static_glyph(&original, "public.default").unwrap();
        let mut target = original.clone();
        write_static_glyph(&static_glyph, &mut target, "public.default").unwrap();
        assert_eq!(target.components, original.components);
        assert_eq!(target.components[0].transform.xy_scale, 0.5);
    }

    #[test]
    fn test_write_recomposes_edited_component() {
        let original = parse_glif(ROTATED.as_bytes(), "Arot", "public.default").unwrap();
        let mut static_glyph = read_static_glyph(&original, "public.default").unwrap();
        static_glyph.components[0].transformation.x += 10.0;
        let mut target = original.clone();
        write_static_glyph(&static_glyph, &mut target, "public.default").unwrap();
        let transform = target.components[0].transform;
        assert!((transform.x_offset - 130.0).abs() < 1e-9);
        assert!((transform.x_scale - 0.866).abs() < 1e-9);
        assert!((transform.xy_scale - 0.5).abs() < 1e-9);
        assert!((transform.yx_scale + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_write_malformed() {
        let mut static_glyph = StaticGlyph::default();
        static_glyph.path.coordinates = vec![1.0];
        let mut target = new_norad_glyph("A").unwrap();
        let err = write_static_glyph(&static_glyph, &mut target, "bold").unwrap_err();
        assert!(matches!(err, StoreError::MalformedOutline { .. }));
    }

    #[test]
    fn test_bad_glif() {
        assert!(matches!(
            parse_glif(b"<glyph", "A", "x"),
            Err(StoreError::MalformedOutline { .. })
        ));
    }

    #[test]
    fn test_lib_axes() {
        let glyph = parse_glif(GLIF.as_bytes(), "A", "public.default").unwrap();
        let axes = lib_axes(&glyph).unwrap();
        assert_eq!(axes.len(), 1);
        assert_eq!(axes[0].name, "wght");
        assert_eq!(axes[0].min_value, 0.0);
        assert_eq!(axes[0].default_value, 0.0);
        assert_eq!(axes[0].max_value, 1000.0);
        assert!(lib_json(&glyph).unwrap().get(LIB_AXES_KEY).is_some());
    }
}
