//! Contours, points and the pens that produce and consume them
//!
//! Outlines travel in two shapes: the unpacked [`Path`], a list of contours
//! each holding its own points, and the [`PackedPath`], which keeps every
//! coordinate in one flat array alongside a parallel array of point-type
//! bytes and a list of contour end points. The packed form is what the glyph
//! JSON carries; the unpacked form is easier to edit.
//!
//! Outline formats get into and out of a packed path through the
//! [`PointPen`] protocol: [`PathBuilder`] records a point stream into a
//! packed path, and [`draw_packed_path`] replays a packed path into any pen.
use kurbo::{Affine, Point as KurboPoint};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;

/// Point-type byte for an on-curve point
pub const ON_CURVE: u8 = 0x00;
/// Point-type byte for a quadratic off-curve point
pub const OFF_CURVE_QUAD: u8 = 0x01;
/// Point-type byte for a cubic off-curve point
pub const OFF_CURVE_CUBIC: u8 = 0x02;
/// Flag marking an on-curve point as smooth
pub const SMOOTH_FLAG: u8 = 0x08;
const POINT_TYPE_MASK: u8 = 0x07;

/// A point sequence that does not describe a valid contour
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct MalformedPath(pub String);

/// The kind of an off-curve point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffCurveType {
    /// Quadratic (TrueType-style) control point
    Quad,
    /// Cubic (PostScript-style) control point
    Cubic,
}

/// A single point of an unpacked contour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
    /// The off-curve type, or `None` for on-curve points
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<OffCurveType>,
    /// Whether the point is smooth
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub smooth: bool,
}

impl Point {
    /// A sharp on-curve point
    pub fn on_curve(x: f64, y: f64) -> Self {
        Point {
            x,
            y,
            typ: None,
            smooth: false,
        }
    }

    /// An off-curve point of the given type
    pub fn off_curve(x: f64, y: f64, typ: OffCurveType) -> Self {
        Point {
            x,
            y,
            typ: Some(typ),
            smooth: false,
        }
    }

    /// Whether the point lies on the curve
    pub fn is_on_curve(&self) -> bool {
        self.typ.is_none()
    }

    fn type_byte(&self) -> u8 {
        match self.typ {
            None if self.smooth => ON_CURVE | SMOOTH_FLAG,
            None => ON_CURVE,
            Some(OffCurveType::Quad) => OFF_CURVE_QUAD,
            Some(OffCurveType::Cubic) => OFF_CURVE_CUBIC,
        }
    }

    fn from_type_byte(x: f64, y: f64, byte: u8) -> Result<Self, MalformedPath> {
        let typ = match byte & POINT_TYPE_MASK {
            ON_CURVE => None,
            OFF_CURVE_QUAD => Some(OffCurveType::Quad),
            OFF_CURVE_CUBIC => Some(OffCurveType::Cubic),
            other => return Err(MalformedPath(format!("unknown point type {other}"))),
        };
        Ok(Point {
            x,
            y,
            typ,
            smooth: typ.is_none() && byte & SMOOTH_FLAG != 0,
        })
    }
}

/// One contour of an unpacked path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contour {
    /// The points of the contour, in drawing order
    pub points: Vec<Point>,
    /// Whether the contour is closed
    #[serde(default)]
    pub is_closed: bool,
}

/// An outline as a list of independent contours
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// The contours of the outline
    pub contours: Vec<Contour>,
}

impl Path {
    /// Flatten the contours into the packed representation
    pub fn pack(&self) -> PackedPath {
        let mut packed = PackedPath::default();
        for contour in &self.contours {
            for point in &contour.points {
                packed.coordinates.push(point.x);
                packed.coordinates.push(point.y);
                packed.point_types.push(point.type_byte());
            }
            packed.contour_info.push(ContourInfo {
                end_point: packed.point_types.len() as isize - 1,
                is_closed: contour.is_closed,
            });
        }
        packed
    }
}

/// Where a contour ends in a packed path, and whether it is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourInfo {
    /// Index of the contour's last point; `-1` for an empty first contour
    pub end_point: isize,
    /// Whether the contour is closed
    #[serde(default)]
    pub is_closed: bool,
}

/// An outline stored as flat parallel arrays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackedPath {
    /// Interleaved x and y coordinates
    pub coordinates: Vec<f64>,
    /// One type byte per point
    pub point_types: Vec<u8>,
    /// Contour boundaries
    pub contour_info: Vec<ContourInfo>,
}

impl PackedPath {
    /// Whether the path has no contours at all
    pub fn is_empty(&self) -> bool {
        self.contour_info.is_empty()
    }

    /// Number of points across all contours
    pub fn number_of_points(&self) -> usize {
        self.point_types.len()
    }

    /// Check the arrays agree with each other
    pub fn validate(&self) -> Result<(), MalformedPath> {
        if self.coordinates.len() != 2 * self.point_types.len() {
            return Err(MalformedPath(format!(
                "{} coordinates for {} points",
                self.coordinates.len(),
                self.point_types.len()
            )));
        }
        let mut previous: isize = -1;
        for info in &self.contour_info {
            if info.end_point < previous {
                return Err(MalformedPath(format!(
                    "contour end point {} precedes {previous}",
                    info.end_point
                )));
            }
            previous = info.end_point;
        }
        if previous != self.point_types.len() as isize - 1 {
            return Err(MalformedPath(format!(
                "last contour ends at {previous} but there are {} points",
                self.point_types.len()
            )));
        }
        Ok(())
    }

    /// The point index ranges of each contour
    fn contour_ranges(&self) -> impl Iterator<Item = (std::ops::Range<usize>, bool)> + '_ {
        let mut start = 0usize;
        self.contour_info.iter().map(move |info| {
            let end = (info.end_point + 1).max(0) as usize;
            let range = start..end.max(start);
            start = end.max(start);
            (range, info.is_closed)
        })
    }

    fn point(&self, index: usize) -> Result<Point, MalformedPath> {
        Point::from_type_byte(
            self.coordinates[2 * index],
            self.coordinates[2 * index + 1],
            self.point_types[index],
        )
    }

    /// Expand into independent contours
    pub fn unpack(&self) -> Result<Path, MalformedPath> {
        self.validate()?;
        let contours = self
            .contour_ranges()
            .map(|(range, is_closed)| {
                Ok(Contour {
                    points: range.map(|i| self.point(i)).collect::<Result<_, _>>()?,
                    is_closed,
                })
            })
            .collect::<Result<_, MalformedPath>>()?;
        Ok(Path { contours })
    }
}

impl From<&Path> for PackedPath {
    fn from(path: &Path) -> Self {
        path.pack()
    }
}

/// The segment an on-curve point terminates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// The first point of an open contour
    Move,
    /// A straight line
    Line,
    /// A cubic curve
    Curve,
    /// A quadratic curve
    QCurve,
}

/// Receives outlines point by point
///
/// Each contour is bracketed by [`begin_path`](PointPen::begin_path) and
/// [`end_path`](PointPen::end_path); off-curve points are passed with no
/// segment type. An open contour starts with a [`SegmentType::Move`] point.
pub trait PointPen {
    /// Start a new contour
    fn begin_path(&mut self);
    /// Add a point to the current contour
    fn add_point(&mut self, pt: KurboPoint, segment: Option<SegmentType>, smooth: bool);
    /// Finish the current contour
    fn end_path(&mut self);
    /// Place a component
    fn add_component(&mut self, base: &str, transform: Affine);
}

/// A component reference captured by a [`PathBuilder`]
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRef {
    /// Name of the referenced glyph
    pub base: SmolStr,
    /// Placement of the component
    pub transform: Affine,
}

/// A [`PointPen`] which records what it is given into a [`PackedPath`]
#[derive(Debug, Default)]
pub struct PathBuilder {
    path: PackedPath,
    components: Vec<ComponentRef>,
    current: Option<Vec<(KurboPoint, Option<SegmentType>, bool)>>,
    error: Option<MalformedPath>,
}

impl PathBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(MalformedPath(message.into()));
        }
    }

    /// Finish recording, returning the path and the components seen
    pub fn build(mut self) -> Result<(PackedPath, Vec<ComponentRef>), MalformedPath> {
        if self.current.is_some() {
            self.fail("contour was never ended");
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.path, self.components)),
        }
    }

    fn finish_contour(
        &mut self,
        points: Vec<(KurboPoint, Option<SegmentType>, bool)>,
    ) -> Result<(), MalformedPath> {
        let is_closed = points
            .first()
            .is_none_or(|(_, seg, _)| *seg != Some(SegmentType::Move));
        let count = points.len();
        let mut types = Vec::with_capacity(count);
        for (ix, (_, segment, smooth)) in points.iter().enumerate() {
            let byte = match segment {
                Some(SegmentType::Move) if ix != 0 => {
                    return Err(MalformedPath(format!("move point at index {ix}")))
                }
                Some(_) if *smooth => ON_CURVE | SMOOTH_FLAG,
                Some(_) => ON_CURVE,
                None => {
                    // An off-curve point takes its kind from the segment it leads into
                    let following = if is_closed {
                        (1..=count)
                            .map(|step| &points[(ix + step) % count])
                            .find_map(|(_, seg, _)| *seg)
                    } else {
                        points[ix + 1..].iter().find_map(|(_, seg, _)| *seg)
                    };
                    match following {
                        Some(SegmentType::Curve) => OFF_CURVE_CUBIC,
                        Some(SegmentType::QCurve) => OFF_CURVE_QUAD,
                        // A closed contour of nothing but off-curves is an implied-on-curve quadratic
                        None if is_closed => OFF_CURVE_QUAD,
                        None => {
                            return Err(MalformedPath(
                                "open contour ends with off-curve points".into(),
                            ))
                        }
                        Some(other) => {
                            return Err(MalformedPath(format!(
                                "off-curve points before a {other:?} point"
                            )))
                        }
                    }
                }
            };
            types.push(byte);
        }
        for ((pt, _, _), byte) in points.iter().zip(types) {
            self.path.coordinates.push(pt.x);
            self.path.coordinates.push(pt.y);
            self.path.point_types.push(byte);
        }
        self.path.contour_info.push(ContourInfo {
            end_point: self.path.point_types.len() as isize - 1,
            is_closed,
        });
        Ok(())
    }
}

impl PointPen for PathBuilder {
    fn begin_path(&mut self) {
        if self.current.is_some() {
            self.fail("contour started before the previous one ended");
        }
        self.current = Some(vec![]);
    }

    fn add_point(&mut self, pt: KurboPoint, segment: Option<SegmentType>, smooth: bool) {
        match self.current.as_mut() {
            Some(points) => points.push((pt, segment, smooth)),
            None => self.fail("point added outside of a contour"),
        }
    }

    fn end_path(&mut self) {
        match self.current.take() {
            Some(points) => {
                if let Err(e) = self.finish_contour(points) {
                    self.fail(e.0);
                }
            }
            None => self.fail("contour ended without being started"),
        }
    }

    fn add_component(&mut self, base: &str, transform: Affine) {
        self.components.push(ComponentRef {
            base: base.into(),
            transform,
        });
    }
}

/// Replay a packed path into a pen
///
/// Segment types are reconstructed from the point types: an on-curve point
/// preceded by a cubic off-curve ends a curve, one preceded by a quadratic
/// off-curve ends a quadratic curve, anything else is a line. The first
/// point of an open contour is a move.
pub fn draw_packed_path(path: &PackedPath, pen: &mut impl PointPen) -> Result<(), MalformedPath> {
    path.validate()?;
    for (range, is_closed) in path.contour_ranges() {
        let points = range
            .map(|i| path.point(i))
            .collect::<Result<Vec<_>, _>>()?;
        if !is_closed && points.first().is_some_and(|p| !p.is_on_curve()) {
            return Err(MalformedPath(
                "open contour starts with an off-curve point".into(),
            ));
        }
        if !is_closed && points.last().is_some_and(|p| !p.is_on_curve()) {
            return Err(MalformedPath(
                "open contour ends with an off-curve point".into(),
            ));
        }
        pen.begin_path();
        let count = points.len();
        for (ix, point) in points.iter().enumerate() {
            let segment = if !point.is_on_curve() {
                None
            } else if ix == 0 && !is_closed {
                Some(SegmentType::Move)
            } else {
                let previous = &points[(ix + count - 1) % count];
                match previous.typ {
                    Some(OffCurveType::Cubic) => Some(SegmentType::Curve),
                    Some(OffCurveType::Quad) => Some(SegmentType::QCurve),
                    None => Some(SegmentType::Line),
                }
            };
            pen.add_point(KurboPoint::new(point.x, point.y), segment, point.smooth);
        }
        pen.end_path();
    }
    Ok(())
}
