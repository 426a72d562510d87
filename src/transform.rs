use kurbo::{Affine, Vec2};
use serde::{Deserialize, Serialize};

/// A component placement, decomposed into editable parts
///
/// The transformation is applied as
/// `translate(x + tcenterx, y + tcentery) * rotate(rotation) * scale(scalex, scaley) * translate(-tcenterx, -tcentery)`,
/// with the rotation given in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transformation {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
    /// Rotation in degrees, counter-clockwise
    pub rotation: f64,
    /// Horizontal scale factor
    pub scalex: f64,
    /// Vertical scale factor
    pub scaley: f64,
    /// Horizontal center of rotation and scaling
    pub tcenterx: f64,
    /// Vertical center of rotation and scaling
    pub tcentery: f64,
}

impl Default for Transformation {
    fn default() -> Self {
        Transformation {
            x: 0.0,
            y: 0.0,
            rotation: 0.0,
            scalex: 1.0,
            scaley: 1.0,
            tcenterx: 0.0,
            tcentery: 0.0,
        }
    }
}

// Coefficients closer to zero than this are written out as zero.
const EPSILON: f64 = 1e-9;

impl Transformation {
    /// Whether this transformation leaves its component untouched
    pub fn is_identity(&self) -> bool {
        *self == Transformation::default()
    }

    /// Compose the transformation into an affine matrix
    pub fn to_affine(&self) -> Affine {
        if self.rotation == 0.0 && self.tcenterx == 0.0 && self.tcentery == 0.0 {
            return Affine::new([self.scalex, 0.0, 0.0, self.scaley, self.x, self.y]);
        }
        let center = Vec2::new(self.tcenterx, self.tcentery);
        let composed = Affine::translate(Vec2::new(self.x, self.y) + center)
            * Affine::rotate(self.rotation.to_radians())
            * Affine::scale_non_uniform(self.scalex, self.scaley)
            * Affine::translate(-center);
        let mut coeffs = composed.as_coeffs();
        for v in coeffs.iter_mut() {
            if v.abs() < EPSILON {
                *v = 0.0;
            }
        }
        Affine::new(coeffs)
    }

    /// Decompose an affine matrix, ignoring skew
    ///
    /// The result always has a zero transformation center. Matrices without
    /// rotation decompose exactly.
    pub fn from_affine(affine: Affine) -> Self {
        let [a, b, c, d, e, f] = affine.as_coeffs();
        if b == 0.0 && c == 0.0 {
            return Transformation {
                x: e,
                y: f,
                scalex: a,
                scaley: d,
                ..Default::default()
            };
        }
        let (mut a, mut b) = (a, b);
        let sign = if a < 0.0 { -1.0 } else { 1.0 };
        a *= sign;
        b *= sign;
        let delta = a * d - b * c;
        let (rotation, scalex, scaley) = if a != 0.0 || b != 0.0 {
            let r = (a * a + b * b).sqrt();
            let angle = if b >= 0.0 {
                (a / r).acos()
            } else {
                -(a / r).acos()
            };
            (angle, r * sign, delta / r)
        } else {
            let s = (c * c + d * d).sqrt();
            let angle = if d > 0.0 {
                (d / s).asin()
            } else {
                -(d / s).asin()
            };
            (std::f64::consts::FRAC_PI_2 - angle, delta / s * sign, s)
        };
        Transformation {
            x: e,
            y: f,
            rotation: rotation.to_degrees(),
            scalex,
            scaley,
            ..Default::default()
        }
    }
}

impl From<Affine> for Transformation {
    fn from(affine: Affine) -> Self {
        Transformation::from_affine(affine)
    }
}

impl From<&Transformation> for Affine {
    fn from(t: &Transformation) -> Self {
        t.to_affine()
    }
}
