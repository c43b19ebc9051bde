use crate::data::{image_center, Warp};
use crate::{AlignError, Result};
use serde::{Deserialize, Serialize};

/// Pixel displacement `(dx, dy)`, `y` pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation {
    pub dx: f64,
    pub dy: f64,
}

impl Translation {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// The displacement rotated by `angle_degrees` (+x towards +y).
    pub fn rotated(self, angle_degrees: f64) -> Self {
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        Self {
            dx: cos_a * self.dx - sin_a * self.dy,
            dy: sin_a * self.dx + cos_a * self.dy,
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            dx: self.dx * factor,
            dy: self.dy * factor,
        }
    }
}

/// How a target relates to its reference.
///
/// The target is modelled as the reference rotated by `rotation` degrees
/// about the image center (+x towards +y, clockwise on screen) and then
/// moved by `translation`. `scale` is the magnification that would bring
/// the target to the reference's scale.
///
/// Serialized with the field names of the alignment cache:
/// `{"rotation", "shift x", "shift y", "scale"}`. Deserialization goes
/// through [`TransformEstimate::new`], so a stored entry that violates the
/// invariants is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredTransform", into = "StoredTransform")]
pub struct TransformEstimate {
    rotation: f64,
    scale: f64,
    translation: Translation,
}

impl TransformEstimate {
    /// Validate and build. The rotation is wrapped into `[-180, 180)`.
    pub fn new(rotation: f64, scale: f64, translation: Translation) -> Result<Self> {
        if !rotation.is_finite() {
            return Err(AlignError::AlignmentComputation(format!("rotation is not finite: {}", rotation)));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(AlignError::AlignmentComputation(format!(
                "scale must be positive and finite, got {}",
                scale
            )));
        }
        if !translation.dx.is_finite() || !translation.dy.is_finite() {
            return Err(AlignError::AlignmentComputation(format!(
                "translation is not finite: ({}, {})",
                translation.dx, translation.dy
            )));
        }

        Ok(Self {
            rotation: wrap_degrees(rotation),
            scale,
            translation,
        })
    }

    pub fn identity() -> Self {
        Self {
            rotation: 0.0,
            scale: 1.0,
            translation: Translation::default(),
        }
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translation(&self) -> Translation {
        self.translation
    }

    /// The same estimate with the translation expressed in pixels of an
    /// image `1 / factor` times as large.
    pub fn rescaled(&self, factor: f64) -> Result<Self> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(AlignError::AlignmentComputation(format!("invalid working-copy factor {}", factor)));
        }
        Self::new(self.rotation, self.scale, self.translation.scaled(1.0 / factor))
    }

    /// Inverse mapping that brings a target of the given `(height, width)`
    /// back onto the reference: undo the rotation about the image center,
    /// then undo the translation as seen in the de-rotated frame.
    pub fn alignment_warp(&self, shape: (usize, usize)) -> Warp {
        let residual = self.translation.rotated(-self.rotation);
        Warp::rotation(-self.rotation, image_center(shape)).then(Warp::translation(-residual.dx, -residual.dy))
    }
}

/// Wrap an angle into `[-180, 180)`.
pub fn wrap_degrees(angle: f64) -> f64 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// On-disk form of a [`TransformEstimate`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredTransform {
    rotation: f64,
    #[serde(rename = "shift x")]
    shift_x: f64,
    #[serde(rename = "shift y")]
    shift_y: f64,
    scale: f64,
}

impl TryFrom<StoredTransform> for TransformEstimate {
    type Error = AlignError;

    fn try_from(stored: StoredTransform) -> Result<Self> {
        TransformEstimate::new(stored.rotation, stored.scale, Translation::new(stored.shift_x, stored.shift_y))
    }
}

impl From<TransformEstimate> for StoredTransform {
    fn from(estimate: TransformEstimate) -> Self {
        Self {
            rotation: estimate.rotation,
            shift_x: estimate.translation.dx,
            shift_y: estimate.translation.dy,
            scale: estimate.scale,
        }
    }
}

/// Registration status of one target, populated by the batch service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AlignmentState {
    NotYetComputed,
    Failed { reason: String },
    Computed { transform: TransformEstimate },
}

impl AlignmentState {
    pub fn transform(&self) -> Option<&TransformEstimate> {
        match self {
            AlignmentState::Computed { transform } => Some(transform),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, AlignmentState::Computed { .. })
    }
}

/// A target whose registration or output failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageFailure {
    pub identity: String,
    pub error: String,
}

impl ImageFailure {
    pub fn new(identity: impl Into<String>, error: &AlignError) -> Self {
        Self {
            identity: identity.into(),
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_is_wrapped() {
        let t = TransformEstimate::new(190.0, 1.0, Translation::default()).unwrap();
        assert!((t.rotation() + 170.0).abs() < 1e-12);
        let t = TransformEstimate::new(180.0, 1.0, Translation::default()).unwrap();
        assert_eq!(t.rotation(), -180.0);
        let t = TransformEstimate::new(-180.0, 1.0, Translation::default()).unwrap();
        assert_eq!(t.rotation(), -180.0);
    }

    #[test]
    fn test_invariants() {
        assert!(TransformEstimate::new(f64::NAN, 1.0, Translation::default()).is_err());
        assert!(TransformEstimate::new(0.0, 0.0, Translation::default()).is_err());
        assert!(TransformEstimate::new(0.0, -2.0, Translation::default()).is_err());
        assert!(TransformEstimate::new(0.0, f64::INFINITY, Translation::default()).is_err());
        assert!(TransformEstimate::new(0.0, 1.0, Translation::new(f64::NAN, 0.0)).is_err());
    }

    #[test]
    fn test_cache_field_names() {
        let t = TransformEstimate::new(12.5, 1.1, Translation::new(3.0, -4.0)).unwrap();
        let value = serde_json::to_value(t).unwrap();
        assert_eq!(value["rotation"], 12.5);
        assert_eq!(value["shift x"], 3.0);
        assert_eq!(value["shift y"], -4.0);
        assert_eq!(value["scale"], 1.1);

        let bad = serde_json::json!({"rotation": 0.0, "shift x": 0.0, "shift y": 0.0, "scale": -1.0});
        assert!(serde_json::from_value::<TransformEstimate>(bad).is_err());
    }

    #[test]
    fn test_alignment_warp_inverts_the_model() {
        let t = TransformEstimate::new(25.0, 1.0, Translation::new(6.0, -2.0)).unwrap();
        let shape = (100, 120);
        let forward = Warp::rotation(25.0, image_center(shape)).then(Warp::translation(6.0, -2.0));
        let round_trip = forward.then(t.alignment_warp(shape));
        let (x, y) = round_trip.source(37.0, 58.0);
        assert!((x - 37.0).abs() < 1e-9 && (y - 58.0).abs() < 1e-9);
    }
}
