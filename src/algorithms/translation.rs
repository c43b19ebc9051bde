use super::filters::box_filter;
use super::optical_flow::IlkFlow;
use crate::data::{image_center, Border, Warp};
use crate::{AlignError, Result};
use ndarray::Array2;

/// Global translation after rotation correction, with diagnostics about how
/// well a single rigid shift explains the flow field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationEstimate {
    /// Mean horizontal content displacement of the de-rotated target.
    pub dx: f64,
    /// Mean vertical content displacement of the de-rotated target.
    pub dy: f64,
    /// Standard deviation of the flow, `(x, y)`.
    pub spread: (f64, f64),
    /// Fraction of positions that contributed to the mean.
    pub coverage: f64,
}

impl TranslationEstimate {
    /// Large spread means the residual motion is not a rigid translation.
    pub fn is_rigid(&self, max_spread: f64) -> bool {
        self.spread.0 <= max_spread && self.spread.1 <= max_spread
    }
}

#[derive(Debug, Clone)]
pub struct TranslationRefiner {
    flow: IlkFlow,
    max_spread: f64,
}

impl Default for TranslationRefiner {
    fn default() -> Self {
        Self::new(IlkFlow::default())
    }
}

impl TranslationRefiner {
    pub fn new(flow: IlkFlow) -> Self {
        Self { flow, max_spread: 2.0 }
    }

    /// Spread (pixels) above which a warning is logged.
    pub fn with_max_spread(mut self, max_spread: f64) -> Self {
        self.max_spread = max_spread;
        self
    }

    /// Undo `rotation_deg` on the target and average the optical flow
    /// between the reference and the de-rotated target.
    pub fn estimate(
        &self,
        gray_reference: &Array2<f64>,
        gray_target: &Array2<f64>,
        rotation_deg: f64,
    ) -> Result<TranslationEstimate> {
        if gray_reference.dim() != gray_target.dim() {
            return Err(AlignError::Flow(format!(
                "reference is {:?} but target is {:?}",
                gray_reference.dim(),
                gray_target.dim()
            )));
        }

        let undo = Warp::rotation(-rotation_deg, image_center(gray_target.dim()));
        let derotated = undo.apply(gray_target.view(), Border::Constant(0.0));
        let field = self.flow.compute(gray_reference, &derotated)?;

        // Skip positions whose window reaches into the fill left by the rotation.
        let footprint = undo.apply(Array2::from_elem(gray_target.raw_dim(), 1.0).view(), Border::Constant(0.0));
        let inside = footprint.mapv(|v| if v > 0.999 { 1.0 } else { 0.0 });
        let mask = box_filter(&inside, self.flow.radius).mapv(|v| v > 1.0 - 1e-9);

        let (dy, dx) = field.mean(Some(&mask)).ok_or_else(|| {
            AlignError::AlignmentComputation("optical flow has no well-conditioned positions".to_string())
        })?;
        let (sy, sx) = field.std_dev(Some(&mask)).unwrap_or((0.0, 0.0));
        let coverage = field.coverage(Some(&mask));

        if !dx.is_finite() || !dy.is_finite() {
            return Err(AlignError::AlignmentComputation(format!(
                "translation is not finite ({}, {})",
                dx, dy
            )));
        }

        let estimate = TranslationEstimate {
            dx,
            dy,
            spread: (sx, sy),
            coverage,
        };
        if !estimate.is_rigid(self.max_spread) {
            tracing::warn!(
                spread_x = sx,
                spread_y = sy,
                max_spread = self.max_spread,
                "Flow field is far from a rigid translation; the mean shift may be unreliable"
            );
        }
        tracing::debug!(dx, dy, spread_x = sx, spread_y = sy, coverage, "Translation refined");

        Ok(estimate)
    }
}

/// Residual shift of `gray_target` once `rotation_deg` is undone, using the
/// default flow solver.
///
/// The shift is the mean flow over well-conditioned positions whose whole
/// integration window lies inside the de-rotated target's footprint, so the
/// corners filled by the rotation never contribute.
pub fn estimate_translation(
    gray_reference: &Array2<f64>,
    gray_target: &Array2<f64>,
    rotation_deg: f64,
) -> Result<TranslationEstimate> {
    TranslationRefiner::default().estimate(gray_reference, gray_target, rotation_deg)
}
