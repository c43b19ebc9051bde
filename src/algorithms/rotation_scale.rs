use super::log_polar::{log_scale, warp_log_polar};
use super::phase_correlation::{phase_cross_correlation, Normalization};
use super::spectrum::GraySpectrum;
use crate::{AlignError, Result};
use ndarray::s;

/// Rotation and isotropic scale recovered from two magnitude spectra.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationScale {
    /// Recovered angle in degrees. A target whose content was rotated by
    /// `+θ` (clockwise on screen) relative to the reference yields `-θ`.
    pub angle_deg: f64,
    /// Magnification of the reference relative to the target.
    pub scale: f64,
}

/// Log-polar phase correlation of Fourier magnitude spectra.
///
/// Only the first half of the angular rows is compared: the magnitude
/// spectrum of a real image is point symmetric, so the second half repeats
/// the first and would only add a 180° ambiguity.
#[derive(Debug, Clone)]
pub struct RotationScaleEstimator {
    radius_divisor: usize,
    upsample_factor: usize,
    normalization: Normalization,
}

impl Default for RotationScaleEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationScaleEstimator {
    pub fn new() -> Self {
        Self {
            radius_divisor: 8,
            upsample_factor: 10,
            normalization: Normalization::None,
        }
    }

    /// The log-polar radius is `height / radius_divisor`.
    pub fn with_radius_divisor(mut self, radius_divisor: usize) -> Self {
        self.radius_divisor = radius_divisor.max(1);
        self
    }

    pub fn with_upsample_factor(mut self, upsample_factor: usize) -> Self {
        self.upsample_factor = upsample_factor.max(1);
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn estimate(&self, reference: &GraySpectrum, target: &GraySpectrum) -> Result<RotationScale> {
        if reference.dim() != target.dim() {
            return Err(AlignError::Shape(format!(
                "spectra differ in shape: {:?} vs {:?}",
                reference.dim(),
                target.dim()
            )));
        }

        let rows = reference.dim().0;
        let radius = rows / self.radius_divisor;
        if radius <= 1 {
            return Err(AlignError::DegenerateRadius { radius });
        }

        let half = rows / 2;
        let warped_reference = warp_log_polar(reference.magnitude(), radius, rows)?
            .slice_move(s![..half, ..]);
        let warped_target = warp_log_polar(target.magnitude(), radius, rows)?
            .slice_move(s![..half, ..]);

        let correlation = phase_cross_correlation(
            &warped_reference,
            &warped_target,
            self.upsample_factor,
            self.normalization,
        )?;
        let (shift_rows, shift_cols) = correlation.shift;

        let klog = log_scale(radius);
        let angle_deg = (360.0 / rows as f64) * shift_rows;
        let scale = 1.0 / (shift_cols / klog).exp();

        tracing::debug!(
            radius,
            shift_rows,
            shift_cols,
            angle_deg,
            scale,
            peak = correlation.peak,
            "Log-polar correlation"
        );

        if !angle_deg.is_finite() || !scale.is_finite() || scale <= 0.0 {
            return Err(AlignError::AlignmentComputation(format!(
                "rotation/scale estimate is not finite (angle {}, scale {})",
                angle_deg, scale
            )));
        }

        Ok(RotationScale { angle_deg, scale })
    }
}

/// Angle (degrees) and scale between two spectra, using a log-polar radius
/// of an eighth of the height and 10x upsampled correlation.
pub fn estimate_rotation_scale(reference: &GraySpectrum, target: &GraySpectrum) -> Result<(f64, f64)> {
    let estimate = RotationScaleEstimator::new().estimate(reference, target)?;
    Ok((estimate.angle_deg, estimate.scale))
}
