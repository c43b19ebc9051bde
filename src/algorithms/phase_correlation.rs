//! Translation estimate between two equally sized planes from the peak of
//! their cross-correlation, refined by a locally upsampled DFT
//! (Guizar-Sicairos, Thurman & Fienup, Optics Letters 33(2), 2008).

use super::fft::{compute_2d_fft, compute_2d_ifft, real_to_complex, signed_frequency, Complex64};
use crate::{AlignError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// How the cross-power spectrum is weighted before the inverse transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Plain cross-correlation.
    #[default]
    None,
    /// Phase-only correlation (unit magnitude cross-power).
    Phase,
}

/// Outcome of a phase cross-correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseShift {
    /// Shift `(rows, cols)` that registers the moving plane onto the
    /// reference: `moving(p) = reference(p - d)` yields `-d`.
    pub shift: (f64, f64),
    /// Magnitude of the correlation peak.
    pub peak: f64,
}

/// Shift that registers `moving` onto `reference`, refined to
/// `1 / upsample_factor` of a pixel. A factor of 1 returns the integer peak.
pub fn phase_cross_correlation(
    reference: &Array2<f64>,
    moving: &Array2<f64>,
    upsample_factor: usize,
    normalization: Normalization,
) -> Result<PhaseShift> {
    if reference.dim() != moving.dim() {
        return Err(AlignError::Shape(format!(
            "cannot correlate {:?} with {:?}",
            reference.dim(),
            moving.dim()
        )));
    }
    let (height, width) = reference.dim();
    if height == 0 || width == 0 {
        return Err(AlignError::Shape("cannot correlate empty planes".to_string()));
    }

    let reference_fft = compute_2d_fft(&real_to_complex(reference));
    let moving_fft = compute_2d_fft(&real_to_complex(moving));
    let cross_power = compute_cross_power_spectrum(&reference_fft, &moving_fft, normalization);
    let correlation = compute_2d_ifft(&cross_power);

    let (peak_row, peak_col, coarse_peak) = find_correlation_peak(&correlation);
    let mut shift = (
        wrap_shift(peak_row, height),
        wrap_shift(peak_col, width),
    );

    if upsample_factor <= 1 {
        return Ok(PhaseShift {
            shift,
            peak: coarse_peak,
        });
    }

    let up = upsample_factor as f64;
    shift = ((shift.0 * up).round() / up, (shift.1 * up).round() / up);
    let region = (up * 1.5).ceil() as usize;
    let center = (region / 2) as f64;

    let upsampled = upsampled_correlation(&cross_power, shift, region, up);
    let (best_row, best_col, peak) = find_correlation_peak(&upsampled);
    // The matrix DFT is unnormalized, match the scale of the coarse peak.
    let peak = peak / (height * width) as f64;

    shift.0 += (best_row as f64 - center) / up;
    shift.1 += (best_col as f64 - center) / up;

    Ok(PhaseShift { shift, peak })
}

/// Peaks past the midpoint are negative shifts.
fn wrap_shift(peak: usize, n: usize) -> f64 {
    if peak > n / 2 {
        peak as f64 - n as f64
    } else {
        peak as f64
    }
}

fn compute_cross_power_spectrum(
    fft1: &Array2<Complex64>,
    fft2: &Array2<Complex64>,
    normalization: Normalization,
) -> Array2<Complex64> {
    let mut result = Array2::<Complex64>::zeros(fft1.raw_dim());
    ndarray::Zip::from(&mut result)
        .and(fft1)
        .and(fft2)
        .for_each(|out, f1, f2| {
            let product = f1 * f2.conj();
            *out = match normalization {
                Normalization::None => product,
                Normalization::Phase => {
                    let magnitude = product.norm();
                    if magnitude > 1e-10 {
                        product / magnitude
                    } else {
                        Complex64::new(0.0, 0.0)
                    }
                }
            };
        });
    result
}

fn find_correlation_peak(correlation: &Array2<Complex64>) -> (usize, usize, f64) {
    let mut max_val = f64::NEG_INFINITY;
    let mut peak = (0, 0);

    for ((y, x), value) in correlation.indexed_iter() {
        let magnitude = value.norm();
        if magnitude > max_val {
            max_val = magnitude;
            peak = (y, x);
        }
    }

    (peak.0, peak.1, max_val)
}

/// Inverse DFT of `cross_power` evaluated on a `region x region` grid with
/// spacing `1 / up`, centered on `shift`.
fn upsampled_correlation(
    cross_power: &Array2<Complex64>,
    shift: (f64, f64),
    region: usize,
    up: f64,
) -> Array2<Complex64> {
    let (height, width) = cross_power.dim();
    let center = (region / 2) as f64;

    let row_pos: Vec<f64> = (0..region).map(|r| shift.0 + (r as f64 - center) / up).collect();
    let col_pos: Vec<f64> = (0..region).map(|c| shift.1 + (c as f64 - center) / up).collect();

    let col_kernel = Array2::from_shape_fn((width, region), |(v, c)| {
        let phase = TAU * col_pos[c] * signed_frequency(v, width) / width as f64;
        Complex64::new(phase.cos(), phase.sin())
    });
    let row_kernel = Array2::from_shape_fn((region, height), |(r, u)| {
        let phase = TAU * row_pos[r] * signed_frequency(u, height) / height as f64;
        Complex64::new(phase.cos(), phase.sin())
    });

    // (region x height) . (height x width) . (width x region)
    row_kernel.dot(cross_power).dot(&col_kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_field(height: usize, width: usize, dy: f64, dx: f64) -> Array2<f64> {
        let centers = [(22.0, 20.0, 3.0), (40.0, 44.0, 4.0), (14.0, 48.0, 2.5), (46.0, 24.0, 3.5)];
        Array2::from_shape_fn((height, width), |(y, x)| {
            centers
                .iter()
                .map(|&(cy, cx, s)| {
                    let ry = y as f64 - cy - dy;
                    let rx = x as f64 - cx - dx;
                    (-(ry * ry + rx * rx) / (2.0 * s * s)).exp()
                })
                .sum()
        })
    }

    #[test]
    fn test_identical_planes_have_zero_shift() {
        let a = blob_field(64, 64, 0.0, 0.0);
        let result = phase_cross_correlation(&a, &a, 10, Normalization::None).unwrap();
        assert!(result.shift.0.abs() < 1e-9);
        assert!(result.shift.1.abs() < 1e-9);
    }

    #[test]
    fn test_recovers_negated_subpixel_shift() {
        let reference = blob_field(64, 64, 0.0, 0.0);
        let moving = blob_field(64, 64, 3.3, -5.6);
        for normalization in [Normalization::None, Normalization::Phase] {
            let result = phase_cross_correlation(&reference, &moving, 10, normalization).unwrap();
            assert!((result.shift.0 + 3.3).abs() < 0.15, "{:?}", result);
            assert!((result.shift.1 - 5.6).abs() < 0.15, "{:?}", result);
        }
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::zeros((8, 8));
        let b = Array2::<f64>::zeros((8, 9));
        assert!(matches!(
            phase_cross_correlation(&a, &b, 1, Normalization::None),
            Err(AlignError::Shape(_))
        ));
    }
}
