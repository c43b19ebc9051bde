use crate::data::{sample_bilinear, Border};
use crate::{AlignError, Result};
use ndarray::Array2;
use std::f64::consts::TAU;

/// Log-polar resampling of a centered spectrum.
///
/// Row `i` holds the angle `i * 360 / angular_rows` degrees, measured from
/// +x towards +y. Column `j` holds the radius `exp(j / klog)` with
/// `klog = radius / ln(radius)`, so the `radius` columns span radii
/// `[1, radius)`. Samples outside the input are zero.
pub fn warp_log_polar(image: &Array2<f64>, radius: usize, angular_rows: usize) -> Result<Array2<f64>> {
    if radius <= 1 {
        return Err(AlignError::DegenerateRadius { radius });
    }

    let (height, width) = image.dim();
    let cy = height as f64 / 2.0;
    let cx = width as f64 / 2.0;
    let klog = log_scale(radius);
    let angle_step = TAU / angular_rows as f64;

    let radii: Vec<f64> = (0..radius).map(|j| (j as f64 / klog).exp()).collect();

    let mut output = Array2::<f64>::zeros((angular_rows, radius));
    for (i, mut row) in output.rows_mut().into_iter().enumerate() {
        let (sin_a, cos_a) = (i as f64 * angle_step).sin_cos();
        for (out, rho) in row.iter_mut().zip(&radii) {
            *out = sample_bilinear(
                image.view(),
                cx + rho * cos_a,
                cy + rho * sin_a,
                Border::Constant(0.0),
            );
        }
    }

    Ok(output)
}

/// Columns per unit of natural-log radius.
pub fn log_scale(radius: usize) -> f64 {
    radius as f64 / (radius as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_radius() {
        let image = Array2::<f64>::zeros((8, 8));
        assert!(matches!(
            warp_log_polar(&image, 1, 8),
            Err(AlignError::DegenerateRadius { radius: 1 })
        ));
    }

    #[test]
    fn test_ring_maps_to_column() {
        // A ring of radius 10 about the center becomes a vertical line.
        let image = Array2::from_shape_fn((64, 64), |(y, x)| {
            let r = ((y as f64 - 32.0).powi(2) + (x as f64 - 32.0).powi(2)).sqrt();
            (-(r - 10.0).powi(2) / 2.0).exp()
        });
        let warped = warp_log_polar(&image, 16, 64).unwrap();
        let expected_col = (10.0_f64.ln() * log_scale(16)).round() as usize;
        for row in warped.rows() {
            let best = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(j, _)| j)
                .unwrap();
            assert!((best as isize - expected_col as isize).abs() <= 1);
        }
    }
}
