//! Dense iterative Lucas-Kanade (ILK) optical flow on a Gaussian pyramid.

use super::filters::{box_filter, gradient, pyramid_reduce};
use crate::data::{sample_bilinear, Border};
use crate::{AlignError, Result};
use ndarray::{Array2, Zip};

/// Per-pixel motion with a mask of positions whose local structure tensor
/// was well conditioned on the last iteration.
///
/// The flow satisfies `reference(p) ≈ moving(p + flow(p))`.
#[derive(Debug, Clone)]
pub struct FlowField {
    pub dy: Array2<f64>,
    pub dx: Array2<f64>,
    pub valid: Array2<bool>,
}

impl FlowField {
    fn zeros(shape: (usize, usize)) -> Self {
        Self {
            dy: Array2::zeros(shape),
            dx: Array2::zeros(shape),
            valid: Array2::from_elem(shape, false),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dy.dim()
    }

    /// Positions that are valid and, when given, also set in `mask`.
    fn selected<'a>(&'a self, mask: Option<&'a Array2<bool>>) -> impl Iterator<Item = (f64, f64)> + 'a {
        self.valid
            .indexed_iter()
            .filter(move |&(idx, &ok)| ok && mask.map_or(true, |m| m[idx]))
            .map(move |(idx, _)| (self.dy[idx], self.dx[idx]))
    }

    /// Mean `(dy, dx)` over the selected positions, `None` when there are none.
    pub fn mean(&self, mask: Option<&Array2<bool>>) -> Option<(f64, f64)> {
        let (count, sum_y, sum_x) = self
            .selected(mask)
            .fold((0usize, 0.0, 0.0), |(n, sy, sx), (dy, dx)| (n + 1, sy + dy, sx + dx));
        if count == 0 {
            return None;
        }
        Some((sum_y / count as f64, sum_x / count as f64))
    }

    /// Per-axis standard deviation `(dy, dx)` over the selected positions.
    pub fn std_dev(&self, mask: Option<&Array2<bool>>) -> Option<(f64, f64)> {
        let (mean_y, mean_x) = self.mean(mask)?;
        let (count, var_y, var_x) = self.selected(mask).fold((0usize, 0.0, 0.0), |(n, vy, vx), (dy, dx)| {
            (n + 1, vy + (dy - mean_y).powi(2), vx + (dx - mean_x).powi(2))
        });
        Some(((var_y / count as f64).sqrt(), (var_x / count as f64).sqrt()))
    }

    /// Fraction of all positions that are selected.
    pub fn coverage(&self, mask: Option<&Array2<bool>>) -> f64 {
        let total = self.dy.len();
        if total == 0 {
            return 0.0;
        }
        self.selected(mask).count() as f64 / total as f64
    }
}

/// Iterative Lucas-Kanade solver.
#[derive(Debug, Clone)]
pub struct IlkFlow {
    /// Half-size of the square integration window.
    pub radius: usize,
    /// Warp/solve iterations per pyramid level.
    pub num_warp: usize,
    /// Maximum number of pyramid levels, including full resolution.
    pub levels: usize,
    /// Coarse levels are not built below this size on either axis.
    pub min_size: usize,
}

impl Default for IlkFlow {
    fn default() -> Self {
        Self {
            radius: 7,
            num_warp: 10,
            levels: 4,
            min_size: 16,
        }
    }
}

// Structure tensors with det < COND * trace^2 are treated as aperture-limited.
const COND: f64 = 1e-3;
const MIN_TRACE: f64 = 1e-9;

impl IlkFlow {
    pub fn compute(&self, reference: &Array2<f64>, moving: &Array2<f64>) -> Result<FlowField> {
        if reference.dim() != moving.dim() {
            return Err(AlignError::Flow(format!(
                "reference is {:?} but moving image is {:?}",
                reference.dim(),
                moving.dim()
            )));
        }
        let (h, w) = reference.dim();
        if h == 0 || w == 0 {
            return Err(AlignError::Flow("empty input".to_string()));
        }

        let mut pyramid = vec![(reference.clone(), moving.clone())];
        while pyramid.len() < self.levels.max(1) {
            let Some((r, m)) = pyramid.last() else { break };
            let (lh, lw) = r.dim();
            if lh.div_ceil(2) < self.min_size || lw.div_ceil(2) < self.min_size {
                break;
            }
            let next = (pyramid_reduce(r), pyramid_reduce(m));
            pyramid.push(next);
        }

        tracing::trace!(levels = pyramid.len(), height = h, width = w, "Flow pyramid built");

        let mut flow: Option<FlowField> = None;
        for (level_ref, level_moving) in pyramid.iter().rev() {
            let init = match flow.take() {
                Some(coarse) => upscale_flow(&coarse, level_ref.dim()),
                None => FlowField::zeros(level_ref.dim()),
            };
            flow = Some(self.solve_level(level_ref, level_moving, init));
        }

        flow.ok_or_else(|| AlignError::Flow("no pyramid levels".to_string()))
    }

    fn solve_level(&self, reference: &Array2<f64>, moving: &Array2<f64>, mut flow: FlowField) -> FlowField {
        for _ in 0..self.num_warp.max(1) {
            let warped = Array2::from_shape_fn(reference.raw_dim(), |(y, x)| {
                sample_bilinear(
                    moving.view(),
                    x as f64 + flow.dx[[y, x]],
                    y as f64 + flow.dy[[y, x]],
                    Border::Edge,
                )
            });
            let (gy, gx) = gradient(&warped);

            let mut error = &gy * &flow.dy + &gx * &flow.dx;
            Zip::from(&mut error)
                .and(reference)
                .and(&warped)
                .for_each(|e, &r, &m| *e += r - m);

            let a11 = box_filter(&(&gy * &gy), self.radius);
            let a12 = box_filter(&(&gy * &gx), self.radius);
            let a22 = box_filter(&(&gx * &gx), self.radius);
            let b1 = box_filter(&(&gy * &error), self.radius);
            let b2 = box_filter(&(&gx * &error), self.radius);

            for ((y, x), ok) in flow.valid.indexed_iter_mut() {
                let (a11, a12, a22) = (a11[[y, x]], a12[[y, x]], a22[[y, x]]);
                let det = a11 * a22 - a12 * a12;
                let trace = a11 + a22;
                *ok = trace > MIN_TRACE && det > COND * trace * trace;
                if *ok {
                    let (b1, b2) = (b1[[y, x]], b2[[y, x]]);
                    flow.dy[[y, x]] = (a22 * b1 - a12 * b2) / det;
                    flow.dx[[y, x]] = (a11 * b2 - a12 * b1) / det;
                }
            }
        }
        flow
    }
}

/// Resample a coarse flow onto a finer grid, rescaling the vectors.
fn upscale_flow(coarse: &FlowField, shape: (usize, usize)) -> FlowField {
    let (ch, cw) = coarse.dim();
    let (h, w) = shape;
    let sy = ch as f64 / h as f64;
    let sx = cw as f64 / w as f64;

    let resample = |plane: &Array2<f64>, factor: f64| {
        Array2::from_shape_fn(shape, |(y, x)| {
            let cy = (y as f64 + 0.5) * sy - 0.5;
            let cx = (x as f64 + 0.5) * sx - 0.5;
            factor * sample_bilinear(plane.view(), cx, cy, Border::Edge)
        })
    };

    FlowField {
        dy: resample(&coarse.dy, 1.0 / sy),
        dx: resample(&coarse.dx, 1.0 / sx),
        valid: Array2::from_elem(shape, false),
    }
}

/// Dense flow from `reference` to `moving` with a radius-7 window and default
/// pyramid settings.
pub fn optical_flow(reference: &Array2<f64>, moving: &Array2<f64>) -> Result<FlowField> {
    IlkFlow::default().compute(reference, moving)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(size: usize, ox: f64, oy: f64) -> Array2<f64> {
        Array2::from_shape_fn((size, size), |(y, x)| {
            let (y, x) = (y as f64 - oy, x as f64 - ox);
            100.0 + 40.0 * (x * 0.21).sin() * (y * 0.17).cos() + 30.0 * ((x + 2.0 * y) * 0.09).sin()
        })
    }

    #[test]
    fn test_recovers_uniform_shift() {
        let reference = texture(96, 0.0, 0.0);
        let moving = texture(96, 2.5, -1.5);
        let flow = optical_flow(&reference, &moving).unwrap();

        let interior = Array2::from_shape_fn((96, 96), |(y, x)| (16..80).contains(&y) && (16..80).contains(&x));
        let (dy, dx) = flow.mean(Some(&interior)).unwrap();
        assert!((dx - 2.5).abs() < 0.2, "dx = {}", dx);
        assert!((dy + 1.5).abs() < 0.2, "dy = {}", dy);
        assert!(flow.coverage(Some(&interior)) > 0.1);
    }

    #[test]
    fn test_flat_images_have_no_valid_positions() {
        let flat = Array2::from_elem((32, 32), 7.0);
        let flow = optical_flow(&flat, &flat).unwrap();
        assert_eq!(flow.mean(None), None);
        assert_eq!(flow.coverage(None), 0.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Array2::<f64>::zeros((16, 16));
        let b = Array2::<f64>::zeros((16, 17));
        assert!(matches!(optical_flow(&a, &b), Err(AlignError::Flow(_))));
    }
}
