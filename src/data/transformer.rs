use super::raster::RasterImage;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

/// How samples falling outside the source are resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Border {
    /// Constant fill value.
    Constant(f64),
    /// Repeat the nearest edge pixel.
    Edge,
}

/// Inverse mapping from output pixel coordinates to source coordinates.
///
/// Coordinates are `(x, y)` with `y` pointing down. Constructors describe the
/// forward motion of the image content; the stored matrix is its inverse so
/// that every output pixel is pulled from exactly one source location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Warp {
    m: [[f64; 3]; 2],
}

impl Default for Warp {
    fn default() -> Self {
        Self::identity()
    }
}

impl Warp {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Content rotated by `angle_degrees` about `center`. Positive angles
    /// turn +x towards +y, i.e. clockwise on screen.
    pub fn rotation(angle_degrees: f64, center: (f64, f64)) -> Self {
        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        let (cx, cy) = center;
        Self {
            m: [
                [cos_a, sin_a, cx - (cos_a * cx + sin_a * cy)],
                [-sin_a, cos_a, cy - (-sin_a * cx + cos_a * cy)],
            ],
        }
    }

    /// Content moved by `(dx, dy)` pixels.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            m: [[1.0, 0.0, -dx], [0.0, 1.0, -dy]],
        }
    }

    /// Content magnified by `factor` about `center`.
    pub fn scaling(factor: f64, center: (f64, f64)) -> Self {
        let inv = 1.0 / factor;
        let (cx, cy) = center;
        Self {
            m: [[inv, 0.0, cx - inv * cx], [0.0, inv, cy - inv * cy]],
        }
    }

    /// Apply `self` first, then `next`.
    pub fn then(self, next: Warp) -> Warp {
        let a = self.m;
        let b = next.m;
        // source(p) = a(b(p))
        let mut m = [[0.0; 3]; 2];
        for (r, row) in m.iter_mut().enumerate() {
            row[0] = a[r][0] * b[0][0] + a[r][1] * b[1][0];
            row[1] = a[r][0] * b[0][1] + a[r][1] * b[1][1];
            row[2] = a[r][0] * b[0][2] + a[r][1] * b[1][2] + a[r][2];
        }
        Warp { m }
    }

    /// Source location sampled for output pixel `(x, y)`.
    pub fn source(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.m[0][2],
            self.m[1][0] * x + self.m[1][1] * y + self.m[1][2],
        )
    }

    /// Resample a single plane; the output keeps the input's shape.
    pub fn apply(&self, image: ArrayView2<f64>, border: Border) -> Array2<f64> {
        Array2::from_shape_fn(image.raw_dim(), |(y, x)| {
            let (sx, sy) = self.source(x as f64, y as f64);
            sample_bilinear(image, sx, sy, border)
        })
    }

    /// Resample every channel of a raster with the same geometry.
    pub fn apply_raster(&self, image: ArrayView3<f32>, fill: f32) -> RasterImage {
        let (h, w, c) = image.dim();
        let mut out = Array3::<f32>::from_elem((h, w, c), fill);
        for y in 0..h {
            for x in 0..w {
                let (sx, sy) = self.source(x as f64, y as f64);
                let Some(taps) = bilinear_taps(w, h, sx, sy) else {
                    continue;
                };
                for ch in 0..c {
                    let value: f64 = taps
                        .iter()
                        .map(|&(ty, tx, wt)| wt * f64::from(image[[ty, tx, ch]]))
                        .sum();
                    out[[y, x, ch]] = value as f32;
                }
            }
        }
        out
    }
}

/// Geometric center used for rotations and scalings of a `(height, width)`
/// plane, as `(x, y)`.
pub fn image_center(shape: (usize, usize)) -> (f64, f64) {
    (shape.1 as f64 / 2.0, shape.0 as f64 / 2.0)
}

/// The four bilinear taps `(row, col, weight)` for a point inside the image.
fn bilinear_taps(width: usize, height: usize, x: f64, y: f64) -> Option<[(usize, usize, f64); 4]> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    if !(0.0..=max_x).contains(&x) || !(0.0..=max_y).contains(&y) {
        return None;
    }

    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let fx = x - x1 as f64;
    let fy = y - y1 as f64;

    Some([
        (y1, x1, (1.0 - fx) * (1.0 - fy)),
        (y1, x2, fx * (1.0 - fy)),
        (y2, x1, (1.0 - fx) * fy),
        (y2, x2, fx * fy),
    ])
}

/// Bilinear interpolation at `(x, y)`.
pub fn sample_bilinear(image: ArrayView2<f64>, x: f64, y: f64, border: Border) -> f64 {
    let (height, width) = image.dim();
    let (x, y) = match border {
        Border::Constant(_) => (x, y),
        Border::Edge => (
            x.clamp(0.0, width.saturating_sub(1) as f64),
            y.clamp(0.0, height.saturating_sub(1) as f64),
        ),
    };

    match bilinear_taps(width, height, x, y) {
        Some(taps) => taps.iter().map(|&(ty, tx, w)| w * image[[ty, tx]]).sum(),
        None => match border {
            Border::Constant(fill) => fill,
            Border::Edge => 0.0,
        },
    }
}

/// Synthetic geometric transforms on gray planes, used to build test data
/// with a known ground truth and to undo estimated rotations.
pub struct ImageTransformer;

impl ImageTransformer {
    /// Rotate content by `angle_degrees` about the image center, zero fill.
    pub fn rotate(image: &Array2<f64>, angle_degrees: f64) -> Array2<f64> {
        Warp::rotation(angle_degrees, image_center(image.dim())).apply(image.view(), Border::Constant(0.0))
    }

    /// Move content by `(dx, dy)` pixels, zero fill.
    pub fn translate(image: &Array2<f64>, dx: f64, dy: f64) -> Array2<f64> {
        Warp::translation(dx, dy).apply(image.view(), Border::Constant(0.0))
    }

    /// Magnify content by `factor` about the image center, zero fill.
    pub fn scale(image: &Array2<f64>, factor: f64) -> Array2<f64> {
        Warp::scaling(factor, image_center(image.dim())).apply(image.view(), Border::Constant(0.0))
    }

    /// Rotate, then translate, with a single resampling pass.
    pub fn rotate_and_translate(image: &Array2<f64>, angle_degrees: f64, dx: f64, dy: f64) -> Array2<f64> {
        Warp::rotation(angle_degrees, image_center(image.dim()))
            .then(Warp::translation(dx, dy))
            .apply(image.view(), Border::Constant(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_moves_content() {
        let mut image = Array2::<f64>::zeros((9, 9));
        image[[4, 4]] = 1.0;
        let moved = ImageTransformer::translate(&image, 2.0, -1.0);
        assert!((moved[[3, 6]] - 1.0).abs() < 1e-12);
        assert_eq!(moved[[4, 4]], 0.0);
    }

    #[test]
    fn test_rotation_quarter_turn_is_clockwise_on_screen() {
        let mut image = Array2::<f64>::zeros((9, 9));
        // right of center
        image[[4, 7]] = 1.0;
        let center = (4.0, 4.0);
        let rotated = Warp::rotation(90.0, center).apply(image.view(), Border::Constant(0.0));
        // +x turns towards +y: the dot ends up below the center
        assert!((rotated[[7, 4]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_then_composes_in_order() {
        let combined = Warp::rotation(30.0, (10.0, 10.0)).then(Warp::translation(3.0, 4.0));
        let rot = Warp::rotation(30.0, (10.0, 10.0));
        let tr = Warp::translation(3.0, 4.0);
        let (ix, iy) = tr.source(12.0, 7.0);
        let expected = rot.source(ix, iy);
        let got = combined.source(12.0, 7.0);
        assert!((expected.0 - got.0).abs() < 1e-12);
        assert!((expected.1 - got.1).abs() < 1e-12);
    }

    #[test]
    fn test_edge_border_clamps() {
        let image = Array2::from_shape_fn((3, 3), |(y, x)| (y * 3 + x) as f64);
        assert_eq!(sample_bilinear(image.view(), -5.0, 1.0, Border::Edge), 3.0);
        assert_eq!(sample_bilinear(image.view(), -5.0, 1.0, Border::Constant(-1.0)), -1.0);
    }
}
