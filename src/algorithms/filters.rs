use ndarray::{Array2, Axis};
use std::f64::consts::PI;

/// Index into a line of length `n` with `d c b a | a b c d | d c b a`
/// boundary handling.
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 1 - m
    }
}

/// Index into a line of length `n` with `d c b | a b c d | c b a`
/// boundary handling.
fn mirror_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * n as isize - 2;
    let m = i.rem_euclid(period) as usize;
    if m < n {
        m
    } else {
        2 * n - 2 - m
    }
}

/// Normalized Gaussian kernel truncated at four standard deviations.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

fn convolve_axis(input: &Array2<f64>, kernel: &[f64], axis: Axis, index: fn(isize, usize) -> usize) -> Array2<f64> {
    let radius = kernel.len() / 2;
    let mut output = Array2::<f64>::zeros(input.raw_dim());
    let mut padded = Vec::new();

    for (src, mut dst) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let n = src.len();
        if n == 0 {
            continue;
        }
        padded.clear();
        padded.extend((0..n + 2 * radius).map(|p| src[index(p as isize - radius as isize, n)]));
        for (i, out) in dst.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .zip(&padded[i..i + kernel.len()])
                .map(|(w, v)| w * v)
                .sum();
        }
    }

    output
}

/// Separable Gaussian blur with reflected borders.
pub fn gaussian_blur(image: &Array2<f64>, sigma: f64) -> Array2<f64> {
    if sigma <= 0.0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let rows = convolve_axis(image, &kernel, Axis(1), reflect_index);
    convolve_axis(&rows, &kernel, Axis(0), reflect_index)
}

/// Band-pass: `blur(low_sigma) - blur(high_sigma)`.
pub fn difference_of_gaussians(image: &Array2<f64>, low_sigma: f64, high_sigma: f64) -> Array2<f64> {
    let low = gaussian_blur(image, low_sigma);
    let high = gaussian_blur(image, high_sigma);
    low - high
}

/// Radially symmetric Hann window matched to `shape`.
///
/// The window is 1 at the image center and falls to 0 on the ellipse
/// inscribed in the image, so it commutes with rotations about the center.
pub fn hann_window(shape: (usize, usize)) -> Array2<f64> {
    let (height, width) = shape;
    let cy = height as f64 / 2.0;
    let cx = width as f64 / 2.0;
    Array2::from_shape_fn(shape, |(y, x)| {
        let ry = (y as f64 - cy) / cy.max(0.5);
        let rx = (x as f64 - cx) / cx.max(0.5);
        let r = ry.hypot(rx);
        if r >= 1.0 {
            0.0
        } else {
            0.5 * (1.0 + (PI * r).cos())
        }
    })
}

/// Mean over a `(2 * radius + 1)^2` window with mirrored borders.
pub fn box_filter(image: &Array2<f64>, radius: usize) -> Array2<f64> {
    let size = 2 * radius + 1;
    let kernel = vec![1.0 / size as f64; size];
    let rows = convolve_axis(image, &kernel, Axis(1), mirror_index);
    convolve_axis(&rows, &kernel, Axis(0), mirror_index)
}

/// Central differences inside, one-sided differences on the border.
/// Returns `(d/dy, d/dx)`.
pub fn gradient(image: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    (gradient_axis(image, Axis(0)), gradient_axis(image, Axis(1)))
}

fn gradient_axis(image: &Array2<f64>, axis: Axis) -> Array2<f64> {
    let mut output = Array2::<f64>::zeros(image.raw_dim());
    for (src, mut dst) in image.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let n = src.len();
        if n < 2 {
            continue;
        }
        dst[0] = src[1] - src[0];
        dst[n - 1] = src[n - 1] - src[n - 2];
        for i in 1..n - 1 {
            dst[i] = 0.5 * (src[i + 1] - src[i - 1]);
        }
    }
    output
}

/// Halve an image: Gaussian pre-smoothing, then bilinear sampling at the
/// centers of 2x2 blocks.
pub fn pyramid_reduce(image: &Array2<f64>) -> Array2<f64> {
    let (height, width) = image.dim();
    let smoothed = gaussian_blur(image, 2.0 * 2.0 / 6.0);
    let out_h = height.div_ceil(2);
    let out_w = width.div_ceil(2);
    Array2::from_shape_fn((out_h, out_w), |(y, x)| {
        let sy = (2.0 * y as f64 + 0.5).min((height - 1) as f64);
        let sx = (2.0 * x as f64 + 0.5).min((width - 1) as f64);
        crate::data::sample_bilinear(smoothed.view(), sx, sy, crate::data::Border::Edge)
    })
}
