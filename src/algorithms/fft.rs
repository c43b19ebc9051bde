use ndarray::Array2;
use num_complex::Complex;
use rustfft::FftPlanner;

pub type Complex64 = Complex<f64>;

pub fn real_to_complex(input: &Array2<f64>) -> Array2<Complex64> {
    input.mapv(|v| Complex64::new(v, 0.0))
}

/// Forward 2-D DFT (rows, then columns).
pub fn compute_2d_fft(input: &Array2<Complex64>) -> Array2<Complex64> {
    transform_2d(input, false)
}

/// Inverse 2-D DFT, normalized by `1 / (height * width)`.
pub fn compute_2d_ifft(input: &Array2<Complex64>) -> Array2<Complex64> {
    let (height, width) = input.dim();
    let scale = 1.0 / (height * width).max(1) as f64;
    let mut result = transform_2d(input, true);
    result.mapv_inplace(|v| v * scale);
    result
}

fn transform_2d(input: &Array2<Complex64>, inverse: bool) -> Array2<Complex64> {
    let (height, width) = input.dim();
    let mut result = input.clone();
    if height == 0 || width == 0 {
        return result;
    }

    let mut planner = FftPlanner::<f64>::new();
    let (row_fft, col_fft) = if inverse {
        (planner.plan_fft_inverse(width), planner.plan_fft_inverse(height))
    } else {
        (planner.plan_fft_forward(width), planner.plan_fft_forward(height))
    };

    let mut buffer = vec![Complex64::new(0.0, 0.0); width];
    for mut row in result.rows_mut() {
        for (b, v) in buffer.iter_mut().zip(row.iter()) {
            *b = *v;
        }
        row_fft.process(&mut buffer);
        for (v, b) in row.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }

    let mut buffer = vec![Complex64::new(0.0, 0.0); height];
    for mut col in result.columns_mut() {
        for (b, v) in buffer.iter_mut().zip(col.iter()) {
            *b = *v;
        }
        col_fft.process(&mut buffer);
        for (v, b) in col.iter_mut().zip(buffer.iter()) {
            *v = *b;
        }
    }

    result
}

/// Move the zero-frequency term to index `(h / 2, w / 2)`.
pub fn fftshift<T: Clone>(input: &Array2<T>) -> Array2<T> {
    let (height, width) = input.dim();
    Array2::from_shape_fn((height, width), |(y, x)| {
        input[[(y + height - height / 2) % height, (x + width - width / 2) % width]].clone()
    })
}

/// Signed frequency index of bin `k` in an `n`-point DFT, in cycles per
/// `n` samples (`0, 1, .., -2, -1`).
pub fn signed_frequency(k: usize, n: usize) -> f64 {
    if k < n.div_ceil(2) {
        k as f64
    } else {
        k as f64 - n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_round_trip() {
        let input = Array2::from_shape_fn((6, 8), |(y, x)| Complex64::new((y * 8 + x) as f64, 0.0));
        let back = compute_2d_ifft(&compute_2d_fft(&input));
        for (a, b) in input.iter().zip(back.iter()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn test_fftshift_centers_dc() {
        let mut input = Array2::<f64>::zeros((4, 5));
        input[[0, 0]] = 1.0;
        let shifted = fftshift(&input);
        assert_eq!(shifted[[2, 2]], 1.0);
    }

    #[test]
    fn test_signed_frequency() {
        let freqs: Vec<f64> = (0..5).map(|k| signed_frequency(k, 5)).collect();
        assert_eq!(freqs, vec![0.0, 1.0, 2.0, -2.0, -1.0]);
        let freqs: Vec<f64> = (0..4).map(|k| signed_frequency(k, 4)).collect();
        assert_eq!(freqs, vec![0.0, 1.0, -2.0, -1.0]);
    }
}
