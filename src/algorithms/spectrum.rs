use super::fft::{compute_2d_fft, fftshift, real_to_complex};
use super::filters::{difference_of_gaussians, hann_window};
use crate::data::luminance;
use crate::{AlignError, Result};
use ndarray::{Array2, ArrayView3};

pub const DEFAULT_LOW_SIGMA: f64 = 5.0;
pub const DEFAULT_HIGH_SIGMA: f64 = 10.0;

/// Magnitude of the centered 2-D Fourier transform of a band-passed,
/// windowed gray image. Never persisted.
#[derive(Debug, Clone)]
pub struct GraySpectrum(Array2<f64>);

impl GraySpectrum {
    pub fn magnitude(&self) -> &Array2<f64> {
        &self.0
    }

    pub fn dim(&self) -> (usize, usize) {
        self.0.dim()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.0
    }
}

/// Band-pass + window + |FFT| pipeline used ahead of rotation/scale estimation.
#[derive(Debug, Clone)]
pub struct SpectralExtractor {
    low_sigma: f64,
    high_sigma: f64,
}

impl Default for SpectralExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralExtractor {
    pub fn new() -> Self {
        Self {
            low_sigma: DEFAULT_LOW_SIGMA,
            high_sigma: DEFAULT_HIGH_SIGMA,
        }
    }

    pub fn with_sigmas(mut self, low_sigma: f64, high_sigma: f64) -> Self {
        self.low_sigma = low_sigma;
        self.high_sigma = high_sigma;
        self
    }

    /// Spectrum of a raster of any supported channel layout.
    pub fn extract(&self, image: ArrayView3<f32>) -> Result<GraySpectrum> {
        let (h, w, _) = image.dim();
        if h == 0 || w == 0 {
            return Err(AlignError::Spectrum(format!("empty image ({}x{})", w, h)));
        }
        self.extract_gray(&luminance(image)?)
    }

    /// Spectrum of an already gray plane.
    pub fn extract_gray(&self, gray: &Array2<f64>) -> Result<GraySpectrum> {
        self.validate(gray)?;

        let band_passed = difference_of_gaussians(gray, self.low_sigma, self.high_sigma);
        let windowed = band_passed * hann_window(gray.dim());
        let transformed = compute_2d_fft(&real_to_complex(&windowed));
        let magnitude = fftshift(&transformed).mapv(|c| c.norm());

        tracing::trace!(
            height = gray.nrows(),
            width = gray.ncols(),
            peak = magnitude.iter().cloned().fold(0.0_f64, f64::max),
            "Computed magnitude spectrum"
        );
        Ok(GraySpectrum(magnitude))
    }

    fn validate(&self, gray: &Array2<f64>) -> Result<()> {
        let (h, w) = gray.dim();
        if h == 0 || w == 0 {
            return Err(AlignError::Spectrum(format!("empty image ({}x{})", w, h)));
        }
        if !(self.low_sigma > 0.0 && self.low_sigma < self.high_sigma && self.high_sigma.is_finite()) {
            return Err(AlignError::Spectrum(format!(
                "band-pass sigmas must satisfy 0 < low < high (got {} and {})",
                self.low_sigma, self.high_sigma
            )));
        }
        if let Some(bad) = gray.iter().position(|v| !v.is_finite()) {
            return Err(AlignError::Spectrum(format!(
                "non-finite pixel at ({}, {})",
                bad % w,
                bad / w
            )));
        }
        Ok(())
    }
}

/// Band-passed magnitude spectrum of a raster with custom DoG sigmas.
pub fn spectrum(image: ArrayView3<f32>, low_sigma: f64, high_sigma: f64) -> Result<GraySpectrum> {
    SpectralExtractor::new()
        .with_sigmas(low_sigma, high_sigma)
        .extract(image)
}
