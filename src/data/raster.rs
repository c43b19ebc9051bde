use crate::{AlignError, Result};
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use ndarray::{Array2, Array3, ArrayView3, Axis};

/// Pixel buffer laid out as `(height, width, channels)`.
///
/// Values keep the range of the source file (0..=255 for 8-bit images,
/// 0..=65535 for 16-bit ones); nothing in the engine renormalizes them.
pub type RasterImage = Array3<f32>;

/// ITU-R BT.709 luma weights, matching the usual rgb-to-gray conversion.
const LUMA_WEIGHTS: [f64; 3] = [0.2125, 0.7154, 0.0721];

/// Convert a decoded image into a raster. Alpha channels are dropped.
pub fn from_dynamic(image: &DynamicImage) -> Result<RasterImage> {
    let (width, height) = (image.width() as usize, image.height() as usize);

    let raster = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            let data = image.to_luma8().into_raw();
            Array3::from_shape_vec((height, width, 1), data.into_iter().map(f32::from).collect())?
        }
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            let data = image.to_luma16().into_raw();
            Array3::from_shape_vec((height, width, 1), data.into_iter().map(f32::from).collect())?
        }
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgba16(_) => {
            let data = image.to_rgb16().into_raw();
            Array3::from_shape_vec((height, width, 3), data.into_iter().map(f32::from).collect())?
        }
        _ => {
            let data = image.to_rgb8().into_raw();
            Array3::from_shape_vec((height, width, 3), data.into_iter().map(f32::from).collect())?
        }
    };

    Ok(raster)
}

/// Convert a raster back into an encodable image.
///
/// The output is 8-bit unless the raster holds values above 255, in which
/// case 16 bits per channel are used. Values are clamped, never rescaled.
pub fn to_dynamic(raster: ArrayView3<f32>) -> Result<DynamicImage> {
    let (height, width, channels) = raster.dim();
    let wide = raster.iter().any(|&v| v > 255.0);
    let (w, h) = (width as u32, height as u32);

    let image = if wide {
        let data: Vec<u16> = raster
            .iter()
            .map(|&v| v.round().clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        match channels {
            1 => ImageBuffer::<Luma<u16>, _>::from_raw(w, h, data).map(DynamicImage::ImageLuma16),
            3 => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgb16),
            4 => ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgba16),
            _ => None,
        }
    } else {
        let data: Vec<u8> = raster
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        match channels {
            1 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            3 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            _ => None,
        }
    };

    image.ok_or_else(|| {
        AlignError::Shape(format!(
            "cannot encode a {}x{} raster with {} channels",
            width, height, channels
        ))
    })
}

/// Wrap a single-channel plane as a raster.
pub fn from_gray(gray: &Array2<f64>) -> RasterImage {
    gray.mapv(|v| v as f32).insert_axis(Axis(2))
}

/// Single-channel luminance of a raster.
///
/// One channel is used as-is, two channels are read as gray + alpha, three
/// or four as RGB(A).
pub fn luminance(image: ArrayView3<f32>) -> Result<Array2<f64>> {
    let (height, width, channels) = image.dim();
    match channels {
        1 | 2 => Ok(image.index_axis(Axis(2), 0).mapv(f64::from)),
        3 | 4 => Ok(Array2::from_shape_fn((height, width), |(y, x)| {
            LUMA_WEIGHTS
                .iter()
                .enumerate()
                .map(|(c, w)| w * f64::from(image[[y, x, c]]))
                .sum()
        })),
        n => Err(AlignError::Shape(format!(
            "unsupported channel count {} for luminance conversion",
            n
        ))),
    }
}
