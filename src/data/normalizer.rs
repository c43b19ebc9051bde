use crate::{AlignError, Result};
use ndarray::{s, ArrayView3};

/// Crop a view about its own center.
///
/// A requested size larger than the image is clamped to the image. The
/// result borrows the input pixels, nothing is copied.
pub fn crop_center<'a>(image: ArrayView3<'a, f32>, width: usize, height: usize) -> ArrayView3<'a, f32> {
    let (h, w, _) = image.dim();
    let crop_w = width.min(w);
    let crop_h = height.min(h);
    let start_x = w / 2 - crop_w / 2;
    let start_y = h / 2 - crop_h / 2;
    image.slice_move(s![start_y..start_y + crop_h, start_x..start_x + crop_w, ..])
}

/// Crop every image about its center to the smallest height and width in
/// the set.
///
/// The returned views alias the inputs. They are shared borrows, so the
/// inputs cannot be mutated while any of the views is alive.
pub fn crop_to_same_size<'a>(images: &[ArrayView3<'a, f32>]) -> Result<Vec<ArrayView3<'a, f32>>> {
    let Some(first) = images.first() else {
        return Ok(Vec::new());
    };

    let channels = first.dim().2;
    if let Some(odd) = images.iter().find(|im| im.dim().2 != channels) {
        return Err(AlignError::Shape(format!(
            "channel depth differs: {} vs {}",
            channels,
            odd.dim().2
        )));
    }

    let min_h = images.iter().map(|im| im.dim().0).min().unwrap_or(0);
    let min_w = images.iter().map(|im| im.dim().1).min().unwrap_or(0);

    Ok(images
        .iter()
        .map(|im| crop_center(im.clone(), min_w, min_h))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_crop_center_clamps_to_image() {
        let image = Array3::<f32>::zeros((10, 6, 1));
        let cropped = crop_center(image.view(), 20, 4);
        assert_eq!(cropped.dim(), (4, 6, 1));
    }

    #[test]
    fn test_empty_set() {
        assert!(crop_to_same_size(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_channel_mismatch_is_shape_error() {
        let a = Array3::<f32>::zeros((8, 8, 1));
        let b = Array3::<f32>::zeros((8, 8, 3));
        let err = crop_to_same_size(&[a.view(), b.view()]).unwrap_err();
        assert!(matches!(err, AlignError::Shape(_)));
    }
}
