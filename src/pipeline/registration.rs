use crate::algorithms::{
    IlkFlow, RotationScaleEstimator, SpectralExtractor, TranslationEstimate, TranslationRefiner,
};
use crate::config::Config;
use crate::data::{crop_to_same_size, luminance, RasterImage};
use crate::logging::{AlignmentSpan, CorrelationScope};
use crate::pipeline::{AlignmentAlgorithm, TransformEstimate, Translation};
use crate::Result;
use ndarray::ArrayView3;

/// Rotation and scale from log-polar phase correlation of band-passed
/// magnitude spectra, translation from the mean optical flow after the
/// rotation has been undone.
#[derive(Debug, Clone, Default)]
pub struct FrequencyAlignment {
    extractor: SpectralExtractor,
    rotation_scale: RotationScaleEstimator,
    refiner: TranslationRefiner,
}

/// Intermediate results of one registration, kept for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationDetails {
    pub transform: TransformEstimate,
    /// Angle straight out of the log-polar correlation.
    pub recovered_angle: f64,
    pub flow: TranslationEstimate,
}

impl FrequencyAlignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let flow = IlkFlow {
            radius: config.flow.window_radius,
            num_warp: config.flow.num_warp,
            levels: config.flow.pyramid_levels,
            min_size: config.flow.min_level_size,
        };
        Self {
            extractor: SpectralExtractor::new().with_sigmas(config.spectrum.low_sigma, config.spectrum.high_sigma),
            rotation_scale: RotationScaleEstimator::new()
                .with_radius_divisor(config.registration.radius_divisor)
                .with_upsample_factor(config.registration.upsample_factor)
                .with_normalization(config.registration.normalization),
            refiner: TranslationRefiner::new(flow).with_max_spread(config.flow.max_spread),
        }
    }

    /// Full registration with the intermediate estimates.
    pub fn register(&self, reference: ArrayView3<f32>, target: ArrayView3<f32>) -> Result<RegistrationDetails> {
        let cropped = crop_to_same_size(&[reference.view(), target.view()])?;
        let (reference, target) = (cropped[0].view(), cropped[1].view());
        let (height, width, _) = reference.dim();
        tracing::debug!(width, height, "Registering on common crop");

        let gray_reference = luminance(reference)?;
        let gray_target = luminance(target)?;

        let spectrum_reference = self.extractor.extract_gray(&gray_reference)?;
        let spectrum_target = self.extractor.extract_gray(&gray_target)?;
        let rotation_scale = self.rotation_scale.estimate(&spectrum_reference, &spectrum_target)?;

        // The correlation reports the angle that brings the target back.
        let rotation = -rotation_scale.angle_deg;
        let flow = self.refiner.estimate(&gray_reference, &gray_target, rotation)?;

        // Flow is measured in the de-rotated frame; express it in the
        // target's frame so that the target is `translate(rotate(reference))`.
        let translation = Translation::new(flow.dx, flow.dy).rotated(rotation);
        let transform = TransformEstimate::new(rotation, rotation_scale.scale, translation)?;

        Ok(RegistrationDetails {
            transform,
            recovered_angle: rotation_scale.angle_deg,
            flow,
        })
    }

    /// Rotation, scale and translation of `target` relative to `reference`.
    /// Inputs of different size are center-cropped to their common size.
    pub fn compute_transform(&self, reference: ArrayView3<f32>, target: ArrayView3<f32>) -> Result<TransformEstimate> {
        Ok(self.register(reference, target)?.transform)
    }

    /// Registration inside an [`AlignmentSpan`] for `identity`.
    pub fn compute_traced(
        &self,
        identity: &str,
        reference: ArrayView3<f32>,
        target: ArrayView3<f32>,
    ) -> Result<TransformEstimate> {
        let scope = CorrelationScope::fresh();
        let span = AlignmentSpan::new(self.name(), identity, scope.id());
        let _entered = span.enter();

        let outcome = self.register(reference, target);
        match &outcome {
            Ok(details) => {
                span.record_rotation_scale(details.transform.rotation(), details.transform.scale());
                span.record_result(&details.transform);
            }
            Err(e) => span.record_failure(e),
        }
        outcome.map(|details| details.transform)
    }
}

impl AlignmentAlgorithm for FrequencyAlignment {
    fn name(&self) -> &str {
        "frequency"
    }

    fn estimate(&self, reference: ArrayView3<f32>, target: ArrayView3<f32>) -> Result<TransformEstimate> {
        self.compute_transform(reference, target)
    }
}

/// Resample `image` so that it lines up with the reference it was
/// registered against.
///
/// Undoes the rotation about the image center, then the translation, in a
/// single bilinear resampling pass. The output keeps the input's size;
/// uncovered pixels are 0 and values are not renormalized.
///
/// The scale factor is reported but not applied: the aligned image keeps
/// the target's pixel scale.
pub fn apply(image: ArrayView3<f32>, transform: &TransformEstimate) -> RasterImage {
    let (height, width, _) = image.dim();
    transform.alignment_warp((height, width)).apply_raster(image, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{from_gray, ImageTransformer};
    use ndarray::{s, Array2, Array3};
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, SubscriberExt};

    fn create_test_pattern(size: usize) -> Array2<f64> {
        let waves = [(10.0, 20.0_f64), (14.0, 75.0), (19.0, 140.0)];
        Array2::from_shape_fn((size, size), |(y, x)| {
            waves.iter().enumerate().fold(100.0, |acc, (i, &(cycles, angle))| {
                let (sin_a, cos_a) = angle.to_radians().sin_cos();
                let k = std::f64::consts::TAU * cycles / 512.0;
                acc + 30.0 * (k * (cos_a * x as f64 + sin_a * y as f64) + i as f64).sin()
            })
        })
    }

    /// Collects every `rotation` value recorded on a span as an `f64`.
    #[derive(Clone, Default)]
    struct RotationRecords(Arc<Mutex<Vec<f64>>>);

    struct RotationVisitor<'a>(&'a Mutex<Vec<f64>>);

    impl Visit for RotationVisitor<'_> {
        fn record_f64(&mut self, field: &Field, value: f64) {
            if field.name() == "rotation" {
                self.0.lock().unwrap().push(value);
            }
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn std::fmt::Debug) {}
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for RotationRecords {
        fn on_record(&self, _id: &tracing::span::Id, values: &tracing::span::Record<'_>, _ctx: Context<'_, S>) {
            values.record(&mut RotationVisitor(&self.0));
        }
    }

    #[test]
    fn test_views_from_different_owners_register() {
        let reference = from_gray(&create_test_pattern(160));
        let target = reference.slice(s![8..136, 8..136, ..]).to_owned();
        let transform = FrequencyAlignment::new()
            .compute_transform(reference.view(), target.view())
            .unwrap();
        assert!(transform.rotation().abs() < 1.0, "{:?}", transform);
    }

    #[test]
    fn test_traced_span_records_stored_rotation() {
        let pattern = create_test_pattern(256);
        let reference = from_gray(&pattern);
        let target = from_gray(&ImageTransformer::rotate(&pattern, 10.0));

        let records = RotationRecords::default();
        let subscriber = tracing_subscriber::registry().with(records.clone());
        let transform = tracing::subscriber::with_default(subscriber, || {
            FrequencyAlignment::new()
                .compute_traced("slice_02.png", reference.view(), target.view())
                .unwrap()
        });

        assert!(transform.rotation() > 5.0, "{:?}", transform);
        let recorded = records.0.lock().unwrap().clone();
        assert_eq!(recorded, vec![transform.rotation()]);
    }

    #[test]
    fn test_apply_identity_keeps_pixels() {
        let image = Array3::from_shape_fn((6, 7, 3), |(y, x, c)| (y * 100 + x * 10 + c) as f32);
        let aligned = apply(image.view(), &TransformEstimate::identity());
        assert_eq!(aligned, image);
    }

    #[test]
    fn test_apply_keeps_value_range() {
        let image = Array3::from_elem((10, 10, 1), 4000.0_f32);
        let transform = TransformEstimate::new(0.0, 1.0, Translation::new(2.0, 0.0)).unwrap();
        let aligned = apply(image.view(), &transform);
        assert_eq!(aligned[[5, 2, 0]], 4000.0);
        assert_eq!(aligned[[5, 8, 0]], 0.0);
    }
}
