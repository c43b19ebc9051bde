use approx::assert_abs_diff_eq;
use ndarray::Array2;
use spectral_align::*;
use std::f64::consts::TAU;

const PERIOD_BASE: f64 = 512.0;

/// Three gratings of different frequency and orientation on a mild ramp.
/// All gratings sit inside the default band-pass.
fn grating_value(x: f64, y: f64) -> f64 {
    let waves = [(10.0, 20.0_f64, 0.0), (14.0, 75.0, 1.3), (19.0, 140.0, 2.1)];
    let mut value = 100.0 + 0.05 * (x + y);
    for &(cycles, angle, phase) in &waves {
        let (sin_a, cos_a) = angle.to_radians().sin_cos();
        let k = TAU * cycles / PERIOD_BASE;
        value += 30.0 * (k * (cos_a * x + sin_a * y) + phase).sin();
    }
    value
}

/// The grating seen through `warp`, sampled analytically so no border fill
/// enters the image.
fn create_scene(size: usize, warp: Warp) -> Array2<f64> {
    Array2::from_shape_fn((size, size), |(y, x)| {
        let (sx, sy) = warp.source(x as f64, y as f64);
        grating_value(sx, sy)
    })
}

fn create_grating_image(size: usize) -> Array2<f64> {
    create_scene(size, Warp::identity())
}

fn spectra(reference: &Array2<f64>, target: &Array2<f64>) -> (GraySpectrum, GraySpectrum) {
    let extractor = SpectralExtractor::new();
    (
        extractor.extract_gray(reference).unwrap(),
        extractor.extract_gray(target).unwrap(),
    )
}

#[test]
fn test_self_alignment_is_identity() {
    let reference = from_gray(&create_grating_image(256));
    let transform = FrequencyAlignment::new()
        .compute_transform(reference.view(), reference.view())
        .unwrap();

    assert_abs_diff_eq!(transform.rotation(), 0.0, epsilon = 0.5);
    assert_abs_diff_eq!(transform.scale(), 1.0, epsilon = 0.02);
    assert_abs_diff_eq!(transform.translation().dx, 0.0, epsilon = 1.0);
    assert_abs_diff_eq!(transform.translation().dy, 0.0, epsilon = 1.0);
}

#[test]
fn test_rotation_recovery_reports_negated_angle() {
    let reference = create_grating_image(512);
    for theta in [15.0, -30.0, 45.0] {
        let target = ImageTransformer::rotate(&reference, theta);
        let (spectrum_ref, spectrum_target) = spectra(&reference, &target);
        let (angle, scale) = estimate_rotation_scale(&spectrum_ref, &spectrum_target).unwrap();

        assert!((angle + theta).abs() < 1.0, "theta {} recovered {}", theta, angle);
        assert!((scale - 1.0).abs() < 0.05, "theta {} scale {}", theta, scale);
    }
}

#[test]
fn test_scale_recovery() {
    let reference = create_grating_image(512);
    for s in [0.8, 1.25] {
        // Content shrunk by 1/s must be magnified by s to match.
        let target = create_scene(512, Warp::scaling(1.0 / s, image_center((512, 512))));
        let (spectrum_ref, spectrum_target) = spectra(&reference, &target);
        let (angle, scale) = estimate_rotation_scale(&spectrum_ref, &spectrum_target).unwrap();

        assert!((scale - s).abs() / s < 0.05, "expected {} got {}", s, scale);
        assert!(angle.abs() < 1.0, "scale {} angle {}", s, angle);
    }
}

#[test]
fn test_end_to_end_rotation_and_translation() {
    let reference = create_grating_image(512);
    let target = ImageTransformer::rotate_and_translate(&reference, 10.0, 8.0, -3.0);

    let transform = FrequencyAlignment::new()
        .compute_transform(from_gray(&reference).view(), from_gray(&target).view())
        .unwrap();

    assert!((9.0..=11.0).contains(&transform.rotation()), "{:?}", transform);
    assert!((0.95..=1.05).contains(&transform.scale()), "{:?}", transform);
    let t = transform.translation();
    assert!((t.dx - 8.0).abs() < 2.0, "{:?}", transform);
    assert!((t.dy + 3.0).abs() < 2.0, "{:?}", transform);

    // Applying the estimate brings the target much closer to the reference.
    let aligned = apply(from_gray(&target).view(), &transform);
    let mean_error = |image: &dyn Fn(usize, usize) -> f64| {
        let mut total = 0.0;
        for y in 192..320 {
            for x in 192..320 {
                total += (image(y, x) - reference[[y, x]]).abs();
            }
        }
        total / (128.0 * 128.0)
    };
    let before = mean_error(&|y, x| target[[y, x]]);
    let after = mean_error(&|y, x| f64::from(aligned[[y, x, 0]]));
    assert!(after < before / 3.0, "error before {} after {}", before, after);
}

#[test]
fn test_different_sizes_are_cropped_before_registration() {
    let reference = create_grating_image(256);
    let larger = create_grating_image(300);
    let transform = FrequencyAlignment::new()
        .compute_transform(from_gray(&reference).view(), from_gray(&larger).view())
        .unwrap();
    assert!(transform.rotation().abs() < 1.0, "{:?}", transform);
    assert!((transform.scale() - 1.0).abs() < 0.05, "{:?}", transform);
}

#[test]
fn test_degenerate_radius() {
    let small = Array2::from_shape_fn((12, 12), |(y, x)| ((x * 7 + y * 3) % 11) as f64);
    let (a, b) = spectra(&small, &small);
    assert!(matches!(
        estimate_rotation_scale(&a, &b),
        Err(AlignError::DegenerateRadius { radius: 1 })
    ));
}

#[test]
fn test_spectrum_shape_mismatch() {
    let (a, _) = spectra(&create_grating_image(64), &create_grating_image(64));
    let (b, _) = spectra(&create_grating_image(72), &create_grating_image(72));
    assert!(matches!(estimate_rotation_scale(&a, &b), Err(AlignError::Shape(_))));
}

#[test]
fn test_spectrum_rejects_bad_input() {
    let empty = Array2::<f64>::zeros((0, 0));
    assert!(matches!(
        SpectralExtractor::new().extract_gray(&empty),
        Err(AlignError::Spectrum(_))
    ));

    let mut nan = Array2::<f64>::zeros((16, 16));
    nan[[3, 4]] = f64::NAN;
    assert!(matches!(
        SpectralExtractor::new().extract_gray(&nan),
        Err(AlignError::Spectrum(_))
    ));

    let image = create_grating_image(32);
    assert!(matches!(
        SpectralExtractor::new().with_sigmas(10.0, 5.0).extract_gray(&image),
        Err(AlignError::Spectrum(_))
    ));
}

#[test]
fn test_spectrum_is_deterministic_and_shape_preserving() {
    let image = from_gray(&create_grating_image(64));
    let a = spectrum(image.view(), 5.0, 10.0).unwrap();
    let b = spectrum(image.view(), 5.0, 10.0).unwrap();
    assert_eq!(a.dim(), (64, 64));
    assert_eq!(a.magnitude(), b.magnitude());
}

#[test]
fn test_translation_flow_shape_mismatch() {
    let a = create_grating_image(64);
    let b = create_grating_image(65);
    assert!(matches!(estimate_translation(&a, &b, 0.0), Err(AlignError::Flow(_))));
}
