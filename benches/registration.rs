//! Benchmarks for the registration stages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use spectral_align::algorithms::filters::gaussian_blur;
use spectral_align::*;

fn create_textured_image(size: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Array2::from_shape_fn((size, size), |_| rng.gen_range(0.0..255.0));
    gaussian_blur(&noise, 2.0)
}

fn spectrum_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum");
    for size in [256, 512] {
        let image = create_textured_image(size, 7);
        let extractor = SpectralExtractor::new();
        group.bench_with_input(BenchmarkId::from_parameter(size), &image, |b, image| {
            b.iter(|| extractor.extract_gray(black_box(image)))
        });
    }
    group.finish();
}

fn rotation_scale_benchmarks(c: &mut Criterion) {
    let reference = create_textured_image(512, 7);
    let target = ImageTransformer::rotate(&reference, 12.0);
    let extractor = SpectralExtractor::new();
    let (Ok(spectrum_reference), Ok(spectrum_target)) =
        (extractor.extract_gray(&reference), extractor.extract_gray(&target))
    else {
        return;
    };

    c.bench_function("rotation_scale_512", |b| {
        b.iter(|| estimate_rotation_scale(black_box(&spectrum_reference), black_box(&spectrum_target)))
    });
}

fn registration_benchmarks(c: &mut Criterion) {
    let reference = create_textured_image(256, 11);
    let target = ImageTransformer::rotate_and_translate(&reference, 5.0, 3.0, -2.0);
    let (reference, target) = (from_gray(&reference), from_gray(&target));
    let engine = FrequencyAlignment::new();

    c.bench_function("compute_transform_256", |b| {
        b.iter(|| engine.compute_transform(black_box(reference.view()), black_box(target.view())))
    });
}

criterion_group!(
    benches,
    spectrum_benchmarks,
    rotation_scale_benchmarks,
    registration_benchmarks
);
criterion_main!(benches);
