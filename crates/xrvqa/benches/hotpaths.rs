use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::Luma;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use xrvqa::{
    detect_dominant_region, fit_profile, measure_shift, IntensityImage, ProfileFitConfig,
    SpotImage,
};

/// Noisy Gaussian spot, optionally with a square marker shadow cut out.
fn make_spot_fixture(size: u32, sigma_px: f32, shadow: Option<[u32; 2]>, seed: u64) -> IntensityImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let c = size as f32 * 0.5;
    IntensityImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - c;
        let dy = y as f32 - c;
        let mut v = 1500.0 * (-(dx * dx + dy * dy) / (2.0 * sigma_px * sigma_px)).exp();
        if let Some([sx, sy]) = shadow {
            if x.abs_diff(sx) <= 3 && y.abs_diff(sy) <= 3 {
                v -= 420.0;
            }
        }
        v += rng.gen_range(-4.0f32..4.0f32);
        Luma([v])
    })
}

fn bench_region(c: &mut Criterion) {
    let img = make_spot_fixture(400, 45.0, None, 7);

    c.bench_function("dominant_region_400x400", |b| {
        b.iter(|| {
            let det = detect_dominant_region(black_box(&img), black_box(50.0))
                .expect("fixture has a spot");
            black_box(det.region.centroid)
        })
    });
}

fn bench_shift(c: &mut Criterion) {
    let entry = SpotImage::new(make_spot_fixture(400, 45.0, None, 11), 0.1);
    let exit = SpotImage::new(make_spot_fixture(400, 45.0, Some([204, 197]), 11), 0.1);

    c.bench_function("shift_400x400", |b| {
        b.iter(|| {
            let m = measure_shift(black_box(&entry), black_box(&exit), 50.0)
                .expect("fixture has a shadow");
            black_box(m.shift_mm)
        })
    });
}

fn bench_profile_fit(c: &mut Criterion) {
    let img = SpotImage::new(make_spot_fixture(400, 45.0, None, 21), 0.1);
    let cfg = ProfileFitConfig::default();

    c.bench_function("profile_fit_0deg", |b| {
        b.iter(|| {
            let fit = fit_profile(black_box(&img), 0.0, 0.1, black_box(&cfg))
                .expect("fixture profile is valid");
            black_box(fit.sigma_mm)
        })
    });

    c.bench_function("profile_fit_30deg", |b| {
        b.iter(|| {
            let fit = fit_profile(black_box(&img), 30.0, 0.1, black_box(&cfg))
                .expect("fixture profile is valid");
            black_box(fit.sigma_mm)
        })
    });
}

criterion_group!(hotpaths, bench_region, bench_shift, bench_profile_fit);
criterion_main!(hotpaths);
