//! Benchmarks for rendering and post-processing

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use qr_art_core::postprocess::blend_qr_contrast;
use qr_art_core::{render_art_qr, BlendMode, ClassicOptions, QrMatrix, ScanVerifier, Style};

const DATA: &str = "https://example.com/benchmark";

fn create_background(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn benchmark_classic(c: &mut Criterion) {
    let bg = create_background(800);
    let sharp = ClassicOptions::default();
    let organic = ClassicOptions {
        style: Style {
            mode: BlendMode::Organic,
            ..Style::default()
        },
        ..ClassicOptions::default()
    };

    c.bench_function("classic_placeholder_1024", |b| {
        b.iter(|| render_art_qr(black_box(DATA), None, &sharp))
    });

    c.bench_function("classic_sharp_1024", |b| {
        b.iter(|| render_art_qr(black_box(DATA), Some(&bg), &sharp))
    });

    c.bench_function("classic_organic_1024", |b| {
        b.iter(|| render_art_qr(black_box(DATA), Some(&bg), &organic))
    });
}

fn benchmark_postprocess(c: &mut Criterion) {
    let control = QrMatrix::encode(DATA, 0).unwrap().control_image(10);
    let ai = create_background(512).to_rgb8();

    c.bench_function("blend_qr_contrast_512", |b| {
        b.iter(|| blend_qr_contrast(black_box(&ai), &control, DATA, 0.6))
    });
}

fn benchmark_verify(c: &mut Criterion) {
    let img = render_art_qr(DATA, None, &ClassicOptions::default()).unwrap();
    let verifier = ScanVerifier::new();

    c.bench_function("verify_1024", |b| {
        b.iter(|| verifier.decode(black_box(&img)))
    });
}

criterion_group!(benches, benchmark_classic, benchmark_postprocess, benchmark_verify);
criterion_main!(benches);
