//! Capture Geometry Benchmarks
//!
//! Frame mapping, cropping and the per-field post-processing that runs on
//! every capture.
//!
//! Run with: `cargo bench --bench capture_geometry`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use yardcam_server::capture::{FrameMapper, GuideFrame, RawPhoto, ScreenGeometry};
use yardcam_server::recognition::{ColorClassifier, TextCorrector};

fn portrait_screen() -> ScreenGeometry {
    ScreenGeometry {
        width: 390.0,
        height: 844.0,
        frame: GuideFrame {
            x: 20.0,
            y: 260.0,
            width: 350.0,
            height: 260.0,
        },
    }
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 90u8])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
        .expect("encode benchmark image");
    buffer
}

fn bench_frame_mapping(c: &mut Criterion) {
    let mapper = FrameMapper::new();
    let screen = portrait_screen();

    let mut group = c.benchmark_group("frame_mapping");
    for (width, height) in [(1080u32, 2340u32), (3024, 4032), (4032, 3024)] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &(width, height),
            |b, &(w, h)| b.iter(|| mapper.map(black_box(&screen), black_box(w), black_box(h))),
        );
    }
    group.finish();
}

fn bench_crop(c: &mut Criterion) {
    let mapper = FrameMapper::new();
    let screen = portrait_screen();
    let bytes = jpeg(1080, 2340);

    let mut group = c.benchmark_group("crop_photo");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(10));
    group.bench_function("1080x2340_jpeg", |b| {
        b.iter(|| {
            let raw = RawPhoto {
                width: 1080,
                height: 2340,
                bytes: bytes.clone(),
                mime_type: "image/jpeg".to_string(),
            };
            mapper.crop_photo(black_box(&screen), raw)
        })
    });
    group.finish();
}

fn bench_post_processing(c: &mut Criterion) {
    let classifier = ColorClassifier::new();
    let corrector = TextCorrector::new();

    c.bench_function("classify_color", |b| {
        b.iter(|| classifier.classify(black_box((34, 92, 160))))
    });

    c.bench_function("container_number_corrected", |b| {
        b.iter(|| corrector.extract_container_number(black_box("MSCU 123456 7 22G1")))
    });

    c.bench_function("iso_code_fallback", |b| {
        b.iter(|| corrector.extract_iso_code(black_box("TARE 2200 KG 4251")))
    });
}

criterion_group!(benches, bench_frame_mapping, bench_crop, bench_post_processing);
criterion_main!(benches);
