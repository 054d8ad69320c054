//! Transformation benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::RgbImage;
use portraitgen::params::{set_parameter, ParameterField, ParameterSet};
use portraitgen::transform::stylize;

fn create_test_image(width: u32, height: u32) -> RgbImage {
    let mut img = RgbImage::new(width, height);
    for x in 0..width {
        for y in 0..height {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
            img.put_pixel(x, y, image::Rgb([r, g, b]));
        }
    }
    img
}

fn benchmark_stylize_sizes(c: &mut Criterion) {
    let params = ParameterSet::default();

    let mut group = c.benchmark_group("Stylize");

    for (width, height) in [(160, 120), (320, 240), (640, 480)] {
        let image = create_test_image(width, height);
        group.bench_function(format!("{}x{}", width, height), |b| {
            b.iter(|| stylize(black_box(&image), "pharaoh", black_box(&params)))
        });
    }

    group.finish();
}

fn benchmark_detail_levels(c: &mut Criterion) {
    let image = create_test_image(320, 240);

    let mut group = c.benchmark_group("Stylize Detail Level");

    for detail in [50, 75, 100] {
        let params = set_parameter(&ParameterSet::default(), ParameterField::DetailLevel, detail);
        group.bench_function(format!("detail_{}", detail), |b| {
            b.iter(|| stylize(black_box(&image), "queen", black_box(&params)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_stylize_sizes, benchmark_detail_levels);
criterion_main!(benches);
