// Run with:  cargo bench --bench clear

use criterion::{criterion_group, criterion_main, Criterion};
use hub12_framebuffer::surface::PixelSurface;
use std::hint::black_box;

const WIDTH: usize = 32 * 4;
const HEIGHT: usize = 16 * 4;

fn clear(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear");

    group.bench_function("clear", |b| {
        let mut surface = PixelSurface::try_new(WIDTH, HEIGHT).unwrap();
        b.iter(|| {
            black_box(&mut surface).clear();
        });
    });

    group.bench_function("fill_on", |b| {
        let mut surface = PixelSurface::try_new(WIDTH, HEIGHT).unwrap();
        b.iter(|| {
            black_box(&mut surface).fill(black_box(true));
        });
    });

    group.finish();
}

criterion_group!(benches, clear);
criterion_main!(benches);
