// Run with:  cargo bench --bench set_pixel

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use hub12_framebuffer::surface::PixelSurface;
use std::hint::black_box;

const PANELS_X: usize = 3;
const PANELS_Y: usize = 2;
const WIDTH: usize = 32 * PANELS_X;
const HEIGHT: usize = 16 * PANELS_Y;

fn set_pixel(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_pixel");
    group.throughput(Throughput::Elements((WIDTH * HEIGHT) as u64));

    group.bench_function("pixel_surface", |b| {
        let mut surface = PixelSurface::try_new(WIDTH, HEIGHT).unwrap();

        b.iter(|| {
            for y in 0..HEIGHT {
                for x in 0..WIDTH {
                    black_box(&mut surface).set(
                        black_box(x),
                        black_box(y),
                        black_box((x ^ y) & 1 == 0),
                    );
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, set_pixel);
criterion_main!(benches);
