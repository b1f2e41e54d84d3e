// Run with:  cargo bench --bench refresh_frame

use core::convert::Infallible;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use hub12_framebuffer::refresh::RefreshEngine;
use hub12_framebuffer::scan::ScanFrame;
use std::hint::black_box;

/// Measures the shifting cost only: pin writes and the dwell are no-ops.
struct NoopPin;

impl ErrorType for NoopPin {
    type Error = Infallible;
}

impl OutputPin for NoopPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fn refresh_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_frame");

    for panels in [1, 6, 16] {
        let frame = ScanFrame::try_new(panels).unwrap();
        group.throughput(Throughput::Bytes(frame.as_bytes().len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(panels), &frame, |b, frame| {
            let pins = (NoopPin, NoopPin, NoopPin, NoopPin, NoopPin, NoopPin);
            let mut engine = RefreshEngine::new(pins, NoopDelay);
            b.iter(|| {
                black_box(&mut engine)
                    .refresh_frame(black_box(frame), black_box(0))
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, refresh_frame);
criterion_main!(benches);
