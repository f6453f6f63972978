use camera_detector::{
    DeviceStrategy, ExecutionStrategy, Frame, HostStrategy, ImageFormat, ImagePreprocessor,
    SimdDevice,
};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::sync::Arc;

/// Camera-like BGR frame: gradient plus sparse noise
fn create_test_frame(width: u32, height: u32) -> Frame {
    let mut rng = rand::thread_rng();
    let mut data = Vec::with_capacity((width * height * 3) as usize);

    for y in 0..height {
        for x in 0..width {
            data.push(((x * 255) / width) as u8);
            data.push(((y * 255) / height) as u8);
            data.push(((x ^ y) & 0xFF) as u8);
        }
    }

    for _ in 0..(width * height / 100) {
        let idx = rng.gen_range(0..data.len());
        data[idx] = rng.gen();
    }

    Frame::new(data, width, height, ImageFormat::Bgr)
}

fn strategies() -> Vec<(&'static str, Arc<dyn ExecutionStrategy>)> {
    let mut strategies: Vec<(&'static str, Arc<dyn ExecutionStrategy>)> =
        vec![("host", Arc::new(HostStrategy::new()))];
    match SimdDevice::open(0) {
        Ok(device) => strategies.push(("simd", Arc::new(DeviceStrategy::new(device)))),
        Err(e) => eprintln!("Skipping accelerated benchmarks: {}", e),
    }
    strategies
}

/// Benchmark resize + tensor conversion to the 416x416 detector input
fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    group.sample_size(30);

    let resolutions = [(640, 480), (1280, 720), (1920, 1080)];

    for (width, height) in resolutions.iter() {
        let frame = create_test_frame(*width, *height);

        for (name, strategy) in strategies() {
            let preprocessor = ImagePreprocessor::new((416, 416), strategy);

            group.throughput(Throughput::Elements((*width * *height) as u64));
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}", width, height)),
                &frame,
                |b, frame| {
                    b.iter(|| preprocessor.prepare(frame));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark BGR to RGB display conversion
fn bench_to_display(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_display");

    for (width, height) in [(640, 480), (1920, 1080)].iter() {
        let frame = create_test_frame(*width, *height);

        for (name, strategy) in strategies() {
            group.throughput(Throughput::Elements((*width * *height) as u64));
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}x{}", width, height)),
                &frame,
                |b, frame| {
                    b.iter(|| strategy.to_display(frame.clone()));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(preprocessing_benches, bench_prepare, bench_to_display);

criterion_main!(preprocessing_benches);
