// Drive the frame processor with a synthetic camera and a toy network
//
// Usage: cargo run --example synthetic_camera [config.json] [frames]
use camera_detector::{
    ChannelPublisher, FrameProcessor, ModelHandle, Network, PipelineConfig, ProcessedImage,
};
use camera_detector::{Frame, ImageFormat};
use ndarray::{Array2, Array4};
use std::thread;
use std::time::{Duration, Instant};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const SQUARE: u32 = 80;

/// Reports the bounding box of bright pixels as a single "person"
struct BrightSpotNetwork;

impl Network for BrightSpotNetwork {
    fn forward(&mut self, input: &Array4<f32>) -> camera_detector::Result<Vec<Array2<f32>>> {
        let (height, width) = (input.shape()[2], input.shape()[3]);
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (width, height, 0, 0);

        for y in 0..height {
            for x in 0..width {
                if input[[0, 0, y, x]] > 0.8 {
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        // 5 box/objectness columns plus 80 class scores
        let mut output = Array2::zeros((0, 85));
        if min_x <= max_x && min_y <= max_y {
            let (w, h) = (width as f32, height as f32);
            let mut row = Array2::zeros((1, 85));
            row[[0, 0]] = (min_x + max_x + 1) as f32 / 2.0 / w;
            row[[0, 1]] = (min_y + max_y + 1) as f32 / 2.0 / h;
            row[[0, 2]] = (max_x + 1 - min_x) as f32 / w;
            row[[0, 3]] = (max_y + 1 - min_y) as f32 / h;
            row[[0, 4]] = 0.95;
            row[[0, 5]] = 0.95;
            output = row;
        }

        Ok(vec![output])
    }

    fn name(&self) -> &str {
        "bright-spot"
    }
}

/// Dark BGR frame with a red square sliding left to right
fn synthetic_frame(index: u32) -> Frame {
    let mut frame = Frame::filled(FRAME_WIDTH, FRAME_HEIGHT, ImageFormat::Bgr, [30, 30, 30]);
    let left = (index * 12) % (FRAME_WIDTH - SQUARE);
    let top = (FRAME_HEIGHT - SQUARE) / 2;

    for y in top..top + SQUARE {
        for x in left..left + SQUARE {
            let idx = ((y * FRAME_WIDTH + x) * 3) as usize;
            frame.data[idx..idx + 3].copy_from_slice(&[0, 0, 255]);
        }
    }
    frame
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    camera_detector::init()?;

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let frame_count: u32 = args.next().map(|n| n.parse()).transpose()?.unwrap_or(60);

    println!("Synthetic camera: {} frames at {}x{}", frame_count, FRAME_WIDTH, FRAME_HEIGHT);
    println!("  Strategy: {}", config.strategy);
    println!("  Input size: {:?}", config.input_size);

    let (publisher, published) = ChannelPublisher::unbounded();
    let model = ModelHandle::new(Box::new(BrightSpotNetwork));
    let processor = FrameProcessor::new(config, model, publisher)?;
    processor.start()?;

    let started = Instant::now();
    let presenter = thread::spawn(move || {
        let mut received: Vec<ProcessedImage> = Vec::new();
        let mut latencies: Vec<f32> = Vec::new();
        while let Ok(image) = published.recv_timeout(Duration::from_secs(2)) {
            latencies.push(image.latency_ms());
            if let Some(det) = image.detections.first() {
                log::debug!(
                    "Frame {}: class {} at ({:.0}, {:.0}) {:.0}x{:.0}",
                    image.sequence,
                    det.class_id,
                    det.bbox.x,
                    det.bbox.y,
                    det.bbox.width,
                    det.bbox.height
                );
            }
            received.push(image);
        }
        (received, latencies)
    });

    // ~30 fps capture
    for index in 0..frame_count {
        processor.enqueue(synthetic_frame(index));
        thread::sleep(Duration::from_millis(33));
    }

    thread::sleep(Duration::from_millis(200));
    let unprocessed = processor.stop()?;
    drop(processor);

    let (received, latencies) = presenter
        .join()
        .map_err(|_| "presentation thread panicked")?;
    let elapsed = started.elapsed().as_secs_f32();

    let with_detection = received.iter().filter(|i| !i.detections.is_empty()).count();
    let mean = |values: Vec<f32>| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f32>() / values.len() as f32
        }
    };
    let mean_ms = mean(received.iter().map(|i| i.processing_time_ms).collect());
    let mean_latency_ms = mean(latencies);

    println!("Published {} frames in {:.2}s", received.len(), elapsed);
    println!("  With detections: {}", with_detection);
    println!("  Mean processing time: {:.2}ms", mean_ms);
    println!("  Mean capture-to-display latency: {:.2}ms", mean_latency_ms);
    println!("  Unprocessed at stop: {}", unprocessed.len());

    Ok(())
}
