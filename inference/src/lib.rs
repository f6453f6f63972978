//! Real-time Camera Detection Core
//!
//! Takes raw frames from a capture source, runs them through an object
//! detector on a single background worker and publishes display-ready
//! images with the detections drawn in. Resize and color conversion run
//! either on the host or on an accelerated compute device, chosen at
//! configuration time.

pub mod config;
pub mod detector;
pub mod detector_stub;
pub mod detector_trait;
pub mod error;
pub mod execution;
pub mod frame_processor;
pub mod frame_queue;
pub mod image_utils;
pub mod postprocessing;
pub mod preprocessing;
pub mod types;

pub use config::{PipelineConfig, StrategyKind};
pub use detector::{decode, DetectorAdapter, ModelHandle};
pub use detector_stub::StubNetwork;
pub use detector_trait::Network;
pub use error::{DetectionError, Result};
pub use execution::{
    create_strategy, ComputeDevice, DeviceStrategy, ExecutionStrategy, HostStrategy, SimdDevice,
};
pub use frame_processor::{
    ChannelPublisher, FramePipeline, FrameProcessor, FramePublisher, ProcessorStats, WorkerState,
};
pub use frame_queue::{Dequeued, FrameQueue};
pub use postprocessing::{suppress, Suppressor};
pub use preprocessing::ImagePreprocessor;
pub use types::{BoundingBox, ClassNames, Detection, Frame, ImageFormat, ProcessedImage};

/// Initialize the detection core
/// Call once before building a processor; only announces the version today
pub fn init() -> Result<()> {
    log::info!("Camera detection core {} initialized", version());
    Ok(())
}

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
