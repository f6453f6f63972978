/// Frame processor - single background worker driving the detection cycle
///
/// Each cycle:
/// - blocks on the frame queue until a frame or shutdown arrives
/// - preprocesses, infers, decodes and suppresses
/// - burns the kept boxes into the frame and converts it for display
/// - hands the result to the presentation side
///
/// Frames are processed strictly in enqueue order and per-cycle failures
/// only skip the frame, panics included. A poisoned model lock ends the worker.
use crate::config::PipelineConfig;
use crate::detector::{DetectorAdapter, ModelHandle};
use crate::detector_trait::Network;
use crate::error::{DetectionError, Result};
use crate::execution::{create_strategy, ExecutionStrategy};
use crate::frame_queue::{Dequeued, FrameQueue};
use crate::image_utils::{overlay_detections, OverlayStyle};
use crate::postprocessing::Suppressor;
use crate::preprocessing::ImagePreprocessor;
use crate::types::{ClassNames, Frame, ProcessedImage};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Log throughput every this many published frames
const STATS_LOG_INTERVAL: u64 = 100;

/// Lifecycle of the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    /// Shutdown signalled, waiting for the in-flight cycle to finish
    Stopping,
}

impl WorkerState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Presentation side of the pipeline
pub trait FramePublisher: Send + Sync {
    /// Take ownership of a finished image. Must not block the worker for long.
    fn publish(&self, image: ProcessedImage);
}

impl<F> FramePublisher for F
where
    F: Fn(ProcessedImage) + Send + Sync,
{
    fn publish(&self, image: ProcessedImage) {
        self(image)
    }
}

/// Publishes into an unbounded channel so presentation never back-pressures the worker
pub struct ChannelPublisher {
    tx: Sender<ProcessedImage>,
}

impl ChannelPublisher {
    pub fn unbounded() -> (Self, Receiver<ProcessedImage>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl FramePublisher for ChannelPublisher {
    fn publish(&self, image: ProcessedImage) {
        let sequence = image.sequence;
        if self.tx.send(image).is_err() {
            log::debug!("Presentation receiver gone, dropping frame {}", sequence);
        }
    }
}

/// Running counters for the worker loop
#[derive(Debug, Default)]
pub struct ProcessorStats {
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl ProcessorStats {
    /// Frames published
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Empty or malformed frames dropped before processing
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Frames whose cycle returned an error
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record_processed(&self) -> u64 {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for ProcessorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped, {} failed",
            self.processed(),
            self.skipped(),
            self.failed()
        )
    }
}

/// One full detection cycle over a single frame
#[derive(Clone)]
pub struct FramePipeline {
    preprocessor: ImagePreprocessor,
    detector: DetectorAdapter,
    suppressor: Suppressor,
    names: ClassNames,
    style: OverlayStyle,
}

impl FramePipeline {
    pub fn new(
        config: &PipelineConfig,
        model: ModelHandle,
        strategy: Arc<dyn ExecutionStrategy>,
    ) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config.input_size, strategy),
            detector: DetectorAdapter::new(model, config.confidence_threshold),
            suppressor: Suppressor::new(config.nms_score_threshold, config.nms_iou_threshold),
            names: ClassNames::default(),
            style: OverlayStyle::from_config(config),
        }
    }

    pub fn with_class_names(mut self, names: ClassNames) -> Self {
        self.names = names;
        self
    }

    /// Preprocess, detect, suppress, overlay and convert one frame
    pub fn process(&self, mut frame: Frame) -> Result<ProcessedImage> {
        let started = Instant::now();

        let tensor = self.preprocessor.prepare(&frame)?;
        let candidates = self.detector.detect(&tensor, frame.width, frame.height)?;
        let candidate_count = candidates.len();
        let detections = self.suppressor.apply(candidates);

        log::trace!(
            "Frame {}: {} candidates, {} kept",
            frame.sequence,
            candidate_count,
            detections.len()
        );

        overlay_detections(&mut frame, &detections, &self.names, &self.style)?;

        let (sequence, captured_at) = (frame.sequence, frame.captured_at);
        let image = self.preprocessor.strategy().to_display(frame)?;

        Ok(ProcessedImage {
            sequence,
            captured_at,
            image,
            detections,
            processing_time_ms: started.elapsed().as_secs_f32() * 1000.0,
        })
    }

    pub fn strategy(&self) -> &Arc<dyn ExecutionStrategy> {
        self.preprocessor.strategy()
    }

    pub fn model(&self) -> &ModelHandle {
        self.detector.model()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Owns the frame queue and the worker thread that drains it
pub struct FrameProcessor {
    config: PipelineConfig,
    queue: Arc<FrameQueue>,
    pipeline: FramePipeline,
    model: ModelHandle,
    publisher: Arc<dyn FramePublisher>,
    stats: Arc<ProcessorStats>,
    state: Arc<AtomicU8>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FrameProcessor {
    /// Create a processor with the strategy named by `config`.
    /// An unavailable accelerated device fails here.
    pub fn new<P>(config: PipelineConfig, model: ModelHandle, publisher: P) -> Result<Self>
    where
        P: FramePublisher + 'static,
    {
        config.validate()?;
        let strategy = create_strategy(&config)?;
        Self::with_strategy(config, model, publisher, strategy)
    }

    /// Create a processor around an already-built execution strategy
    pub fn with_strategy<P>(
        config: PipelineConfig,
        model: ModelHandle,
        publisher: P,
        strategy: Arc<dyn ExecutionStrategy>,
    ) -> Result<Self>
    where
        P: FramePublisher + 'static,
    {
        config.validate()?;
        log::info!(
            "Frame processor configured: {} strategy ({}), input {}x{}",
            strategy.kind(),
            strategy.name(),
            config.input_size.0,
            config.input_size.1
        );

        Ok(Self {
            queue: Arc::new(FrameQueue::with_max_depth(config.max_queue_depth)),
            pipeline: FramePipeline::new(&config, model.clone(), strategy),
            model,
            publisher: Arc::new(publisher),
            stats: Arc::new(ProcessorStats::default()),
            state: Arc::new(AtomicU8::new(WorkerState::Idle.as_u8())),
            worker: Mutex::new(None),
            config,
        })
    }

    /// Labels used for the box captions; takes effect on the next `start`
    pub fn with_class_names(mut self, names: ClassNames) -> Self {
        self.pipeline.names = names;
        self
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Hand a captured frame to the worker; returns its sequence number
    pub fn enqueue(&self, frame: Frame) -> u64 {
        self.queue.enqueue(frame)
    }

    /// Spawn the worker thread. Does nothing if it is already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock_worker();

        if worker.is_some() && self.state() == WorkerState::Running {
            log::debug!("Frame processor already running");
            return Ok(());
        }

        if !self.model.is_loaded()? {
            return Err(DetectionError::ModelNotLoaded);
        }

        // Reap a worker that ended on its own after a fatal error
        if let Some(finished) = worker.take() {
            if finished.join().is_err() {
                log::error!("Previous frame processor worker panicked");
            }
        }

        self.queue.reopen();
        self.set_state(WorkerState::Running);

        let queue = Arc::clone(&self.queue);
        let pipeline = self.pipeline.clone();
        let publisher = Arc::clone(&self.publisher);
        let stats = Arc::clone(&self.stats);
        let state = Arc::clone(&self.state);

        let spawned = thread::Builder::new()
            .name("frame-processor".to_string())
            .spawn(move || worker_loop(&queue, &pipeline, publisher.as_ref(), &stats, &state));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                log::info!("Frame processor started");
                Ok(())
            }
            Err(e) => {
                self.set_state(WorkerState::Idle);
                Err(e.into())
            }
        }
    }

    /// Signal shutdown, wait for the in-flight cycle and join the worker.
    ///
    /// Frames still queued are never processed; they are returned in
    /// enqueue order.
    pub fn stop(&self) -> Result<Vec<Frame>> {
        let mut worker = self.lock_worker();
        let mut panicked = false;

        if let Some(handle) = worker.take() {
            log::info!("Stopping frame processor");
            self.queue.shutdown();
            self.set_state(WorkerState::Stopping);
            panicked = handle.join().is_err();
        }
        self.set_state(WorkerState::Idle);

        if panicked {
            log::error!("Frame processor worker panicked");
            return Err(DetectionError::WorkerPanicked);
        }

        let drained = self.queue.drain();
        if !drained.is_empty() {
            log::info!("Returning {} unprocessed frames", drained.len());
        }
        log::info!("Frame processor stopped: {}", self.stats);
        Ok(drained)
    }

    /// Install a new network, waiting for any in-flight forward pass
    pub fn set_model(&self, network: Box<dyn Network>) -> Result<()> {
        let previous = self.model.replace(network)?;
        if let Some(previous) = previous {
            log::debug!("Released network '{}'", previous.name());
        }
        Ok(())
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for FrameProcessor {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::warn!("Frame processor shutdown failed: {}", e);
        }
    }
}

fn worker_loop(
    queue: &FrameQueue,
    pipeline: &FramePipeline,
    publisher: &dyn FramePublisher,
    stats: &ProcessorStats,
    state: &AtomicU8,
) {
    log::info!("Frame processor worker started ({})", pipeline.strategy().name());

    loop {
        let frame = match queue.dequeue_blocking() {
            Dequeued::Frame(frame) => frame,
            Dequeued::Stop => break,
        };

        let sequence = frame.sequence;
        if !frame.validate() {
            stats.record_skipped();
            log::debug!(
                "Skipping frame {}: {}x{} with {} bytes",
                sequence,
                frame.width,
                frame.height,
                frame.data.len()
            );
            continue;
        }

        // Only a panic under the model lock poisons it; anything else skips the frame
        let outcome = catch_unwind(AssertUnwindSafe(|| pipeline.process(frame)))
            .unwrap_or_else(|payload| match pipeline.model().is_loaded() {
                Err(e) => Err(e),
                Ok(_) => Err(DetectionError::CyclePanicked(panic_message(payload.as_ref()))),
            });

        match outcome {
            Ok(image) => {
                publisher.publish(image);
                let processed = stats.record_processed();
                if processed % STATS_LOG_INTERVAL == 0 {
                    log::info!("Frame processor: {}, {} queued", stats, queue.len());
                }
            }
            Err(e) if e.is_fatal() => {
                stats.record_failed();
                log::error!("Frame processor worker exiting on frame {}: {}", sequence, e);
                // Leave Stopping alone so a concurrent stop() still owns the transition
                let _ = state.compare_exchange(
                    WorkerState::Running.as_u8(),
                    WorkerState::Idle.as_u8(),
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                break;
            }
            Err(e) => {
                stats.record_failed();
                log::warn!("Frame {} failed: {}", sequence, e);
            }
        }
    }

    log::info!("Frame processor worker exited: {}", stats);
}
