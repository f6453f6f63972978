//! Execution strategies for resize and display color conversion
//!
//! The worker picks one strategy at configuration time:
//! - `HostStrategy` resizes and converts in host memory with the `image` crate
//! - `DeviceStrategy` uploads to a `ComputeDevice`, works on device-resident
//!   buffers and downloads the result
//!
//! Both resize with a Catmull-Rom bicubic kernel, so their outputs agree to
//! within `STRATEGY_TOLERANCE` per channel.

use crate::config::{PipelineConfig, StrategyKind};
use crate::error::{DetectionError, Result};
use crate::types::{Frame, ImageFormat};
use fast_image_resize as fr;
use image::{imageops, ImageBuffer, Rgb, RgbImage};
use rayon::prelude::*;
use std::sync::{Arc, Mutex};

/// Largest per-channel difference allowed between the two resize paths
pub const STRATEGY_TOLERANCE: u8 = 3;

/// Resize and display conversion, host or device side
pub trait ExecutionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Get the strategy name (for logging/debugging)
    fn name(&self) -> String;

    /// Resize an interleaved 3-channel frame, keeping its channel order
    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>>;

    /// Convert a frame into an RGB image for presentation
    fn to_display(&self, frame: Frame) -> Result<RgbImage>;
}

/// Build the strategy named by the configuration.
/// A missing accelerated device is an error, never a silent fallback.
pub fn create_strategy(config: &PipelineConfig) -> Result<Arc<dyn ExecutionStrategy>> {
    match config.strategy {
        StrategyKind::Fallback => Ok(Arc::new(HostStrategy::new())),
        StrategyKind::Accelerated => {
            let device = SimdDevice::open(config.device_index)?;
            log::info!("Accelerated preprocessing on {}", device.name());
            Ok(Arc::new(DeviceStrategy::new(device)))
        }
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    if !frame.validate() {
        return Err(DetectionError::InvalidDimensions {
            expected: vec![
                frame.height as usize,
                frame.width as usize,
                frame.channels() as usize,
            ],
            actual: vec![frame.data.len()],
        });
    }
    Ok(())
}

fn swap_first_and_third(pixels: &mut [u8]) {
    pixels
        .par_chunks_exact_mut(3)
        .for_each(|pixel| pixel.swap(0, 2));
}

/// Fallback path: everything in host memory
#[derive(Debug, Default, Clone, Copy)]
pub struct HostStrategy;

impl HostStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionStrategy for HostStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    fn name(&self) -> String {
        "host".to_string()
    }

    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>> {
        check_frame(frame)?;
        if frame.width == width && frame.height == height {
            return Ok(frame.data.clone());
        }

        // Channel order is irrelevant to the filter; the Rgb wrapper only fixes the stride
        let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(
            frame.width,
            frame.height,
            frame.data.as_slice(),
        )
        .ok_or_else(|| DetectionError::preprocessing("Failed to create image buffer"))?;

        let resized = imageops::resize(&view, width, height, imageops::FilterType::CatmullRom);
        Ok(resized.into_raw())
    }

    fn to_display(&self, frame: Frame) -> Result<RgbImage> {
        check_frame(&frame)?;
        let Frame {
            mut data,
            width,
            height,
            format,
            ..
        } = frame;

        if format == ImageFormat::Bgr {
            swap_first_and_third(&mut data);
        }

        RgbImage::from_raw(width, height, data)
            .ok_or_else(|| DetectionError::preprocessing("Failed to create display image"))
    }
}

/// Offload target for the accelerated path.
///
/// Buffers returned by `upload` and `resize` live on the device until
/// `download` hands the bytes back to the host.
pub trait ComputeDevice: Send {
    type Buffer: Send;

    fn name(&self) -> String;

    /// Copy interleaved 3-channel pixels into a device buffer
    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Self::Buffer>;

    /// Bicubic resize into a new device buffer
    fn resize(&mut self, src: &Self::Buffer, width: u32, height: u32) -> Result<Self::Buffer>;

    /// Exchange the first and third channel in place
    fn swap_red_blue(&mut self, buffer: &mut Self::Buffer) -> Result<()>;

    /// Copy a device buffer back to host memory, releasing it
    fn download(&mut self, buffer: Self::Buffer) -> Result<Vec<u8>>;

    /// Release a buffer without reading it back
    fn free(&mut self, buffer: Self::Buffer) {
        drop(buffer);
    }
}

/// Accelerated path over any `ComputeDevice`
pub struct DeviceStrategy<D: ComputeDevice> {
    device: Mutex<D>,
}

impl<D: ComputeDevice> DeviceStrategy<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    fn with_device<R>(&self, f: impl FnOnce(&mut D) -> Result<R>) -> Result<R> {
        let mut device = self
            .device
            .lock()
            .map_err(|_| DetectionError::device("device lock poisoned"))?;
        f(&mut device)
    }
}

impl<D: ComputeDevice> ExecutionStrategy for DeviceStrategy<D> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Accelerated
    }

    fn name(&self) -> String {
        self.with_device(|device| Ok(device.name()))
            .unwrap_or_else(|_| "device".to_string())
    }

    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<Vec<u8>> {
        check_frame(frame)?;
        self.with_device(|device| {
            let uploaded = device.upload(&frame.data, frame.width, frame.height)?;
            let resized = device.resize(&uploaded, width, height)?;
            device.free(uploaded);
            device.download(resized)
        })
    }

    fn to_display(&self, frame: Frame) -> Result<RgbImage> {
        check_frame(&frame)?;
        let (width, height) = (frame.width, frame.height);
        let pixels = self.with_device(|device| {
            let mut buffer = device.upload(&frame.data, width, height)?;
            if frame.format == ImageFormat::Bgr {
                device.swap_red_blue(&mut buffer)?;
            }
            device.download(buffer)
        })?;

        RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| DetectionError::device("Downloaded buffer has the wrong size"))
    }
}

/// Device buffer of a `SimdDevice`
pub struct SimdBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Vectorised resize engine with its own pool of resident buffers.
///
/// Uses the widest SIMD extension `fast_image_resize` detects at runtime.
pub struct SimdDevice {
    index: usize,
    resizer: fr::Resizer,
    options: fr::ResizeOptions,
    pool: Vec<Vec<u8>>,
}

impl SimdDevice {
    /// Keep a few buffers around for reuse between frames
    const POOL_LIMIT: usize = 4;

    /// Number of devices this backend exposes
    pub fn device_count() -> usize {
        1
    }

    pub fn open(index: usize) -> Result<Self> {
        let available = Self::device_count();
        if index >= available {
            return Err(DetectionError::DeviceUnavailable { index, available });
        }

        Ok(Self {
            index,
            resizer: fr::Resizer::new(),
            options: fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom)),
            pool: Vec::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn allocate(&mut self, len: usize) -> Vec<u8> {
        let mut pixels = self.pool.pop().unwrap_or_default();
        pixels.clear();
        pixels.resize(len, 0);
        pixels
    }

    fn release(&mut self, pixels: Vec<u8>) {
        if self.pool.len() < Self::POOL_LIMIT {
            self.pool.push(pixels);
        }
    }
}

impl ComputeDevice for SimdDevice {
    type Buffer = SimdBuffer;

    fn name(&self) -> String {
        format!("simd:{}", self.index)
    }

    fn upload(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<SimdBuffer> {
        let len = width as usize * height as usize * 3;
        if pixels.len() != len {
            return Err(DetectionError::InvalidDimensions {
                expected: vec![len],
                actual: vec![pixels.len()],
            });
        }

        let mut resident = self.allocate(len);
        resident.copy_from_slice(pixels);
        Ok(SimdBuffer {
            width,
            height,
            pixels: resident,
        })
    }

    fn resize(&mut self, src: &SimdBuffer, width: u32, height: u32) -> Result<SimdBuffer> {
        let src_image =
            fr::images::ImageRef::new(src.width, src.height, &src.pixels, fr::PixelType::U8x3)
                .map_err(|e| DetectionError::device(format!("invalid source buffer: {}", e)))?;

        let len = width as usize * height as usize * 3;
        let target = self.allocate(len);
        let mut dst_image =
            fr::images::Image::from_vec_u8(width, height, target, fr::PixelType::U8x3)
                .map_err(|e| DetectionError::device(format!("invalid target buffer: {}", e)))?;

        self.resizer
            .resize(&src_image, &mut dst_image, Some(&self.options))
            .map_err(|e| DetectionError::device(format!("resize failed: {}", e)))?;

        Ok(SimdBuffer {
            width,
            height,
            pixels: dst_image.into_vec(),
        })
    }

    fn swap_red_blue(&mut self, buffer: &mut SimdBuffer) -> Result<()> {
        swap_first_and_third(&mut buffer.pixels);
        Ok(())
    }

    fn download(&mut self, buffer: SimdBuffer) -> Result<Vec<u8>> {
        let host = buffer.pixels.clone();
        self.release(buffer.pixels);
        Ok(host)
    }

    fn free(&mut self, buffer: SimdBuffer) {
        self.release(buffer.pixels);
    }
}
