//! Frame preprocessing: resize, normalize and reorder into the detector's input tensor

use crate::error::{DetectionError, Result};
use crate::execution::ExecutionStrategy;
use crate::types::{Frame, ImageFormat};
use ndarray::Array4;
use std::sync::Arc;

/// Prepares raw frames as `[1, 3, H, W]` planar RGB tensors scaled to [0, 1]
#[derive(Clone)]
pub struct ImagePreprocessor {
    /// Target input size (width, height)
    input_size: (u32, u32),
    strategy: Arc<dyn ExecutionStrategy>,
}

impl ImagePreprocessor {
    pub fn new(input_size: (u32, u32), strategy: Arc<dyn ExecutionStrategy>) -> Self {
        Self {
            input_size,
            strategy,
        }
    }

    /// Resize through the active strategy and convert to a tensor blob
    pub fn prepare(&self, frame: &Frame) -> Result<Array4<f32>> {
        if !frame.validate() {
            return Err(DetectionError::preprocessing(
                "Invalid image data: size mismatch".to_string(),
            ));
        }

        let (width, height) = self.input_size;
        let resized = self.strategy.resize(frame, width, height)?;
        self.to_tensor(&resized, frame.format)
    }

    /// Interleaved pixels (HWC) to planar RGB (NCHW), scaled by 1/255
    fn to_tensor(&self, data: &[u8], format: ImageFormat) -> Result<Array4<f32>> {
        let (width, height) = (self.input_size.0 as usize, self.input_size.1 as usize);
        let expected = width * height * 3;
        if data.len() != expected {
            return Err(DetectionError::InvalidDimensions {
                expected: vec![expected],
                actual: vec![data.len()],
            });
        }

        let (r, g, b) = format.rgb_offsets();
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));

        for (idx, pixel) in data.chunks_exact(3).enumerate() {
            let (y, x) = (idx / width, idx % width);
            tensor[[0, 0, y, x]] = pixel[r] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[g] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[b] as f32 / 255.0;
        }

        Ok(tensor)
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    pub fn strategy(&self) -> &Arc<dyn ExecutionStrategy> {
        &self.strategy
    }
}
