/// Network trait for the external inference capability
///
/// The pipeline never runs a model itself: it hands a preprocessed tensor
/// to whatever implements this interface and decodes the raw rows it returns.
use crate::error::Result;
use ndarray::{Array2, Array4};

/// A loaded neural network that can run a forward pass
pub trait Network: Send {
    /// Set the input blob and run a forward pass over every output layer.
    ///
    /// Each returned matrix holds one detection row per anchor, laid out as
    /// `[cx, cy, w, h, objectness, class scores...]` with box values given as
    /// fractions of the input frame.
    fn forward(&mut self, input: &Array4<f32>) -> Result<Vec<Array2<f32>>>;

    /// Get the network name (for logging/debugging)
    fn name(&self) -> &str;
}
