// Stub network returning canned output layers
// Lets the pipeline, tests and benches run without a real model backend

use crate::detector::CLASS_SCORES_OFFSET;
use crate::detector_trait::Network;
use crate::error::Result;
use ndarray::{Array2, Array4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Network that replays the same raw output layers on every forward pass
pub struct StubNetwork {
    name: String,
    outputs: Vec<Array2<f32>>,
    calls: Arc<AtomicUsize>,
}

impl StubNetwork {
    /// Create a stub that returns `outputs` for every input
    pub fn new(outputs: Vec<Array2<f32>>) -> Self {
        log::info!("Creating stub network ({} output layers)", outputs.len());
        Self {
            name: "stub".to_string(),
            outputs,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stub that detects nothing: a single layer with no rows
    pub fn empty(num_classes: usize) -> Self {
        Self::new(vec![Array2::zeros((0, CLASS_SCORES_OFFSET + num_classes))])
    }

    /// Build a one-row output layer for a single object.
    ///
    /// Box values are fractions of the frame, `class_id` gets `score` and
    /// every other class scores zero.
    pub fn single_row(
        center: (f32, f32),
        size: (f32, f32),
        class_id: usize,
        score: f32,
        num_classes: usize,
    ) -> Array2<f32> {
        let mut row = Array2::zeros((1, CLASS_SCORES_OFFSET + num_classes));
        row[[0, 0]] = center.0;
        row[[0, 1]] = center.1;
        row[[0, 2]] = size.0;
        row[[0, 3]] = size.1;
        row[[0, 4]] = score;
        if class_id < num_classes {
            row[[0, CLASS_SCORES_OFFSET + class_id]] = score;
        }
        row
    }

    /// Shared forward-pass counter, still readable after the stub is boxed
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Network for StubNetwork {
    fn forward(&mut self, input: &Array4<f32>) -> Result<Vec<Array2<f32>>> {
        log::trace!("Stub forward pass on input {:?}", input.shape());
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.outputs.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_outputs_and_counts_calls() {
        let layer = StubNetwork::single_row((0.5, 0.5), (0.1, 0.2), 2, 0.9, 4);
        let mut stub = StubNetwork::new(vec![layer.clone()]);
        let input = Array4::<f32>::zeros((1, 3, 8, 8));

        assert_eq!(stub.forward(&input).unwrap(), vec![layer.clone()]);
        assert_eq!(stub.forward(&input).unwrap(), vec![layer]);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_single_row_layout() {
        let layer = StubNetwork::single_row((0.25, 0.75), (0.1, 0.2), 1, 0.8, 3);
        assert_eq!(layer.shape(), &[1, 8]);
        assert_eq!(layer[[0, 0]], 0.25);
        assert_eq!(layer[[0, 1]], 0.75);
        assert_eq!(layer[[0, 6]], 0.8);
        assert_eq!(layer[[0, 5]], 0.0);
    }

    #[test]
    fn test_empty_has_no_rows() {
        let mut stub = StubNetwork::empty(80);
        let outputs = stub.forward(&Array4::zeros((1, 3, 2, 2))).unwrap();
        assert_eq!(outputs[0].shape(), &[0, 85]);
    }
}
