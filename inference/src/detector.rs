//! Detector adapter: guarded model handle, forward pass and output decoding

use crate::detector_trait::Network;
use crate::error::{DetectionError, Result};
use crate::types::{BoundingBox, Detection};
use ndarray::{Array2, Array4};
use std::sync::{Arc, Mutex, MutexGuard};

/// Column where class scores start in a raw output row
pub const CLASS_SCORES_OFFSET: usize = 5;

/// Shared, exclusively-locked handle to the inference network.
///
/// Forward passes and replacement take the same lock, so a swap never
/// lands in the middle of an inference.
#[derive(Clone, Default)]
pub struct ModelHandle {
    inner: Arc<Mutex<Option<Box<dyn Network>>>>,
}

impl ModelHandle {
    /// Handle with no network installed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(network: Box<dyn Network>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(network))),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Box<dyn Network>>>> {
        self.inner
            .lock()
            .map_err(|_| DetectionError::ModelLockPoisoned)
    }

    /// Install a network, returning the one it replaces
    pub fn replace(&self, network: Box<dyn Network>) -> Result<Option<Box<dyn Network>>> {
        let mut slot = self.lock()?;
        log::info!("Installing network '{}'", network.name());
        Ok(slot.replace(network))
    }

    pub fn is_loaded(&self) -> Result<bool> {
        Ok(self.lock()?.is_some())
    }

    /// Run `f` with exclusive access to the installed network
    pub fn with_network<R>(&self, f: impl FnOnce(&mut dyn Network) -> Result<R>) -> Result<R> {
        let mut slot = self.lock()?;
        let network = slot.as_mut().ok_or(DetectionError::ModelNotLoaded)?;
        f(&mut **network)
    }
}

/// Runs the forward pass and turns raw rows into candidate detections
#[derive(Clone)]
pub struct DetectorAdapter {
    model: ModelHandle,
    confidence_threshold: f32,
}

impl DetectorAdapter {
    pub fn new(model: ModelHandle, confidence_threshold: f32) -> Self {
        Self {
            model,
            confidence_threshold,
        }
    }

    /// Forward pass under the model lock
    pub fn infer(&self, input: &Array4<f32>) -> Result<Vec<Array2<f32>>> {
        self.model.with_network(|network| network.forward(input))
    }

    /// Infer and decode in one step
    pub fn detect(
        &self,
        input: &Array4<f32>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>> {
        let outputs = self.infer(input)?;
        decode(
            &outputs,
            frame_width,
            frame_height,
            self.confidence_threshold,
        )
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}

/// Decode raw output rows into candidates in frame pixel coordinates.
///
/// A row becomes a candidate when its best class score is strictly above
/// `confidence_threshold`. No suppression happens here.
pub fn decode(
    outputs: &[Array2<f32>],
    frame_width: u32,
    frame_height: u32,
    confidence_threshold: f32,
) -> Result<Vec<Detection>> {
    let (frame_w, frame_h) = (frame_width as f32, frame_height as f32);
    let mut detections = Vec::new();

    for output in outputs {
        if output.nrows() == 0 {
            continue;
        }
        if output.ncols() <= CLASS_SCORES_OFFSET {
            return Err(DetectionError::inference(format!(
                "Invalid output shape: expected more than {} columns, got {}",
                CLASS_SCORES_OFFSET,
                output.ncols()
            )));
        }

        for row in output.rows() {
            let Some((class_id, confidence)) = row
                .iter()
                .skip(CLASS_SCORES_OFFSET)
                .copied()
                .enumerate()
                .fold(None, |best: Option<(usize, f32)>, (idx, score)| match best {
                    Some((_, best_score)) if best_score >= score => best,
                    _ => Some((idx, score)),
                })
            else {
                continue;
            };

            if confidence.is_nan() || confidence <= confidence_threshold {
                continue;
            }

            let bbox = BoundingBox::from_center(
                row[0] * frame_w,
                row[1] * frame_h,
                row[2] * frame_w,
                row[3] * frame_h,
            );
            detections.push(Detection::new(class_id as u32, confidence, bbox));
        }
    }

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector_stub::StubNetwork;
    use ndarray::array;
    use std::thread;

    /// Row with box fractions, objectness and three class scores
    fn row(cx: f32, cy: f32, w: f32, h: f32, scores: [f32; 3]) -> [f32; 8] {
        [cx, cy, w, h, 1.0, scores[0], scores[1], scores[2]]
    }

    fn output(rows: &[[f32; 8]]) -> Array2<f32> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), 8), flat).unwrap()
    }

    #[test]
    fn test_decode_keeps_rows_above_threshold() {
        let outputs = vec![output(&[
            row(0.5, 0.5, 0.2, 0.4, [0.1, 0.9, 0.0]),
            row(0.2, 0.2, 0.1, 0.1, [0.3, 0.0, 0.1]),
        ])];

        let detections = decode(&outputs, 640, 480, 0.5).unwrap();
        assert_eq!(detections.len(), 1);

        let det = &detections[0];
        assert_eq!(det.class_id, 1);
        assert!((det.confidence - 0.9).abs() < 1e-6);
        assert!((det.bbox.x - 256.0).abs() < 1e-3);
        assert!((det.bbox.y - 144.0).abs() < 1e-3);
        assert!((det.bbox.width - 128.0).abs() < 1e-3);
        assert!((det.bbox.height - 192.0).abs() < 1e-3);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let outputs = vec![output(&[row(0.5, 0.5, 0.2, 0.2, [0.5, 0.0, 0.0])])];
        assert!(decode(&outputs, 100, 100, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_decode_spans_all_output_layers() {
        let outputs = vec![
            output(&[row(0.1, 0.1, 0.1, 0.1, [0.0, 0.0, 0.8])]),
            output(&[row(0.9, 0.9, 0.1, 0.1, [0.7, 0.0, 0.0])]),
        ];
        let detections = decode(&outputs, 100, 100, 0.5).unwrap();
        let classes: Vec<u32> = detections.iter().map(|d| d.class_id).collect();
        assert_eq!(classes, vec![2, 0]);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let outputs = vec![output(&[
            row(0.3, 0.3, 0.2, 0.2, [0.6, 0.7, 0.0]),
            row(0.6, 0.6, 0.3, 0.3, [0.0, 0.0, 0.95]),
        ])];
        let first = decode(&outputs, 416, 416, 0.5).unwrap();
        let second = decode(&outputs, 416, 416, 0.5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_output_rejected() {
        let outputs = vec![array![[0.5, 0.5, 0.1, 0.1, 0.9]]];
        assert!(matches!(
            decode(&outputs, 10, 10, 0.5),
            Err(DetectionError::InferenceError(_))
        ));
    }

    #[test]
    fn test_infer_requires_model() {
        let adapter = DetectorAdapter::new(ModelHandle::empty(), 0.5);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(matches!(
            adapter.infer(&input),
            Err(DetectionError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_replace_while_inferring() {
        let model = ModelHandle::new(Box::new(StubNetwork::new(vec![output(&[row(
            0.5,
            0.5,
            0.2,
            0.2,
            [0.9, 0.0, 0.0],
        )])])));
        let adapter = DetectorAdapter::new(model.clone(), 0.5);

        let swapper = {
            let model = model.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let stub = StubNetwork::new(vec![output(&[row(
                        0.5,
                        0.5,
                        0.2,
                        0.2,
                        [0.9, 0.0, 0.0],
                    )])]);
                    model.replace(Box::new(stub)).unwrap();
                }
            })
        };

        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        for _ in 0..50 {
            let detections = adapter.detect(&input, 100, 100).unwrap();
            assert_eq!(detections.len(), 1);
        }
        swapper.join().unwrap();
        assert!(model.is_loaded().unwrap());
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let model = ModelHandle::new(Box::new(StubNetwork::empty(3)));
        let poisoner = model.clone();
        let _ = thread::spawn(move || {
            poisoner
                .with_network(|_| -> Result<()> { panic!("network crashed") })
                .ok();
        })
        .join();

        let adapter = DetectorAdapter::new(model, 0.5);
        let err = adapter
            .infer(&Array4::<f32>::zeros((1, 3, 4, 4)))
            .unwrap_err();
        assert!(matches!(err, DetectionError::ModelLockPoisoned));
        assert!(err.is_fatal());
    }
}
