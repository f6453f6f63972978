//! Postprocessing: confidence floor and non-maximum suppression

use crate::types::Detection;
use std::cmp::Ordering;

/// Apply Non-Maximum Suppression across all classes.
///
/// Candidates scoring at or below `score_threshold` are ignored. The rest are
/// visited in descending confidence order (ties keep input order) and a
/// candidate is dropped when its IoU with any already-kept box exceeds
/// `iou_threshold`. Returns indices into `candidates`, highest score first.
pub fn suppress(candidates: &[Detection], score_threshold: f32, iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].confidence > score_threshold)
        .collect();

    // Stable sort, so equal scores stay in input order
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .partial_cmp(&candidates[a].confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    for idx in order {
        let bbox = &candidates[idx].bbox;
        let overlaps = keep
            .iter()
            .any(|&kept| candidates[kept].bbox.iou(bbox) > iou_threshold);
        if !overlaps {
            keep.push(idx);
        }
    }

    keep
}

/// Suppression settings bound together for the worker loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Suppressor {
    /// Minimum score a candidate must exceed
    score_threshold: f32,
    /// Overlap above which the weaker box is dropped
    iou_threshold: f32,
}

impl Suppressor {
    pub fn new(score_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            score_threshold,
            iou_threshold,
        }
    }

    /// Kept indices, highest score first
    pub fn keep_indices(&self, candidates: &[Detection]) -> Vec<usize> {
        suppress(candidates, self.score_threshold, self.iou_threshold)
    }

    /// Consume the candidates and return the survivors, highest score first
    pub fn apply(&self, candidates: Vec<Detection>) -> Vec<Detection> {
        let keep = self.keep_indices(&candidates);
        let mut slots: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
        keep.into_iter().filter_map(|i| slots[i].take()).collect()
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }
}

impl Default for Suppressor {
    fn default() -> Self {
        Self::new(0.5, 0.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use rand::{Rng, SeedableRng};

    fn det(class_id: u32, confidence: f32, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(x, y, w, h))
    }

    #[test]
    fn test_overlapping_boxes_keep_strongest() {
        // IoU of these two is 0.6
        let candidates = vec![
            det(0, 0.8, 0.0, 0.0, 100.0, 100.0),
            det(0, 0.7, 0.0, 0.0, 100.0, 60.0),
        ];
        assert_eq!(suppress(&candidates, 0.5, 0.4), vec![0]);
    }

    #[test]
    fn test_suppression_ignores_class() {
        let candidates = vec![
            det(3, 0.7, 0.0, 0.0, 100.0, 60.0),
            det(1, 0.8, 0.0, 0.0, 100.0, 100.0),
        ];
        assert_eq!(suppress(&candidates, 0.5, 0.4), vec![1]);
    }

    #[test]
    fn test_score_floor_is_exclusive() {
        let candidates = vec![
            det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
            det(0, 0.51, 50.0, 50.0, 10.0, 10.0),
            det(0, 0.2, 100.0, 100.0, 10.0, 10.0),
        ];
        assert_eq!(suppress(&candidates, 0.5, 0.4), vec![1]);
    }

    #[test]
    fn test_disjoint_boxes_sorted_by_score() {
        let candidates = vec![
            det(0, 0.6, 0.0, 0.0, 10.0, 10.0),
            det(0, 0.9, 20.0, 0.0, 10.0, 10.0),
            det(0, 0.75, 40.0, 0.0, 10.0, 10.0),
        ];
        assert_eq!(suppress(&candidates, 0.5, 0.4), vec![1, 2, 0]);
    }

    #[test]
    fn test_equal_scores_keep_input_order() {
        let candidates = vec![
            det(0, 0.9, 0.0, 0.0, 100.0, 100.0),
            det(0, 0.9, 0.0, 0.0, 100.0, 100.0),
            det(0, 0.9, 500.0, 500.0, 10.0, 10.0),
        ];
        assert_eq!(suppress(&candidates, 0.5, 0.4), vec![0, 2]);
    }

    #[test]
    fn test_empty_input() {
        assert!(suppress(&[], 0.5, 0.4).is_empty());
        assert!(Suppressor::default().apply(Vec::new()).is_empty());
    }

    #[test]
    fn test_apply_returns_survivors() {
        let suppressor = Suppressor::new(0.5, 0.4);
        let survivors = suppressor.apply(vec![
            det(2, 0.7, 0.0, 0.0, 100.0, 60.0),
            det(5, 0.8, 0.0, 0.0, 100.0, 100.0),
            det(7, 0.6, 300.0, 300.0, 20.0, 20.0),
        ]);
        let classes: Vec<u32> = survivors.iter().map(|d| d.class_id).collect();
        assert_eq!(classes, vec![5, 7]);
    }

    #[test]
    fn test_kept_boxes_never_overlap_beyond_threshold() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let iou_threshold = 0.4;

        for _ in 0..50 {
            let candidates: Vec<Detection> = (0..40)
                .map(|_| {
                    det(
                        rng.gen_range(0..5),
                        rng.gen_range(0.0..1.0),
                        rng.gen_range(0.0..200.0),
                        rng.gen_range(0.0..200.0),
                        rng.gen_range(5.0..80.0),
                        rng.gen_range(5.0..80.0),
                    )
                })
                .collect();

            let keep = suppress(&candidates, 0.5, iou_threshold);
            for (i, &a) in keep.iter().enumerate() {
                assert!(candidates[a].confidence > 0.5);
                for &b in &keep[i + 1..] {
                    assert!(candidates[a].confidence >= candidates[b].confidence);
                    assert!(candidates[a].bbox.iou(&candidates[b].bbox) <= iou_threshold);
                }
            }
        }
    }
}
