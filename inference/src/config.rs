//! Pipeline configuration

use crate::error::{DetectionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where preprocessing and display conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Offload resize and color conversion to a compute device
    Accelerated,
    /// Host memory only
    Fallback,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accelerated => write!(f, "accelerated"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Configuration for the frame processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detector input resolution (width, height)
    pub input_size: (u32, u32),

    /// Minimum class score for a decoded row to become a candidate (exclusive)
    pub confidence_threshold: f32,

    /// Entry floor for non-max suppression (exclusive)
    pub nms_score_threshold: f32,

    /// Overlap above which the lower-scored box is suppressed
    pub nms_iou_threshold: f32,

    pub strategy: StrategyKind,

    /// Device ordinal for the accelerated strategy
    pub device_index: usize,

    /// Drop-oldest bound on the frame queue; `None` keeps it unbounded
    pub max_queue_depth: Option<usize>,

    /// Render "<label> <score>" above each box
    pub draw_labels: bool,

    pub box_thickness: u32,

    /// Box color in display (RGB) order
    pub box_color: [u8; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_size: (416, 416),
            confidence_threshold: 0.5,
            nms_score_threshold: 0.5,
            nms_iou_threshold: 0.4,
            strategy: StrategyKind::Fallback,
            device_index: 0,
            max_queue_depth: None,
            draw_labels: true,
            box_thickness: 2,
            box_color: [0, 255, 0],
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.input_size = (width, height);
        self
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("confidence_threshold", self.confidence_threshold),
            ("nms_score_threshold", self.nms_score_threshold),
            ("nms_iou_threshold", self.nms_iou_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(DetectionError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.input_size.0 == 0 || self.input_size.1 == 0 {
            return Err(DetectionError::config(format!(
                "input_size must be non-zero, got {:?}",
                self.input_size
            )));
        }

        if self.box_thickness == 0 {
            return Err(DetectionError::config("box_thickness must be at least 1"));
        }

        if self.max_queue_depth == Some(0) {
            return Err(DetectionError::config(
                "max_queue_depth must be at least 1 (omit it for an unbounded queue)",
            ));
        }

        Ok(())
    }
}
