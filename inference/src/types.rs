//! Type definitions shared by the frame pipeline

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

/// Pixel layout of an interleaved 3-channel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Blue-green-red, the native layout of most camera stacks
    Bgr,
    Rgb,
}

impl ImageFormat {
    /// Byte offsets of the (red, green, blue) channels within a pixel
    pub fn rgb_offsets(&self) -> (usize, usize, usize) {
        match self {
            Self::Bgr => (2, 1, 0),
            Self::Rgb => (0, 1, 2),
        }
    }
}

/// Raw camera frame handed from capture to the worker loop
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the capture stream, stamped by the frame queue
    pub sequence: u64,
    /// Interleaved pixel data, `height * width * 3` bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub captured_at: Instant,
}

impl Frame {
    /// Create a frame captured now
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            sequence: 0,
            data,
            width,
            height,
            format,
            captured_at: Instant::now(),
        }
    }

    /// Wrap an RGB image buffer
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, ImageFormat::Rgb)
    }

    /// Frame of uniform color, given in the frame's own channel order
    pub fn filled(width: u32, height: u32, format: ImageFormat, pixel: [u8; 3]) -> Self {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height, format)
    }

    pub fn channels(&self) -> u32 {
        3
    }

    /// Number of bytes a well-formed frame of this size carries
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty() || self.width == 0 || self.height == 0
    }

    /// Validate image data consistency
    pub fn validate(&self) -> bool {
        !self.is_empty() && self.data.len() == self.expected_len()
    }
}

/// Axis-aligned box in frame pixel coordinates (top-left corner + size)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from a centre point and size
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Check if two bounding boxes intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        let x_overlap = self.x < other.x + other.width && self.x + self.width > other.x;
        let y_overlap = self.y < other.y + other.height && self.y + self.height > other.y;
        x_overlap && y_overlap
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        if !self.intersects(other) {
            return 0.0;
        }

        let x_left = self.x.max(other.x);
        let y_top = self.y.max(other.y);
        let x_right = (self.x + self.width).min(other.x + other.width);
        let y_bottom = (self.y + self.height).min(other.y + other.height);

        let intersection_area = (x_right - x_left) * (y_bottom - y_top);
        let union_area = self.area() + other.area() - intersection_area;

        if union_area > 0.0 {
            intersection_area / union_area
        } else {
            0.0
        }
    }
}

/// Single detection: class, score and pixel box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    /// Detection confidence score (0-1)
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}

/// Display-ready output of one processing cycle
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Sequence number of the frame this image was rendered from
    pub sequence: u64,
    pub captured_at: Instant,
    /// RGB image with detections burned in
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    pub processing_time_ms: f32,
}

impl ProcessedImage {
    /// Capture-to-publish latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        self.captured_at.elapsed().as_secs_f32() * 1000.0
    }
}

/// Human-readable class labels indexed by class id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    /// COCO class names (80 classes)
    const COCO_CLASSES: &'static [&'static str] = &[
        "person",
        "bicycle",
        "car",
        "motorcycle",
        "airplane",
        "bus",
        "train",
        "truck",
        "boat",
        "traffic light",
        "fire hydrant",
        "stop sign",
        "parking meter",
        "bench",
        "bird",
        "cat",
        "dog",
        "horse",
        "sheep",
        "cow",
        "elephant",
        "bear",
        "zebra",
        "giraffe",
        "backpack",
        "umbrella",
        "handbag",
        "tie",
        "suitcase",
        "frisbee",
        "skis",
        "snowboard",
        "sports ball",
        "kite",
        "baseball bat",
        "baseball glove",
        "skateboard",
        "surfboard",
        "tennis racket",
        "bottle",
        "wine glass",
        "cup",
        "fork",
        "knife",
        "spoon",
        "bowl",
        "banana",
        "apple",
        "sandwich",
        "orange",
        "broccoli",
        "carrot",
        "hot dog",
        "pizza",
        "donut",
        "cake",
        "chair",
        "couch",
        "potted plant",
        "bed",
        "dining table",
        "toilet",
        "tv",
        "laptop",
        "mouse",
        "remote",
        "keyboard",
        "cell phone",
        "microwave",
        "oven",
        "toaster",
        "sink",
        "refrigerator",
        "book",
        "clock",
        "vase",
        "scissors",
        "teddy bear",
        "hair drier",
        "toothbrush",
    ];

    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The 80 COCO labels used by stock YOLO weights
    pub fn coco() -> Self {
        Self::new(Self::COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// Parse a Darknet `.names` list: one label per line, blank lines ignored
    pub fn from_reader<R: BufRead>(reader: R) -> crate::Result<Self> {
        let mut names = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                names.push(trimmed.to_string());
            }
        }
        Ok(Self::new(names))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Label for a class id, `class_N` when unknown
    pub fn name(&self, class_id: u32) -> String {
        self.names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validation() {
        let frame = Frame::filled(4, 3, ImageFormat::Bgr, [1, 2, 3]);
        assert!(frame.validate());
        assert_eq!(frame.data.len(), 36);
        assert_eq!(&frame.data[3..6], &[1, 2, 3]);

        let truncated = Frame::new(vec![0; 10], 4, 3, ImageFormat::Bgr);
        assert!(!truncated.validate());

        let empty = Frame::new(Vec::new(), 0, 0, ImageFormat::Bgr);
        assert!(empty.is_empty());
        assert!(!empty.validate());
    }

    #[test]
    fn test_bounding_box_iou() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BoundingBox::new(0.0, 0.0, 100.0, 60.0);
        assert!((a.iou(&b) - 0.6).abs() < 1e-6);

        let far = BoundingBox::new(200.0, 200.0, 10.0, 10.0);
        assert_eq!(a.iou(&far), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_from_center() {
        let bbox = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(bbox, BoundingBox::new(40.0, 35.0, 20.0, 10.0));
        assert_eq!(bbox.center(), (50.0, 40.0));
    }

    #[test]
    fn test_class_names() {
        let coco = ClassNames::coco();
        assert_eq!(coco.len(), 80);
        assert_eq!(coco.name(0), "person");
        assert_eq!(coco.name(79), "toothbrush");
        assert_eq!(coco.name(500), "class_500");

        let custom = ClassNames::from_reader("cat\n\n dog \n".as_bytes()).unwrap();
        assert_eq!(custom.len(), 2);
        assert_eq!(custom.name(1), "dog");
    }
}
