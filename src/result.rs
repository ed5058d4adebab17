use serde::{Deserialize, Serialize};

/// Axis-aligned box in source image pixels, origin top-left, y growing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Vertical center used to group boxes into lines.
    pub fn y_center(&self) -> f32 {
        (self.y1 as f32 + self.y2 as f32) / 2.0
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32) -> Self {
        Self {
            bbox: BoundingBox::new(x1, y1, x2, y2),
            confidence,
        }
    }
}

/// Recognized text of one region. The detector confidence is not carried over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub text: String,
    pub bbox: BoundingBox,
}

/// All records of one image, in reading order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageResult {
    pub records: Vec<TranscriptRecord>,
}

impl PageResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TranscriptRecord> {
        self.records.iter()
    }
}

impl From<Vec<TranscriptRecord>> for PageResult {
    fn from(records: Vec<TranscriptRecord>) -> Self {
        Self { records }
    }
}

impl IntoIterator for PageResult {
    type Item = TranscriptRecord;
    type IntoIter = std::vec::IntoIter<TranscriptRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a PageResult {
    type Item = &'a TranscriptRecord;
    type IntoIter = std::slice::Iter<'a, TranscriptRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
