use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label set attached to a detection. Ordered only so serialization is stable.
pub type LabelSet = BTreeSet<String>;

/// PPE categories a backend can claim to detect.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PpeClass {
    Helmet,
    Vest,
    Gloves,
    Mask,
    Boots,
}

impl PpeClass {
    pub const ALL: [PpeClass; 5] = [
        PpeClass::Helmet,
        PpeClass::Vest,
        PpeClass::Gloves,
        PpeClass::Boots,
        PpeClass::Mask,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PpeClass::Helmet => "helmet",
            PpeClass::Vest => "vest",
            PpeClass::Gloves => "gloves",
            PpeClass::Mask => "mask",
            PpeClass::Boots => "boots",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|class| class.label() == lowered)
    }
}

impl fmt::Display for PpeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Region of interest, normalized to `[0, 1]` against image width and height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    /// Normalize a pixel rectangle. Returns `None` for a zero-sized image.
    pub fn from_pixels(x: u32, y: u32, w: u32, h: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let fw = f64::from(width);
        let fh = f64::from(height);
        Some(Self {
            x: (f64::from(x) / fw).clamp(0.0, 1.0),
            y: (f64::from(y) / fh).clamp(0.0, 1.0),
            w: (f64::from(w) / fw).clamp(0.0, 1.0),
            h: (f64::from(h) / fh).clamp(0.0, 1.0),
        })
    }

    pub fn is_normalized(&self) -> bool {
        [self.x, self.y, self.w, self.h]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// Result of running the detector on one image.
///
/// `region` is `None` when nothing was localized. The legacy two-value contract
/// (labels plus an always-populated rectangle) is available through
/// [`Detection::bounding_box`], which reports an absent region as `{0,0,0,0}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detection {
    pub labels: LabelSet,
    pub region: Option<BoundingBox>,
}

impl Detection {
    /// Outcome for undecodable input.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.region.unwrap_or_default()
    }

    pub fn has_label(&self, class: PpeClass) -> bool {
        self.labels.contains(class.label())
    }

    pub fn labels_vec(&self) -> Vec<String> {
        self.labels.iter().cloned().collect()
    }
}

/// What a single backend contributes to a detection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendFinding {
    pub classes: Vec<PpeClass>,
    pub region: Option<BoundingBox>,
}

impl BackendFinding {
    pub fn nothing() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_region_reports_zero_rectangle() {
        let detection = Detection::empty();
        assert!(detection.labels.is_empty());
        assert_eq!(detection.region, None);
        assert_eq!(detection.bounding_box(), BoundingBox::default());
    }

    #[test]
    fn pixel_rectangles_normalize_against_image_size() {
        let bbox = BoundingBox::from_pixels(10, 20, 50, 40, 100, 80).unwrap();
        assert_eq!(bbox, BoundingBox { x: 0.1, y: 0.25, w: 0.5, h: 0.5 });
        assert!(bbox.is_normalized());
        assert!(BoundingBox::from_pixels(0, 0, 1, 1, 0, 10).is_none());
    }

    #[test]
    fn classes_parse_case_insensitively() {
        assert_eq!(PpeClass::from_label("Helmet"), Some(PpeClass::Helmet));
        assert_eq!(PpeClass::from_label(" BOOTS "), Some(PpeClass::Boots));
        assert_eq!(PpeClass::from_label("hat"), None);
    }
}
