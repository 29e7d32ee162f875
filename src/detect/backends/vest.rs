use image::RgbImage;

use crate::detect::backend::{DetectionMethod, DetectorBackend};
use crate::detect::result::{BackendFinding, PpeClass};

/// Placeholder: reports a vest for every decodable frame without looking at it.
///
/// Kept as its own backend so a real vest detector can replace it in the
/// registry without touching storage or analytics. Its output is not evidence
/// that a vest is present.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaceholderVestBackend;

impl PlaceholderVestBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for PlaceholderVestBackend {
    fn name(&self) -> &'static str {
        "vest-placeholder"
    }

    fn supports(&self, class: PpeClass) -> bool {
        matches!(class, PpeClass::Vest)
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Placeholder
    }

    fn detect(&self, _frame: &RgbImage) -> BackendFinding {
        BackendFinding {
            classes: vec![PpeClass::Vest],
            region: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn always_reports_vest_without_region() {
        let frame = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let backend = PlaceholderVestBackend::new();
        let finding = backend.detect(&frame);
        assert_eq!(finding.classes, vec![PpeClass::Vest]);
        assert_eq!(finding.region, None);
        assert_eq!(backend.method(), DetectionMethod::Placeholder);
    }
}
