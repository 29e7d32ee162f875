use image::RgbImage;

use crate::detect::backend::{DetectionMethod, DetectorBackend};
use crate::detect::hsv::{HsvBand, Mask};
use crate::detect::regions::first_region;
use crate::detect::result::{BackendFinding, BoundingBox, PpeClass};

/// Flags a helmet when any pixels fall inside a yellow HSV band.
///
/// The reported region is the bounding rectangle of the first connected
/// region in raster order.
#[derive(Clone, Debug, Default)]
pub struct HelmetColorBackend {
    band: HsvBand,
}

impl HelmetColorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_band(band: HsvBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> HsvBand {
        self.band
    }
}

impl DetectorBackend for HelmetColorBackend {
    fn name(&self) -> &'static str {
        "helmet-color"
    }

    fn supports(&self, class: PpeClass) -> bool {
        matches!(class, PpeClass::Helmet)
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::ColorHeuristic
    }

    fn detect(&self, frame: &RgbImage) -> BackendFinding {
        let mask = Mask::from_band(frame, self.band);
        let Some(region) = first_region(&mask) else {
            return BackendFinding::nothing();
        };
        let b = region.bounds;
        BackendFinding {
            classes: vec![PpeClass::Helmet],
            region: BoundingBox::from_pixels(b.x, b.y, b.w, b.h, frame.width(), frame.height()),
        }
    }
}
