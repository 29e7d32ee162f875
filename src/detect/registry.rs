use image::RgbImage;

use super::backend::{DetectionMethod, DetectorBackend};
use super::backends::{HelmetColorBackend, PlaceholderVestBackend};
use super::hsv::HsvBand;
use super::result::{Detection, PpeClass};

/// Ordered set of detector backends behind the `detect(bytes)` contract.
///
/// The image is decoded once; every registered backend then sees the same
/// frame. Labels are the union of all findings. The region is taken from the
/// first backend (in registration order) that localized something.
pub struct PpeDetector {
    backends: Vec<Box<dyn DetectorBackend>>,
}

impl PpeDetector {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Helmet color heuristic followed by the vest placeholder.
    pub fn with_defaults(helmet_band: HsvBand) -> Self {
        let mut detector = Self::new();
        detector.register(HelmetColorBackend::with_band(helmet_band));
        detector.register(PlaceholderVestBackend::new());
        detector
    }

    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        self.backends.push(Box::new(backend));
    }

    /// Remove a backend by name. Returns true when one was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.backends.len();
        self.backends.retain(|backend| backend.name() != name);
        self.backends.len() != before
    }

    /// Registered backend names, in run order.
    pub fn list(&self) -> Vec<&'static str> {
        self.backends.iter().map(|backend| backend.name()).collect()
    }

    /// First backend able to emit `class`.
    pub fn backend_for(&self, class: PpeClass) -> Option<&dyn DetectorBackend> {
        self.backends
            .iter()
            .find(|backend| backend.supports(class))
            .map(|backend| &**backend)
    }

    /// Classes only produced by placeholder backends.
    pub fn placeholder_classes(&self) -> Vec<PpeClass> {
        PpeClass::ALL
            .into_iter()
            .filter(|class| {
                self.backend_for(*class)
                    .is_some_and(|backend| backend.method() == DetectionMethod::Placeholder)
            })
            .collect()
    }

    /// Decode `bytes` and run every backend over the frame.
    ///
    /// Undecodable input is not an error: it yields [`Detection::empty`].
    pub fn detect(&self, bytes: &[u8]) -> Detection {
        let frame = match image::load_from_memory(bytes) {
            Ok(decoded) => decoded.to_rgb8(),
            Err(err) => {
                log::debug!("detector: image not decodable ({} bytes): {}", bytes.len(), err);
                return Detection::empty();
            }
        };
        self.detect_frame(&frame)
    }

    pub fn detect_frame(&self, frame: &RgbImage) -> Detection {
        let mut detection = Detection::empty();
        for backend in &self.backends {
            let finding = backend.detect(frame);
            for class in finding.classes {
                detection.labels.insert(class.label().to_string());
            }
            if detection.region.is_none() {
                detection.region = finding.region;
            }
        }
        detection
    }
}

impl Default for PpeDetector {
    fn default() -> Self {
        Self::with_defaults(HsvBand::default())
    }
}
