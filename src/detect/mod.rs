mod backend;
mod backends;
pub mod hsv;
pub mod regions;
mod registry;
mod result;

pub use backend::{DetectionMethod, DetectorBackend};
pub use backends::{HelmetColorBackend, PlaceholderVestBackend};
pub use hsv::HsvBand;
pub use registry::PpeDetector;
pub use result::{BackendFinding, BoundingBox, Detection, LabelSet, PpeClass};
