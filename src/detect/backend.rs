use image::RgbImage;

use crate::detect::result::{BackendFinding, PpeClass};

/// How a backend arrives at its labels.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Pixel-level color heuristic.
    ColorHeuristic,
    /// Fixed output that does not look at the pixels.
    Placeholder,
}

/// Detector backend trait.
///
/// # Contract
///
/// Backends receive an already-decoded RGB frame and must:
/// - Treat the frame as read-only and not retain it past the call
/// - Not perform I/O
/// - Be deterministic for a given frame
///
/// A backend that cannot find anything returns [`BackendFinding::nothing`];
/// there is no failure path. Decoding happens once, before any backend runs.
pub trait DetectorBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend may emit `class`.
    fn supports(&self, class: PpeClass) -> bool;

    fn method(&self) -> DetectionMethod {
        DetectionMethod::ColorHeuristic
    }

    /// Run detection on a decoded frame.
    fn detect(&self, frame: &RgbImage) -> BackendFinding;
}
