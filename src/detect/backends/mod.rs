pub mod helmet;
pub mod vest;

pub use helmet::HelmetColorBackend;
pub use vest::PlaceholderVestBackend;
