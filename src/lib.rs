//! SafetySnap
//!
//! Ingests uploaded site photos, runs a color-heuristic PPE detector over them,
//! records one immutable detection record per image and reports per-category
//! counts.
//!
//! # Module Structure
//!
//! - `detect`: image bytes -> label set + optional normalized region
//! - `fingerprint`: identity digest of `(filename, owner)`
//! - `storage`: owners and detection records (SQLite or in-memory)
//! - `analytics`: per-category counts and the synthetic display fallback
//! - `uploads`: local upload directory
//! - `api`: HTTP surface
//! - `config`: daemon configuration

use anyhow::{anyhow, Result};
use rusqlite::{Connection, OpenFlags};
use std::sync::OnceLock;
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

pub mod analytics;
pub mod api;
pub mod config;
pub mod detect;
pub mod fingerprint;
pub mod storage;
pub mod uploads;

pub use analytics::{
    aggregate, default_categories, summarize, AnalyticsSummary, PpeCounts, SyntheticFallback,
};
pub use detect::{BoundingBox, Detection, DetectorBackend, LabelSet, PpeClass, PpeDetector};
pub use fingerprint::{fingerprint, fingerprint_hex};
pub use storage::{
    DetectionRecord, DetectionStore, InMemoryDetectionStore, Owner, Page, SqliteDetectionStore,
    StoreError,
};
pub use uploads::UploadDir;

pub(crate) fn open_db_connection(db_path: &str) -> rusqlite::Result<Connection> {
    if db_path.starts_with("file:") {
        return Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        );
    }
    Connection::open(db_path)
}

pub(crate) fn now_s() -> std::result::Result<u64, SystemTimeError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

pub fn validate_username(username: &str) -> Result<()> {
    static USERNAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = USERNAME_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_.-]{1,50}$").unwrap());
    if !re.is_match(username) {
        return Err(anyhow!("username must match ^[A-Za-z0-9_.-]{{1,50}}$"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    static EMAIL_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = EMAIL_RE.get_or_init(|| regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());
    if email.len() > 120 || !re.is_match(email) {
        return Err(anyhow!("email address is not valid"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_allowlisted() {
        assert!(validate_username("site_lead-2").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username(&"x".repeat(51)).is_err());
    }

    #[test]
    fn emails_need_a_domain() {
        assert!(validate_email("ops@example.com").is_ok());
        assert!(validate_email("ops@localhost").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
    }
}
