use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::analytics::DEFAULT_CATEGORIES;
use crate::detect::HsvBand;

const DEFAULT_DB_PATH: &str = "safetysnap.db";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PAGE_LIMIT: usize = 10;
const DEFAULT_MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct SafetySnapConfigFile {
    db_path: Option<String>,
    upload_dir: Option<PathBuf>,
    api: Option<ApiConfigFile>,
    analytics: Option<AnalyticsConfigFile>,
    pagination: Option<PaginationConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct AnalyticsConfigFile {
    categories: Option<Vec<String>>,
    synthetic_fallback: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct PaginationConfigFile {
    default_limit: Option<usize>,
    max_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    hue_min: Option<u8>,
    hue_max: Option<u8>,
    saturation_min: Option<u8>,
    value_min: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct SafetySnapConfig {
    pub db_path: String,
    pub upload_dir: PathBuf,
    pub api_addr: String,
    pub max_upload_bytes: usize,
    pub analytics: AnalyticsSettings,
    pub pagination: PaginationSettings,
    pub helmet_band: HsvBand,
}

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub categories: BTreeSet<String>,
    pub synthetic_fallback: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginationSettings {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for SafetySnapConfig {
    fn default() -> Self {
        Self::from_file(SafetySnapConfigFile::default())
    }
}

impl SafetySnapConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAFETYSNAP_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SafetySnapConfigFile) -> Self {
        let db_path = file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let upload_dir = file
            .upload_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
        let api_addr = file
            .api
            .as_ref()
            .and_then(|api| api.addr.clone())
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let max_upload_bytes = file
            .api
            .as_ref()
            .and_then(|api| api.max_upload_bytes)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let analytics = AnalyticsSettings {
            categories: file
                .analytics
                .as_ref()
                .and_then(|a| a.categories.clone())
                .map(|c| c.into_iter().collect())
                .unwrap_or_else(|| DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()),
            synthetic_fallback: file
                .analytics
                .as_ref()
                .and_then(|a| a.synthetic_fallback)
                .unwrap_or(true),
        };
        let pagination = PaginationSettings {
            default_limit: file
                .pagination
                .as_ref()
                .and_then(|p| p.default_limit)
                .unwrap_or(DEFAULT_PAGE_LIMIT),
            max_limit: file
                .pagination
                .as_ref()
                .and_then(|p| p.max_limit)
                .unwrap_or(DEFAULT_MAX_PAGE_LIMIT),
        };
        let defaults = HsvBand::default();
        let detector = file.detector.unwrap_or_default();
        let helmet_band = HsvBand {
            hue_min: detector.hue_min.unwrap_or(defaults.hue_min),
            hue_max: detector.hue_max.unwrap_or(defaults.hue_max),
            saturation_min: detector.saturation_min.unwrap_or(defaults.saturation_min),
            value_min: detector.value_min.unwrap_or(defaults.value_min),
        };
        Self {
            db_path,
            upload_dir,
            api_addr,
            max_upload_bytes,
            analytics,
            pagination,
            helmet_band,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("SAFETYSNAP_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(dir) = std::env::var("SAFETYSNAP_UPLOAD_DIR") {
            if !dir.trim().is_empty() {
                self.upload_dir = PathBuf::from(dir);
            }
        }
        if let Ok(addr) = std::env::var("SAFETYSNAP_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(categories) = std::env::var("SAFETYSNAP_CATEGORIES") {
            let parsed = split_csv(&categories);
            if !parsed.is_empty() {
                self.analytics.categories = parsed.into_iter().collect();
            }
        }
        if let Ok(flag) = std::env::var("SAFETYSNAP_SYNTHETIC_FALLBACK") {
            self.analytics.synthetic_fallback = parse_bool(&flag).ok_or_else(|| {
                anyhow!("SAFETYSNAP_SYNTHETIC_FALLBACK must be true/false/1/0")
            })?;
        }
        if let Ok(bytes) = std::env::var("SAFETYSNAP_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = bytes
                .trim()
                .parse()
                .map_err(|_| anyhow!("SAFETYSNAP_MAX_UPLOAD_BYTES must be an integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let categories: BTreeSet<String> = self
            .analytics
            .categories
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if categories.is_empty() {
            return Err(anyhow!("analytics categories must not be empty"));
        }
        self.analytics.categories = categories;

        if self.helmet_band.hue_min > self.helmet_band.hue_max {
            return Err(anyhow!("detector hue_min must not exceed hue_max"));
        }
        if self.helmet_band.hue_max > 179 {
            return Err(anyhow!("detector hue values are 0..=179"));
        }
        if self.pagination.max_limit == 0
            || self.pagination.default_limit == 0
            || self.pagination.default_limit > self.pagination.max_limit
        {
            return Err(anyhow!(
                "pagination default_limit must be in 1..=max_limit"
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<SafetySnapConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
