//! snap_detect - run PPE detection on local image files

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;

use safetysnap::detect::HsvBand;
use safetysnap::{DetectionStore, PpeDetector, SqliteDetectionStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image files to analyse.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Record each result for this owner id.
    #[arg(long)]
    record_for: Option<i64>,
    /// Path to the detection database (used with --record-for).
    #[arg(long, env = "SAFETYSNAP_DB_PATH", default_value = "safetysnap.db")]
    db_path: String,
    /// Lower hue bound of the helmet band (0..=179).
    #[arg(long, default_value_t = HsvBand::YELLOW.hue_min)]
    hue_min: u8,
    /// Upper hue bound of the helmet band (0..=179).
    #[arg(long, default_value_t = HsvBand::YELLOW.hue_max)]
    hue_max: u8,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.hue_min > args.hue_max {
        return Err(anyhow!("--hue-min must not exceed --hue-max"));
    }

    let detector = PpeDetector::with_defaults(HsvBand {
        hue_min: args.hue_min,
        hue_max: args.hue_max,
        ..HsvBand::YELLOW
    });
    let mut store = match args.record_for {
        Some(_) => Some(SqliteDetectionStore::open(&args.db_path)?),
        None => None,
    };

    for path in &args.images {
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let detection = detector.detect(&bytes);
        let mut out = json!({
            "file": path.display().to_string(),
            "labels": detection.labels,
            "bbox": detection.bounding_box(),
            "region_found": detection.region.is_some(),
        });

        if let (Some(owner_id), Some(store)) = (args.record_for, store.as_mut()) {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
            let record = store.record(owner_id, &filename, &detection.labels, detection.region)?;
            out["record_id"] = json!(record.id);
            out["fingerprint"] = json!(record.fingerprint);
        }

        println!("{}", serde_json::to_string(&out)?);
    }
    Ok(())
}
