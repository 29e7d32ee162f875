//! safetysnapd - SafetySnap API daemon
//!
//! This daemon:
//! 1. Loads configuration (SAFETYSNAP_CONFIG + env overrides)
//! 2. Opens the detection store and upload directory
//! 3. Serves the upload, history and analytics API until Ctrl-C

use anyhow::Result;
use std::sync::mpsc;

use safetysnap::{api::ApiServer, config::SafetySnapConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = SafetySnapConfig::load()?;
    log::info!("database: {}", cfg.db_path);
    log::info!("upload dir: {}", cfg.upload_dir.display());
    log::info!(
        "categories: {}",
        cfg.analytics.categories.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    if cfg.analytics.synthetic_fallback {
        log::warn!("synthetic analytics fallback enabled; empty datasets report placeholder counts");
    }

    let api_handle = ApiServer::new(cfg).spawn()?;
    log::info!("safetysnap api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("safetysnapd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
