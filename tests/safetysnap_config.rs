use std::sync::Mutex;

use tempfile::NamedTempFile;

use safetysnap::config::SafetySnapConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SAFETYSNAP_CONFIG",
        "SAFETYSNAP_DB_PATH",
        "SAFETYSNAP_UPLOAD_DIR",
        "SAFETYSNAP_API_ADDR",
        "SAFETYSNAP_CATEGORIES",
        "SAFETYSNAP_SYNTHETIC_FALLBACK",
        "SAFETYSNAP_MAX_UPLOAD_BYTES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SafetySnapConfig::load().expect("load defaults");
    assert_eq!(cfg.db_path, "safetysnap.db");
    assert_eq!(cfg.upload_dir, std::path::PathBuf::from("uploads"));
    assert_eq!(cfg.api_addr, "127.0.0.1:8000");
    assert_eq!(cfg.analytics.categories.len(), 5);
    assert!(cfg.analytics.synthetic_fallback);
    assert_eq!(cfg.pagination.default_limit, 10);
    assert_eq!(cfg.helmet_band.hue_min, 20);
    assert_eq!(cfg.helmet_band.hue_max, 30);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "site.db",
        "upload_dir": "/var/lib/safetysnap/uploads",
        "api": { "addr": "0.0.0.0:9000", "max_upload_bytes": 2048 },
        "analytics": { "categories": ["Helmet", "vest", "vest"], "synthetic_fallback": true },
        "pagination": { "default_limit": 5, "max_limit": 50 },
        "detector": { "hue_min": 18, "hue_max": 32 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SAFETYSNAP_CONFIG", file.path());
    std::env::set_var("SAFETYSNAP_API_ADDR", "127.0.0.1:9100");
    std::env::set_var("SAFETYSNAP_SYNTHETIC_FALLBACK", "false");

    let cfg = SafetySnapConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "site.db");
    assert_eq!(
        cfg.upload_dir,
        std::path::PathBuf::from("/var/lib/safetysnap/uploads")
    );
    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.max_upload_bytes, 2048);
    assert_eq!(
        cfg.analytics.categories.iter().cloned().collect::<Vec<_>>(),
        vec!["helmet", "vest"]
    );
    assert!(!cfg.analytics.synthetic_fallback);
    assert_eq!(cfg.pagination.default_limit, 5);
    assert_eq!(cfg.pagination.max_limit, 50);
    assert_eq!(cfg.helmet_band.hue_min, 18);
    assert_eq!(cfg.helmet_band.hue_max, 32);
    assert_eq!(cfg.helmet_band.saturation_min, 100);

    clear_env();
}

#[test]
fn rejects_inverted_hue_band() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"detector": {"hue_min": 40, "hue_max": 10}}"#)
        .expect("write config");
    std::env::set_var("SAFETYSNAP_CONFIG", file.path());

    assert!(SafetySnapConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unparseable_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SAFETYSNAP_MAX_UPLOAD_BYTES", "lots");
    assert!(SafetySnapConfig::load().is_err());
    clear_env();

    std::env::set_var("SAFETYSNAP_SYNTHETIC_FALLBACK", "maybe");
    assert!(SafetySnapConfig::load().is_err());
    clear_env();
}
