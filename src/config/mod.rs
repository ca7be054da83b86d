mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;

/// Load configuration from a TOML file, apply environment overrides and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or fall back to defaults
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./assetforge.toml",
        "./config.toml",
        "~/.config/assetforge/config.toml",
        "/etc/assetforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    let mut config = Config::default();
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Apply the deployment environment variables on top of file values.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let c = &mut config.compression;
    override_parsed(&lookup, "COMPRESSION_ENABLED", &mut c.enabled);
    override_parsed(&lookup, "COMPRESSION_WORKERS", &mut c.worker_count);
    override_parsed(&lookup, "COMPRESSION_IMAGE_QUALITY", &mut c.image_quality);
    override_parsed(&lookup, "COMPRESSION_VIDEO_MAX_HEIGHT", &mut c.video_max_height);
    override_parsed(&lookup, "COMPRESSION_RETAIN_DAYS", &mut c.retain_original_days);

    if let Some(path) = lookup("FFMPEG_PATH").filter(|v| !v.is_empty()) {
        c.ffmpeg_path = path.into();
    }
    if let Some(path) = lookup("DATABASE_PATH").filter(|v| !v.is_empty()) {
        config.storage.database_path = path.into();
    }
    if let Some(path) = lookup("STORAGE_ASSETS_DIR").filter(|v| !v.is_empty()) {
        config.storage.assets_dir = path.into();
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable environment override"),
    }
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let c = &config.compression;

    if !(1..=100).contains(&c.image_quality) {
        anyhow::bail!(
            "compression.image_quality must be between 1 and 100, got {}",
            c.image_quality
        );
    }

    if c.enabled {
        if c.worker_count == 0 {
            anyhow::bail!("compression.worker_count must be at least 1");
        }
        if c.queue_capacity == 0 {
            anyhow::bail!("compression.queue_capacity must be at least 1");
        }
    }

    if c.ffmpeg_path.as_os_str().is_empty() {
        anyhow::bail!("compression.ffmpeg_path cannot be empty");
    }

    if c.video_max_height == 0 {
        anyhow::bail!("compression.video_max_height must be positive");
    }

    if config.upload.max_upload_bytes == 0 {
        anyhow::bail!("upload.max_upload_bytes must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert!(config.compression.enabled);
        assert_eq!(config.compression.worker_count, 2);
        assert_eq!(config.compression.queue_capacity, 100);
        assert_eq!(config.compression.image_quality, 85);
        assert_eq!(config.compression.persistence_failure, PersistencePolicy::Continue);
        assert!(config.compression.encoder_timeout().is_none());
        assert_eq!(config.compression.reconcile_interval(), Some(std::time::Duration::from_secs(30)));
        assert_eq!(config.upload.max_upload_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_overrides_from(
            &mut config,
            lookup_from(&[
                ("COMPRESSION_ENABLED", "false"),
                ("COMPRESSION_WORKERS", "4"),
                ("COMPRESSION_IMAGE_QUALITY", "70"),
                ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
                ("STORAGE_ASSETS_DIR", "/srv/assets"),
            ]),
        );

        assert!(!config.compression.enabled);
        assert_eq!(config.compression.worker_count, 4);
        assert_eq!(config.compression.image_quality, 70);
        assert_eq!(
            config.compression.ffmpeg_path,
            std::path::PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(config.storage.assets_dir, std::path::PathBuf::from("/srv/assets"));
    }

    #[test]
    fn test_zero_reconcile_interval_disables_sweep() {
        let mut config = Config::default();
        config.compression.reconcile_interval_secs = 0;
        assert!(validate_config(&config).is_ok());
        assert!(config.compression.reconcile_interval().is_none());
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, lookup_from(&[("COMPRESSION_WORKERS", "many")]));
        assert_eq!(config.compression.worker_count, 2);
    }

    #[test]
    fn test_quality_out_of_range_rejected() {
        let mut config = Config::default();
        config.compression.image_quality = 0;
        assert!(validate_config(&config).is_err());

        config.compression.image_quality = 101;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_workers_only_matters_when_enabled() {
        let mut config = Config::default();
        config.compression.worker_count = 0;
        assert!(validate_config(&config).is_err());

        config.compression.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_persistence_policy_parse() {
        let toml_str = r#"
            [compression]
            persistence_failure = "abort"
            encoder_timeout_secs = 600
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.compression.persistence_failure, PersistencePolicy::Abort);
        assert_eq!(
            config.compression.encoder_timeout(),
            Some(std::time::Duration::from_secs(600))
        );
        assert_eq!("Continue".parse::<PersistencePolicy>(), Ok(PersistencePolicy::Continue));
    }
}
