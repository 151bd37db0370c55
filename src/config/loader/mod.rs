use crate::config::Config;
use crate::utils::get_leaddesk_home;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs;
use std::path::{Path, PathBuf};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_leaddesk_home()?.join("config.json"))
}

/// Load the config file (or defaults when it does not exist), apply
/// `LEADDESK_*` environment overrides and validate the result.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    load_config_with(config_path, |name| std::env::var(name).ok())
}

/// Same as [`load_config`] with an explicit override source.
pub fn load_config_with<F>(config_path: Option<&Path>, overrides: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        read_config_file(path)?
    } else {
        Config::default()
    };

    crate::config::credentials::apply_overrides_from(&mut config, overrides);

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    // Shared (read) lock: allows concurrent readers, blocks during writes
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open config at {}", path.display()))?;
    FileExt::lock_shared(&file)
        .with_context(|| "Failed to acquire shared lock on config file")?;

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config JSON from {}", path.display()))
}
