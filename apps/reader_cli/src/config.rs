use std::{fs, path::Path};

use anyhow::{ensure, Context};
use blob_io::{ReaderConfig, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use serde::Deserialize;
use shared::domain::ReadMode;

pub const DEFAULT_CONFIG_FILE: &str = "reader.toml";
const ENV_PREFIX: &str = "READER__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub chunk_size: usize,
    pub mode: ReadMode,
    pub encoding: Option<String>,
    pub log_filter: String,
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            mode: ReadMode::Text,
            encoding: None,
            log_filter: "info".into(),
            json: false,
        }
    }
}

impl Settings {
    pub fn reader_config(&self) -> ReaderConfig {
        ReaderConfig {
            chunk_size: self.chunk_size,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    chunk_size: Option<usize>,
    mode: Option<String>,
    encoding: Option<String>,
    log_filter: Option<String>,
    json: Option<bool>,
}

/// Defaults, then the config file, then `READER__*` environment variables.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = explicit_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if explicit_path.is_some() => {
            return Err(err).with_context(|| {
                format!("failed to read config file '{}'", path.display())
            });
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

pub fn checked_chunk_size(chunk_size: usize) -> anyhow::Result<usize> {
    ensure!(
        (1..=MAX_CHUNK_SIZE).contains(&chunk_size),
        "chunk size must be between 1 and {MAX_CHUNK_SIZE} bytes, got {chunk_size}"
    );
    Ok(chunk_size)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.chunk_size {
        settings.chunk_size = checked_chunk_size(v).context("invalid chunk_size")?;
    }
    if let Some(v) = file_cfg.mode {
        settings.mode = v.parse()?;
    }
    if let Some(v) = file_cfg.encoding {
        settings.encoding = Some(v);
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    if let Some(v) = file_cfg.json {
        settings.json = v;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(v) = var("CHUNK_SIZE") {
        let chunk_size = v
            .parse()
            .with_context(|| format!("{ENV_PREFIX}CHUNK_SIZE must be a byte count, got '{v}'"))?;
        settings.chunk_size =
            checked_chunk_size(chunk_size).with_context(|| format!("invalid {ENV_PREFIX}CHUNK_SIZE"))?;
    }
    if let Some(v) = var("MODE") {
        settings.mode = v.parse()?;
    }
    if let Some(v) = var("ENCODING") {
        settings.encoding = Some(v);
    }
    if let Some(v) = var("LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = var("JSON") {
        settings.json = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }
    Ok(())
}
