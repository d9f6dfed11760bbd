use clap::{ArgAction, Parser, Subcommand, ValueHint};
use dirs_next::home_dir;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::fs;
use thiserror::Error;

use crate::astro::Site;
use crate::constants::DRIVER_SELECTION_KEY;

/// Error type for config loading/validation/persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Key/value configuration storage seen by the bridge.
///
/// Values are plain strings; `DRIVER_SELECTION_KEY` holds the ProgID of
/// the selected device.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    /// ProgID of the selected device, the value of "Current Driver ID"
    pub driver_id: Option<String>,
    /// observing site, used to turn park alt/az into RA/Dec
    pub site: Option<Site>,
    /// extra directory searched for driver plugins
    pub plugin_path: Option<PathBuf>,
    /// any other keys written through the store
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, String>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "mountbridge", about = "MountBridge - ASCOM mount adapter", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Select (and persist) the device ProgID
    #[arg(long)]
    pub driver_id: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub latitude: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    pub longitude: Option<f64>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub plugin_path: Option<PathBuf>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum Command {
    /// List the device implementations that can be selected
    Devices,
    /// Choose the device to use and remember it
    Choose,
    /// Link and report position and capabilities
    Status {
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Slew to RA (hours) and Dec (degrees)
    Slew {
        #[arg(allow_hyphen_values = true)]
        ra: f64,
        #[arg(allow_hyphen_values = true)]
        dec: f64,
    },
    /// Park, optionally at a custom azimuth/altitude
    Park {
        #[arg(long, allow_hyphen_values = true)]
        az: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        alt: Option<f64>,
    },
    /// Leave the park position
    Unpark,
}

/// Public entry point: read YAML for the given CLI, merge, validate.
pub fn load_from(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// File the store should read and write for this CLI
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .or_else(find_config_file)
        .unwrap_or_else(default_config_path)
}

/// ~/.config/mountbridge/config.yaml, or ./mountbridge.yaml without a home
pub fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".config/mountbridge/config.yaml"),
        None => PathBuf::from("mountbridge.yaml"),
    }
}

/// Pretty YAML of effective config (nice for debugging)
pub fn dump_config(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/mountbridge/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/mountbridge/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/mountbridge.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    let p = PathBuf::from("mountbridge.yaml");
    if p.exists() { return Some(p) }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some()   { dst.log_level = src.log_level; }
    if src.driver_id.is_some()   { dst.driver_id = src.driver_id; }
    if src.site.is_some()        { dst.site = src.site; }
    if src.plugin_path.is_some() { dst.plugin_path = src.plugin_path; }
    dst.settings.extend(src.settings);
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()   { cfg.log_level = cli.log_level.clone(); }
    if cli.driver_id.is_some()   { cfg.driver_id = cli.driver_id.clone(); }
    if cli.plugin_path.is_some() { cfg.plugin_path = cli.plugin_path.clone(); }

    if cli.latitude.is_some() || cli.longitude.is_some() {
        let site = cfg.site.get_or_insert_with(Site::default);
        if let Some(lat) = cli.latitude  { site.latitude = lat; }
        if let Some(lon) = cli.longitude { site.longitude = lon; }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(level) = cfg.log_level.as_deref() {
        match level.to_ascii_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => return Err(ConfigError::Validation(format!("unknown log_level '{}'", level))),
        }
    }
    if let Some(site) = cfg.site.as_ref() {
        if !(-90.0..=90.0).contains(&site.latitude) {
            return Err(ConfigError::Validation("site latitude must be -90..=90".into()));
        }
        if !(-180.0..=180.0).contains(&site.longitude) {
            return Err(ConfigError::Validation("site longitude must be -180..=180".into()));
        }
    }
    Ok(())
}

/// Store backed by the YAML config file. Every `set` rewrites the file.
pub struct YamlConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
}

impl YamlConfigStore {
    /// Open `path`; a missing file starts from defaults and is created on
    /// the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() { read_yaml(&path)? } else { Config::default() };
        Ok(Self { path, config: Mutex::new(config) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the configuration as last read or written
    pub fn snapshot(&self) -> Config {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn save(&self, cfg: &Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(&self.path, serde_yaml::to_string(cfg)?)?;
        debug!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}

impl ConfigStore for YamlConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let cfg = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(if key == DRIVER_SELECTION_KEY {
            cfg.driver_id.clone()
        } else {
            cfg.settings.get(key).cloned()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut cfg = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = cfg.clone();
        if key == DRIVER_SELECTION_KEY {
            updated.driver_id = Some(value.to_string());
        } else {
            updated.settings.insert(key.to_string(), value.to_string());
        }
        // only what reached the file is visible to readers
        self.save(&updated)?;
        *cfg = updated;
        Ok(())
    }
}

/// In-memory store for tests and embedding hosts with their own persistence
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.values.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
