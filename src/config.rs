use std::path::{Path, PathBuf};
use chrono::Duration;
use serde::Deserialize;

pub const DEFAULT_SERVICES: [&str; 5] = ["EventLog", "wuauserv", "Spooler", "Dhcp", "LanmanServer"];
pub const DEFAULT_CHANNELS: [&str; 2] = ["System", "Application"];
pub const DEFAULT_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_MAX_EVENTS: usize = 20;
const DEFAULT_CONFIG_FILE: &str = "HealthSnap.toml";

/// Resolved settings for one run.
#[derive(Clone, Debug)]
pub struct HealthConfig {
    pub services: Vec<String>,
    pub channels: Vec<String>,
    pub window: Duration,
    pub max_events: usize,
    pub output_dir: Option<PathBuf>,
    pub no_open: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            services: DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect(),
            channels: DEFAULT_CHANNELS.iter().map(|s| s.to_string()).collect(),
            window: Duration::hours(DEFAULT_WINDOW_HOURS),
            max_events: DEFAULT_MAX_EVENTS,
            output_dir: None,
            no_open: false,
        }
    }
}

/// On-disk TOML overlay; every key is optional.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    pub services: Option<Vec<String>>,
    pub channels: Option<Vec<String>>,
    pub window_hours: Option<i64>,
    pub max_events: Option<usize>,
    pub output_dir: Option<String>,
    pub no_open: Option<bool>,
}

impl HealthConfig {
    pub fn apply_file(&mut self, cfg: FileConfig) {
        if let Some(v) = cfg.services { self.services = v; }
        if let Some(v) = cfg.channels && !v.is_empty() { self.channels = v; }
        if let Some(h) = cfg.window_hours {
            if h > 0 { self.window = Duration::hours(h); } else { log::warn!("Ignoring non-positive window_hours {} in config", h); }
        }
        if let Some(n) = cfg.max_events {
            if n > 0 { self.max_events = n; } else { log::warn!("Ignoring max_events = 0 in config"); }
        }
        if let Some(d) = cfg.output_dir { self.output_dir = Some(PathBuf::from(d)); }
        if let Some(b) = cfg.no_open { self.no_open = b; }
    }

    pub fn window_hours(&self) -> i64 { self.window.num_hours() }
}

/// Reads `path`, or `HealthSnap.toml` in the working directory when no path is given.
/// A missing default file is normal; anything else that goes wrong is logged and ignored.
pub fn load_file_config(path: Option<&str>) -> Option<FileConfig> {
    let (p, explicit) = match path {
        Some(s) => (PathBuf::from(s), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    if !explicit && !p.exists() { return None; }
    parse_file(&p)
}

fn parse_file(p: &Path) -> Option<FileConfig> {
    let data = match std::fs::read_to_string(p) { Ok(d) => d, Err(e) => { log::warn!("Failed to read config file {}: {}", p.to_string_lossy(), e); return None } };
    match toml::from_str::<FileConfig>(&data) {
        Ok(c) => { log::debug!("Loaded config from {}", p.to_string_lossy()); Some(c) }
        Err(e) => { log::warn!("Failed to parse config file {}: {}", p.to_string_lossy(), e); None }
    }
}
