use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const APP_NAME: &str = "smart_alarm";

/// device configuration, everything that is not edited through the alarm
/// settings page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// the alarm settings file, `alarm.toml` next to this file if unset
    pub alarm_file: Option<PathBuf>,
    pub tick_interval_ms: u64,
    pub gpio: GpioConfig,
    pub download_dir: PathBuf,
    pub music_dir: PathBuf,
    /// also delete stale downloads lying in the home directory
    pub purge_home: bool,
    pub default_podcast_url: String,
    pub default_stream_url: String,
    pub connectivity_probe_url: String,
    pub connectivity_timeout_ms: u64,
    /// run when the probe fails, e.g. `["sudo", "ifup", "--force", "wlan0"]`
    pub network_reset_command: Vec<String>,
    /// must write a wav file to stdout, the text is appended as last argument
    pub tts_command: Vec<String>,
    /// the stream url is appended as last argument
    pub stream_player: Vec<String>,
    pub poweroff_command: Vec<String>,
    pub welcome_message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    /// added to every pin number, newer kernels number the pi header from 512
    pub base: u32,
    pub button: u32,
    pub amplifier: u32,
    pub photocell: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            base: 0,
            button: 24,
            amplifier: 12,
            photocell: 20,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            alarm_file: None,
            tick_interval_ms: 500,
            gpio: GpioConfig::default(),
            download_dir: data_dir.join("downloads"),
            music_dir: data_dir.join("music"),
            purge_home: true,
            default_podcast_url: "http://www.bbc.co.uk/programmes/p02nq0gn/episodes/downloads.rss"
                .to_string(),
            default_stream_url: "http://orange-01.live.sil.at:8000".to_string(),
            connectivity_probe_url: "http://www.google.com".to_string(),
            connectivity_timeout_ms: 2000,
            network_reset_command: vec![],
            tts_command: vec!["espeak".to_string(), "--stdout".to_string()],
            stream_player: vec!["mpg123".to_string(), "-q".to_string()],
            poweroff_command: vec!["sudo".to_string(), "poweroff".to_string()],
            welcome_message: "What is my purpose?".to_string(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let config = std::fs::read_to_string(path).map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&config).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// loads the config at `path`, or the defaults if there is no file yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::warn!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let config = toml::to_string(self)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, config)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let mut path = directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or(Error::NoConfigDir)?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    pub fn data_dir() -> Result<PathBuf> {
        Ok(directories::ProjectDirs::from("", "", APP_NAME)
            .ok_or(Error::NoConfigDir)?
            .data_dir()
            .to_path_buf())
    }

    /// the alarm settings file belonging to a config loaded from `config_path`
    #[must_use]
    pub fn alarm_path(&self, config_path: &Path) -> PathBuf {
        self.alarm_file.clone().unwrap_or_else(|| {
            config_path
                .parent()
                .map_or_else(|| PathBuf::from("alarm.toml"), |dir| dir.join("alarm.toml"))
        })
    }

    /// directories swept for stale downloads
    #[must_use]
    pub fn purge_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.download_dir.clone()];
        if self.purge_home {
            if let Some(base) = directories::BaseDirs::new() {
                dirs.push(base.home_dir().to_path_buf());
            }
        }
        dirs
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    #[must_use]
    pub const fn connectivity_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity_timeout_ms)
    }
}
