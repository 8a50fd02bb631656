use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    alarm::AlarmConfig,
    error::{Error, Result},
};

/// the alarm settings file, written by whatever edits the alarm (usually a
/// small web form) and polled once per tick
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    /// file content at the last poll, compared in full to detect edits
    last_seen: Option<String>,
}

impl SettingsStore {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_seen: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// returns the settings if the file changed since the last poll.
    /// the first poll always reports a change.
    pub fn poll(&mut self) -> Result<Option<AlarmConfig>> {
        let content = self.read_raw()?;
        if self.last_seen.as_deref() == Some(content.as_str()) {
            return Ok(None);
        }
        let config = self.parse(&content);
        self.last_seen = Some(content);
        Ok(Some(config))
    }

    /// reads the current settings without touching change detection
    pub fn load(&self) -> Result<AlarmConfig> {
        let content = self.read_raw()?;
        Ok(self.parse(&content))
    }

    pub fn save(&self, config: &AlarmConfig) -> Result<()> {
        let content = toml::to_string(config)?;
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// sets or clears `test_alarm` in place, keeping every other line the
    /// editor wrote
    pub fn set_test_alarm(&mut self, requested: bool) -> Result<()> {
        let content = self.read_raw()?;
        let mut table = content.parse::<toml::Table>().unwrap_or_else(|e| {
            warn!("rewriting unreadable {}: {e}", self.path.display());
            toml::Table::new()
        });
        table.insert("test_alarm".to_string(), toml::Value::Boolean(requested));
        let content = toml::to_string(&table)?;
        std::fs::write(&self.path, &content)?;
        info!("test_alarm set to {requested} in {}", self.path.display());
        // our own write is not an edit
        if self.last_seen.is_some() {
            self.last_seen = Some(content);
        }
        Ok(())
    }

    fn read_raw(&self) -> Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            // a missing file reads like an empty one: every field defaults
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(Error::File {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn parse(&self, content: &str) -> AlarmConfig {
        toml::from_str(content).unwrap_or_else(|e| {
            warn!(
                "couldn't parse {}, alarm disabled until fixed: {e}",
                self.path.display()
            );
            AlarmConfig::default()
        })
    }
}
