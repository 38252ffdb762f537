//! Application settings.
//!
//! # Responsibility
//! - Load and save the JSON settings file with per-field defaults.
//! - Validate backup configuration before it reaches the scheduler.
//!
//! # Invariants
//! - A missing settings file yields defaults; a malformed one is an error.
//! - `retention_count >= 1` and `interval_minutes >= 1` once validated.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_BACKUP_INTERVAL_MINUTES: u32 = 720;
pub const DEFAULT_BACKUP_RETENTION: usize = 5;
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_UNDO_LIMIT: usize = 50;

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "settings io error: {err}"),
            Self::Parse(err) => write!(f, "settings file is malformed: {err}"),
            Self::Invalid(message) => write!(f, "invalid settings: {message}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backup: BackupSettings,
    pub autosave_debounce_ms: u64,
    /// Edits kept for undo and for redo; `0` disables history.
    pub undo_limit: usize,
    /// Log level passed to `init_logging`; `None` means the build default.
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup: BackupSettings::default(),
            autosave_debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
            undo_limit: DEFAULT_UNDO_LIMIT,
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub interval_minutes: u32,
    pub retention_count: usize,
    /// Backup directory; `None` means `<store dir>/backups`.
    pub directory: Option<PathBuf>,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_BACKUP_INTERVAL_MINUTES,
            retention_count: DEFAULT_BACKUP_RETENTION,
            directory: None,
        }
    }
}

impl BackupSettings {
    pub fn validate(&self) -> SettingsResult<()> {
        if self.retention_count == 0 {
            return Err(SettingsError::Invalid(
                "backup retention_count must be at least 1".to_string(),
            ));
        }
        if self.interval_minutes == 0 {
            return Err(SettingsError::Invalid(
                "backup interval_minutes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the backup directory for a store file.
    pub fn directory_for(&self, store_path: &Path) -> PathBuf {
        match &self.directory {
            Some(directory) => directory.clone(),
            None => store_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("backups"),
        }
    }
}

impl Settings {
    /// Reads settings from `path`, falling back to defaults when absent.
    pub fn load(path: impl AsRef<Path>) -> SettingsResult<Self> {
        let text = match fs::read_to_string(path.as_ref()) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        let settings: Self = serde_json::from_str(&text)?;
        settings.backup.validate()?;
        Ok(settings)
    }

    /// Writes settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> SettingsResult<()> {
        self.backup.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BackupSettings, Settings};
    use std::path::Path;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.backup.interval_minutes, 720);
        assert_eq!(settings.backup.retention_count, 5);
        assert_eq!(settings.autosave_debounce_ms, 500);
        assert_eq!(settings.undo_limit, 50);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"backup": {"retention_count": 2}}"#).unwrap();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.backup.retention_count, 2);
        assert_eq!(settings.backup.interval_minutes, 720);
    }

    #[test]
    fn zero_retention_is_rejected() {
        let settings = BackupSettings {
            retention_count: 0,
            ..BackupSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn default_directory_sits_next_to_store() {
        let directory = BackupSettings::default().directory_for(Path::new("/data/store.db"));
        assert_eq!(directory, Path::new("/data/backups"));
    }
}
