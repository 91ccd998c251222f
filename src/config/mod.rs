use crate::models::PackSettings;
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;
use std::path::PathBuf;

/// File name of the settings file inside the config directory
pub const SETTINGS_FILE: &str = "projzip.yaml";

/// Prefix of environment variables that override settings, e.g. `PROJZIP_ARCHIVE_DIR`
pub const ENV_PREFIX: &str = "PROJZIP";

/// Directory name under the platform config and state directories
const APP_DIR: &str = "projzip";

/// Resolve the config directory: XDG_CONFIG_HOME/projzip > ~/.config/projzip
/// (or the platform equivalent)
pub fn default_config_dir() -> Result<Utf8PathBuf> {
    let base = dirs::config_dir()
        .context("Cannot determine a config directory; pass --config-dir")?;
    utf8_dir(base.join(APP_DIR))
}

/// Resolve the log directory: XDG_STATE_HOME/projzip/logs > ~/.local/state/projzip/logs,
/// or the local data directory where the platform has no state directory
pub fn default_log_dir() -> Result<Utf8PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .context("Cannot determine a log directory; set log_dir in projzip.yaml")?;
    utf8_dir(base.join(APP_DIR).join("logs"))
}

fn utf8_dir(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| anyhow!("Directory is not valid UTF-8: {}", p.display()))
}

/// Configuration manager for loading and saving the YAML settings file.
///
/// Settings are layered: built-in defaults, then `projzip.yaml` in the config
/// directory, then `PROJZIP_*` environment variables. List settings take a
/// comma-separated value from the environment.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager for `config_dir`.
    ///
    /// Nothing is created on disk until settings are saved.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load settings from the file and environment.
    ///
    /// # Returns
    /// Defaults for anything neither source sets
    pub fn load_settings(&self) -> Result<PackSettings> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: PackSettings = Config::builder()
            .add_source(
                File::from(self.settings_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("markers")
                    .with_list_parse_key("excluded_dirs")
                    .with_list_parse_key("excluded_extensions"),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.config_dir);
        Ok(settings)
    }

    /// Save settings to the YAML file, replacing any existing one.
    ///
    /// Creates the config directory if needed.
    pub fn save_settings(&self, settings: &PackSettings) -> Result<()> {
        if !self.config_dir.exists() {
            fs::create_dir_all(&self.config_dir).with_context(|| {
                format!("Failed to create config directory: {}", self.config_dir)
            })?;
        }

        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_config_dir_created_only_on_save() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().join("nested")).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        assert!(!manager.config_dir().exists());
        assert!(manager.settings_path().ends_with(SETTINGS_FILE));

        manager.load_settings().unwrap();
        assert!(!manager.config_dir().exists());

        manager.save_settings(&PackSettings::default()).unwrap();
        assert!(manager.settings_path().is_file());
    }

    #[test]
    fn test_default_dirs_are_absolute() {
        // Both resolve from HOME/XDG variables, never from the working directory
        if let Ok(dir) = default_config_dir() {
            assert!(dir.is_absolute());
            assert!(dir.ends_with("projzip"));
        }
        if let Ok(dir) = default_log_dir() {
            assert!(dir.is_absolute());
            assert!(dir.ends_with("projzip/logs"));
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        let settings = manager.load_settings().unwrap();
        assert_eq!(settings.archive_dir, PackSettings::default().archive_dir);
    }

    #[test]
    fn test_load_save_settings() {
        let (manager, _temp_dir) = create_test_config_manager();

        let settings = PackSettings {
            compression_level: 9,
            excluded_extensions: vec!["log".to_string()],
            ..Default::default()
        };
        manager.save_settings(&settings).unwrap();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.compression_level, 9);
        assert_eq!(loaded.excluded_extensions, vec!["log".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "staging_dir: __tmp\n").unwrap();

        let loaded = manager.load_settings().unwrap();
        assert_eq!(loaded.staging_dir, "__tmp");
        assert_eq!(loaded.ignore_marker, ".zipignore");
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.settings_path(), "compression_level: [not a number\n").unwrap();

        assert!(manager.load_settings().is_err());
    }
}
