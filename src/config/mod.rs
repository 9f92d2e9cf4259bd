use crate::models::Preferences;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ::config::{Config, Environment, File, FileFormat};
use std::fs;

/// File name of the persisted preferences inside the config directory
pub const PREFERENCES_FILE: &str = "dstsetup.yaml";

/// Prefix for environment overrides, e.g. `DSTSETUP_WORLD_FOLDER_PATH`
pub const ENV_PREFIX: &str = "DSTSETUP";

/// Load/save seam for persisted preferences.
///
/// The pipeline only sees this trait so tests can substitute a mock store.
#[cfg_attr(test, mockall::automock)]
pub trait PreferenceStore: Send + Sync {
    /// Current preferences; never fails, falls back to defaults
    fn load(&self) -> Preferences;

    fn save(&self, prefs: &Preferences) -> Result<()>;
}

/// Configuration manager for the preferences file.
///
/// Reading layers `DSTSETUP_*` environment variables over the YAML file.
/// Writing only touches the file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    preferences_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing the preferences file (e.g., "dstsetup Data")
    ///
    /// # Returns
    /// A new ConfigManager instance
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            preferences_path: config_dir.join(PREFERENCES_FILE),
            config_dir,
            env_prefix: ENV_PREFIX.to_string(),
        })
    }

    /// Use a different environment prefix for overrides.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Read the preferences file plus environment overrides.
    ///
    /// # Returns
    /// The merged Preferences, or an error if the file or an override can't be parsed
    pub fn try_load_preferences(&self) -> Result<Preferences> {
        let settings = Config::builder()
            .add_source(
                File::from(self.preferences_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read preferences: {}", self.preferences_path))?;

        settings
            .try_deserialize::<Preferences>()
            .with_context(|| format!("Failed to parse preferences: {}", self.preferences_path))
    }

    /// Load preferences, falling back to defaults on any error.
    ///
    /// A missing file is normal on first start. A corrupt one is logged as a
    /// warning and otherwise ignored.
    pub fn load_preferences(&self) -> Preferences {
        if !self.preferences_path.exists() {
            tracing::info!(
                "Preferences file not found at {}, using defaults",
                self.preferences_path
            );
        }

        match self.try_load_preferences() {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!("{:#}; using defaults", e);
                Preferences::default()
            }
        }
    }

    /// Save the preferences file.
    ///
    /// # Arguments
    /// * `prefs` - The Preferences to save
    pub fn save_preferences(&self, prefs: &Preferences) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(prefs).context("Failed to serialize preferences to YAML")?;

        fs::write(&self.preferences_path, yaml_string)
            .with_context(|| format!("Failed to write preferences: {}", self.preferences_path))?;

        tracing::info!("Saved preferences to {}", self.preferences_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn preferences_path(&self) -> &Utf8Path {
        &self.preferences_path
    }
}

impl PreferenceStore for ConfigManager {
    fn load(&self) -> Preferences {
        self.load_preferences()
    }

    fn save(&self, prefs: &Preferences) -> Result<()> {
        self.save_preferences(prefs)
    }
}

/// Persist `updated` if it differs from what the store holds.
///
/// # Returns
/// `true` if the store was written
pub fn remember(store: &dyn PreferenceStore, updated: &Preferences) -> Result<bool> {
    if store.load() == *updated {
        return Ok(false);
    }

    store.save(updated)?;
    Ok(true)
}

/// The game's per-user data root, `<Documents>/Klei/DoNotStarveTogether`.
///
/// Falls back to `<home>/Documents` when the platform reports no documents folder.
pub fn default_data_root() -> Result<Utf8PathBuf> {
    let dirs = directories::UserDirs::new().context("Could not determine the user's home directory")?;

    let documents = dirs
        .document_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| dirs.home_dir().join("Documents"));

    let documents = Utf8PathBuf::try_from(documents)
        .context("Documents folder path is not valid UTF-8")?;

    Ok(documents.join("Klei").join("DoNotStarveTogether"))
}
