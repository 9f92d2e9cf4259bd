use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// Persisted user preferences (`dstsetup.yaml`).
///
/// A flat mapping of the four paths the user picks plus the mods flag. Empty
/// strings mean "not set yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub archive_path: String,
    pub updater_install_path: String,
    pub content_library_path: String,
    pub world_folder_path: String,
    pub mods_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            archive_path: String::new(),
            updater_install_path: String::new(),
            content_library_path: String::new(),
            world_folder_path: String::new(),
            mods_enabled: true,
        }
    }
}

/// Inputs for a single pipeline run.
///
/// Built from [`Preferences`] at the moment the run starts and never mutated
/// afterwards. `content_library_path` is present iff mods are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub archive_path: Utf8PathBuf,
    pub updater_install_path: Utf8PathBuf,
    pub content_library_path: Option<Utf8PathBuf>,
    pub world_folder_path: Utf8PathBuf,
    pub mods_enabled: bool,
}

impl PipelineConfig {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            archive_path: Utf8PathBuf::from(prefs.archive_path.trim()),
            updater_install_path: Utf8PathBuf::from(prefs.updater_install_path.trim()),
            content_library_path: prefs
                .mods_enabled
                .then(|| Utf8PathBuf::from(prefs.content_library_path.trim())),
            world_folder_path: Utf8PathBuf::from(prefs.world_folder_path.trim()),
            mods_enabled: prefs.mods_enabled,
        }
    }

    /// Convert back into the persisted form.
    ///
    /// A disabled content library keeps whatever path `previous` remembered so
    /// toggling mods off does not forget the Steam location.
    pub fn to_preferences(&self, previous: &Preferences) -> Preferences {
        Preferences {
            archive_path: self.archive_path.to_string(),
            updater_install_path: self.updater_install_path.to_string(),
            content_library_path: self
                .content_library_path
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| previous.content_library_path.clone()),
            world_folder_path: self.world_folder_path.to_string(),
            mods_enabled: self.mods_enabled,
        }
    }
}

/// Fixed install layout of the game, SteamCMD and the Steam client.
///
/// Every location the pipeline touches is derived from here, including the
/// per-user data root. The binary resolves the data root from the user's
/// documents folder and injects it; the pipeline never looks it up itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// `Documents/Klei/DoNotStarveTogether`; the archive is extracted here.
    pub data_root: Utf8PathBuf,
    pub server_dir_name: String,
    pub preserved_file: Utf8PathBuf,
    pub workshop_content_rel: Utf8PathBuf,
    pub local_mods_rel: Utf8PathBuf,
    pub server_install_rel: Utf8PathBuf,
    pub updater_executable: String,
    pub server_executable_rel: Utf8PathBuf,
    pub server_app_id: u32,
    pub cluster_name: String,
    pub workshop_prefix: String,
}

/// Steam app id of the Don't Starve Together dedicated server.
pub const SERVER_APP_ID: u32 = 343050;

/// Steam app id of the game client, used for the workshop cache folder.
pub const CLIENT_APP_ID: u32 = 322330;

impl InstallLayout {
    pub fn new(data_root: impl Into<Utf8PathBuf>) -> Self {
        let updater_executable = if cfg!(target_os = "windows") {
            "steamcmd.exe"
        } else {
            "steamcmd.sh"
        };
        let server_executable = if cfg!(target_os = "windows") {
            "bin/dontstarve_dedicated_server_nullrenderer.exe"
        } else {
            "bin/dontstarve_dedicated_server_nullrenderer"
        };

        Self {
            data_root: data_root.into(),
            server_dir_name: "MyDediServer".to_string(),
            preserved_file: Utf8PathBuf::from("cluster_token.txt"),
            workshop_content_rel: Utf8PathBuf::from(format!(
                "steamapps/workshop/content/{}",
                CLIENT_APP_ID
            )),
            local_mods_rel: Utf8PathBuf::from("steamapps/common/Don't Starve Together/mods"),
            server_install_rel: Utf8PathBuf::from(
                "steamapps/common/Don't Starve Together Dedicated Server",
            ),
            updater_executable: updater_executable.to_string(),
            server_executable_rel: Utf8PathBuf::from(server_executable),
            server_app_id: SERVER_APP_ID,
            cluster_name: "MyDediServer".to_string(),
            workshop_prefix: "workshop-".to_string(),
        }
    }

    /// Local server directory that gets reconciled and receives the world.
    pub fn server_dir(&self) -> Utf8PathBuf {
        self.data_root.join(&self.server_dir_name)
    }

    pub fn workshop_source(&self, content_library: &Utf8Path) -> Utf8PathBuf {
        content_library.join(&self.workshop_content_rel)
    }

    pub fn local_mods_source(&self, content_library: &Utf8Path) -> Utf8PathBuf {
        content_library.join(&self.local_mods_rel)
    }

    pub fn server_install_dir(&self, updater_install: &Utf8Path) -> Utf8PathBuf {
        updater_install.join(&self.server_install_rel)
    }

    pub fn mods_destination(&self, updater_install: &Utf8Path) -> Utf8PathBuf {
        self.server_install_dir(updater_install).join("mods")
    }

    pub fn updater_executable(&self, updater_install: &Utf8Path) -> Utf8PathBuf {
        updater_install.join(&self.updater_executable)
    }

    pub fn server_executable(&self, updater_install: &Utf8Path) -> Utf8PathBuf {
        self.server_install_dir(updater_install)
            .join(&self.server_executable_rel)
    }

    /// Working directory for the shards: the folder holding the executable.
    pub fn server_bin_dir(&self, updater_install: &Utf8Path) -> Utf8PathBuf {
        let exe = self.server_executable(updater_install);
        exe.parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| self.server_install_dir(updater_install))
    }

    /// SteamCMD arguments: anonymous login, forced validate of the server app, quit.
    pub fn updater_args(&self) -> Vec<String> {
        vec![
            "+login".to_string(),
            "anonymous".to_string(),
            "+app_update".to_string(),
            self.server_app_id.to_string(),
            "validate".to_string(),
            "+quit".to_string(),
        ]
    }
}
