use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use bazaar_presence::{
    DEFAULT_CHANGE_BUFFER, DEFAULT_RECORDING_TIMEOUT, DEFAULT_TYPING_TIMEOUT, DirectoryNames,
    RegistryConfig, ThreadId, UserId,
};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "bazaar";
pub const SETTINGS_FILE_NAME: &str = "presence.json";
pub const SETTINGS_ENV_PREFIX: &str = "BAZAAR_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSettings {
    #[serde(default = "default_typing_timeout_ms")]
    pub typing_timeout_ms: u64,
    #[serde(default = "default_recording_timeout_ms")]
    pub recording_timeout_ms: u64,
    #[serde(default = "default_change_buffer")]
    pub change_buffer: usize,
    /// The viewer's own id; their own typing/recording events are ignored.
    #[serde(default)]
    pub local_user_id: Option<String>,
    /// Conversation shown in the conversation pane at startup.
    #[serde(default)]
    pub open_thread: Option<String>,
    /// Display names for users whose events carry none.
    #[serde(default)]
    pub user_names: BTreeMap<String, String>,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            typing_timeout_ms: default_typing_timeout_ms(),
            recording_timeout_ms: default_recording_timeout_ms(),
            change_buffer: default_change_buffer(),
            local_user_id: None,
            open_thread: None,
            user_names: BTreeMap::new(),
        }
    }
}

impl PresenceSettings {
    pub fn normalized(mut self) -> Self {
        if self.typing_timeout_ms == 0 {
            self.typing_timeout_ms = default_typing_timeout_ms();
        }
        if self.recording_timeout_ms == 0 {
            self.recording_timeout_ms = default_recording_timeout_ms();
        }
        if self.change_buffer == 0 {
            self.change_buffer = default_change_buffer();
        }
        self.local_user_id = normalize_optional(self.local_user_id);
        self.open_thread = normalize_optional(self.open_thread);

        // Blank rows would only shadow the raw id fallback.
        self.user_names = self
            .user_names
            .into_iter()
            .filter_map(|(user_id, name)| {
                let user_id = user_id.trim().to_string();
                let name = name.trim().to_string();
                (!user_id.is_empty() && !name.is_empty()).then_some((user_id, name))
            })
            .collect();

        self
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            typing_timeout: Duration::from_millis(self.typing_timeout_ms),
            recording_timeout: Duration::from_millis(self.recording_timeout_ms),
            change_buffer: self.change_buffer,
        }
    }

    pub fn local_user(&self) -> Option<UserId> {
        self.local_user_id
            .as_deref()
            .and_then(|raw| UserId::parse(raw).ok())
    }

    pub fn open_thread(&self) -> Option<ThreadId> {
        self.open_thread
            .as_deref()
            .and_then(|raw| ThreadId::parse(raw).ok())
    }

    pub fn directory(&self) -> DirectoryNames {
        self.user_names
            .iter()
            .filter_map(|(user_id, name)| {
                UserId::parse(user_id)
                    .ok()
                    .map(|user_id| (user_id, name.clone()))
            })
            .collect()
    }
}

/// Presence settings as two layers: the JSON file, and that file with `BAZAAR_*`
/// environment overrides on top.
///
/// Edits only ever touch the file layer, so an override set for one run never ends up
/// on disk.
pub struct SettingsStore {
    path: PathBuf,
    stored: ArcSwap<PresenceSettings>,
    effective: ArcSwap<PresenceSettings>,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".bazaar"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn open(path: PathBuf) -> Self {
        let stored = read_file_layer(&path);
        let effective = with_env_overrides(&stored);
        Self {
            path,
            stored: ArcSwap::from_pointee(stored),
            effective: ArcSwap::from_pointee(effective),
        }
    }

    pub fn load() -> Self {
        Self::open(Self::default_config_path())
    }

    /// Settings in effect for this process.
    pub fn settings(&self) -> Arc<PresenceSettings> {
        self.effective.load_full()
    }

    /// Settings as they are on disk, without environment overrides.
    pub fn stored(&self) -> Arc<PresenceSettings> {
        self.stored.load_full()
    }

    /// Applies `edit` to the file layer, writes it back and returns the new effective
    /// settings.
    pub fn edit(
        &self,
        edit: impl FnOnce(&mut PresenceSettings),
    ) -> Result<Arc<PresenceSettings>, SettingsError> {
        let mut stored = (*self.stored.load_full()).clone();
        edit(&mut stored);
        let stored = stored.normalized();

        write_file_layer(&self.path, &stored)?;
        self.effective.store(Arc::new(with_env_overrides(&stored)));
        self.stored.store(Arc::new(stored));
        Ok(self.settings())
    }
}

fn read_file_layer(path: &Path) -> PresenceSettings {
    if !path.exists() {
        tracing::info!("settings file not found at {:?}, using defaults", path);
    }

    // A missing file is an empty layer.
    let figment =
        Figment::from(Serialized::defaults(PresenceSettings::default())).merge(Json::file(path));
    match figment.extract::<PresenceSettings>() {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!("failed to parse settings from {:?}: {}. using defaults", path, error);
            PresenceSettings::default()
        }
    }
}

fn with_env_overrides(stored: &PresenceSettings) -> PresenceSettings {
    let figment = Figment::from(Serialized::defaults(stored))
        .merge(Env::prefixed(SETTINGS_ENV_PREFIX));
    match figment.extract::<PresenceSettings>() {
        Ok(settings) => settings.normalized(),
        Err(error) => {
            tracing::warn!("ignoring {SETTINGS_ENV_PREFIX}* overrides: {error}");
            stored.clone()
        }
    }
}

fn write_file_layer(path: &Path, settings: &PresenceSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(CreateDirSnafu {
            stage: "create-settings-directory",
            path: parent.to_path_buf(),
        })?;
    }

    let content = serde_json::to_string_pretty(settings).context(EncodeSnafu {
        stage: "encode-settings-json",
    })?;

    // Written next to the target and renamed over it, so readers never see half a file.
    let staged = path.with_extension("json.tmp");
    std::fs::write(&staged, content).context(StageFileSnafu {
        stage: "stage-settings-file",
        path: staged.clone(),
    })?;
    std::fs::rename(&staged, path).context(ReplaceFileSnafu {
        stage: "replace-settings-file",
        path: path.to_path_buf(),
    })?;

    tracing::info!("saved settings to {:?}", path);
    Ok(())
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to encode settings on `{stage}`: {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to stage settings at {path:?} on `{stage}`: {source}"))]
    StageFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace settings file {path:?} on `{stage}`: {source}"))]
    ReplaceFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn default_typing_timeout_ms() -> u64 {
    DEFAULT_TYPING_TIMEOUT.as_millis() as u64
}

fn default_recording_timeout_ms() -> u64 {
    DEFAULT_RECORDING_TIMEOUT.as_millis() as u64
}

fn default_change_buffer() -> usize {
    DEFAULT_CHANGE_BUFFER
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
