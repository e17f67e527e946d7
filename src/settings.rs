use super::{
    errors::SettingsError,
    model::FieldKey,
    result::SettingsResult,
    state::ViewMode,
};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

pub const DEFAULT_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COLUMN_WIDTH: u32 = 50;

// Settings
//
// Все, что браузер запоминает между запусками: общие параметры и состояние
// каждого исследования (ключ - qualified id исследования).

#[derive(Debug,Clone,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub last_uri: String,
    pub timeout_ms: u64,
    pub allow_quick_delete: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            last_uri: DEFAULT_URI.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            allow_quick_delete: false,
        }
    }
}

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct StudySettings {
    pub filter_text: String,
    pub view_mode: ViewMode,
    pub sort_order: Vec<FieldKey>,
    // None until the user touched the field layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_fields: Option<Vec<FieldKey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invisible_fields: Option<Vec<FieldKey>>,
    pub column_widths: BTreeMap<String, u32>,
}

impl StudySettings {
    pub fn column_width(&self, field: &FieldKey) -> u32 {
        self.column_widths
            .get(&field.to_string())
            .copied()
            .unwrap_or(DEFAULT_COLUMN_WIDTH)
    }
}

#[derive(Debug,Clone,Default,PartialEq,Serialize,Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub studies: BTreeMap<String, StudySettings>,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> SettingsResult<Self> {
        toml::from_str(text).map_err(|err| SettingsError::Parse {
            reason: err.to_string(),
        })
    }

    pub fn to_toml_string(&self) -> SettingsResult<String> {
        toml::to_string_pretty(self).map_err(|err| SettingsError::Serialize {
            reason: err.to_string(),
        })
    }

    pub fn study(&self, qualified_id: &str) -> Option<&StudySettings> {
        self.studies.get(qualified_id)
    }
}

// SettingsStore - чтение без блокировок, запись сериализуется мьютексом

pub struct SettingsStore {
    current: ArcSwap<Settings>,
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            current: ArcSwap::from_pointee(settings),
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens a settings file; a missing file means default settings. The
    /// file is rewritten on every update.
    pub fn open<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|err| io_error(&path, err))?;
            Settings::from_toml_str(&text)?
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
            Settings::default()
        };
        info!(path = %path.display(), studies = settings.studies.len(), "settings loaded");
        Ok(Self {
            current: ArcSwap::from_pointee(settings),
            path: Some(path),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.current.load_full()
    }

    pub fn general(&self) -> GeneralSettings {
        self.current.load().general.clone()
    }

    pub fn study(&self, qualified_id: &str) -> Option<StudySettings> {
        self.current.load().study(qualified_id).cloned()
    }

    // Copy-on-write update, persisted before it becomes visible
    pub fn update<F>(&self, change: F) -> SettingsResult<()>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock();
        let mut next = (**self.current.load()).clone();
        change(&mut next);
        self.persist(&next)?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    pub fn update_study<F>(&self, qualified_id: &str, change: F) -> SettingsResult<()>
    where
        F: FnOnce(&mut StudySettings),
    {
        self.update(|settings| {
            change(settings.studies.entry(qualified_id.to_string()).or_default());
        })
    }

    pub fn save(&self) -> SettingsResult<()> {
        let _guard = self.write_lock.lock();
        self.persist(&self.current.load())
    }

    fn persist(&self, settings: &Settings) -> SettingsResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = settings.to_toml_string()?;
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
        }
        fs::write(path, text).map_err(|err| io_error(path, err))?;
        debug!(path = %path.display(), "settings saved");
        Ok(())
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::in_memory(Settings::default())
    }
}

fn io_error(path: &Path, err: std::io::Error) -> SettingsError {
    SettingsError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}
