use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{SettingsFile, TasksFile};

pub const SCHEMA_VERSION: u32 = 1;

const TASKS_FILE: &str = "tasks.json";
const SETTINGS_FILE: &str = "settings.json";
const KV_DIR: &str = "kv";
const DATA_DIR_NAME: &str = ".todo";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("cannot resolve home directory: {0}")]
    Home(#[from] std::env::VarError),
}

/// Resolves `$HOME/.todo`, creating it when missing.
pub fn default_data_dir() -> Result<PathBuf, StorageError> {
    let home = std::env::var("HOME")?;
    let dir = PathBuf::from(home).join(DATA_DIR_NAME);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(KV_DIR))?;
        Ok(())
    }

    pub fn load_tasks(&self) -> Result<TasksFile, StorageError> {
        self.load_json(self.root.join(TASKS_FILE))
    }

    pub fn save_tasks(&self, data: &TasksFile) -> Result<(), StorageError> {
        self.write_atomic(&self.root.join(TASKS_FILE), &serde_json::to_vec_pretty(data)?)
    }

    pub fn load_settings(&self) -> Result<SettingsFile, StorageError> {
        self.load_json(self.root.join(SETTINGS_FILE))
    }

    pub fn save_settings(&self, data: &SettingsFile) -> Result<(), StorageError> {
        self.write_atomic(
            &self.root.join(SETTINGS_FILE),
            &serde_json::to_vec_pretty(data)?,
        )
    }

    /// Reads the raw value stored under `key`. A missing key is `Ok(None)`.
    pub fn get_value(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        match fs::read_to_string(self.value_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.ensure_dirs()?;
        self.write_atomic(&self.value_path(key), value.as_bytes())
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(KV_DIR).join(key)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(temp_path, path)?;
        Ok(())
    }
}
