use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, sync::Mutex};
use tracing::{debug, warn};

use crate::application::ports::KeyValueStore;
use crate::shared::AppError;

/// 一つの JSON ドキュメントとしてディスクに保存する永続キー・バリューストア
///
/// 書き込みは一時ファイルへ書いてからリネームする。
pub struct FileKeyValueStore {
    path: PathBuf,
    document: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| {
                    AppError::Storage(format!("Failed to create storage dir: {err}"))
                })?;
            }
        }

        let document = if fs::metadata(&path).await.is_ok() {
            let bytes = fs::read(&path)
                .await
                .map_err(|err| AppError::Storage(format!("Failed to read storage file: {err}")))?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                match serde_json::from_slice(&bytes) {
                    Ok(document) => document,
                    Err(err) => {
                        quarantine(&path, &err).await;
                        BTreeMap::new()
                    }
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), entries = document.len(), "opened durable store");
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, document: &BTreeMap<String, String>) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(document).map_err(|err| {
            AppError::SerializationError(format!("Failed to serialize storage file: {err}"))
        })?;
        let temp = self.path.with_extension("json.tmp");
        fs::write(&temp, json)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to write storage file: {err}")))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to replace storage file: {err}")))
    }
}

/// 読めないファイルを `*.corrupt` へ退避し、空の状態から始める
async fn quarantine(path: &Path, err: &serde_json::Error) {
    let aside = path.with_extension("json.corrupt");
    warn!(
        path = %path.display(),
        moved_to = %aside.display(),
        error = %err,
        "durable store file is unreadable, starting empty"
    );
    if let Err(err) = fs::rename(path, &aside).await {
        warn!(path = %path.display(), error = %err, "failed to move unreadable store file aside");
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.document.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut document = self.document.lock().await;
        let previous = document.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist(&document).await {
            // 書けなかった変更はメモリにも残さない
            match previous {
                Some(previous) => document.insert(key.to_string(), previous),
                None => document.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), AppError> {
        let mut document = self.document.lock().await;
        if document.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&document).await
    }

    async fn keys(&self) -> Result<Vec<String>, AppError> {
        Ok(self.document.lock().await.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), AppError> {
        let mut document = self.document.lock().await;
        document.clear();
        self.persist(&document).await
    }
}
