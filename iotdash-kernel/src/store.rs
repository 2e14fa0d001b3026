/**
 * JSON DOCUMENT STORE - Persistance simple des comptes et du registre de devices
 *
 * RÔLE : Garde une collection en mémoire et la réécrit entièrement sur disque
 * après chaque mutation (fichier temporaire + rename). Sans chemin, le store
 * reste purement en mémoire (tests, démo).
 *
 * Les mutations passent toutes par `update`, sérialisées par un verrou async :
 * le check + insert d'un appelant est atomique, et le dernier écrivain
 * persiste toujours l'état le plus récent. Une mutation n'est visible des
 * lecteurs qu'une fois écrite sur disque.
 */

use crate::error::StoreError;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

pub struct JsonFile<T> {
    path: Option<PathBuf>,
    data: RwLock<T>,
    write_guard: Mutex<()>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Clone,
{
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(T::default()),
            write_guard: Mutex::new(()),
        }
    }

    /// Charge le fichier s'il existe, sinon démarre sur une collection vide
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                T::default()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            info!("[store] no existing {}, starting fresh", path.display());
            T::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
            write_guard: Mutex::new(()),
        })
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.data.read())
    }

    /// Applique la mutation sur une copie, la persiste, puis la publie.
    /// Si l'écriture échoue, l'état en mémoire reste celui d'avant.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, StoreError> {
        let _guard = self.write_guard.lock().await;

        let mut next = self.data.read().clone();
        let result = f(&mut next);

        if let Some(path) = &self.path {
            let bytes = serde_json::to_vec_pretty(&next)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, bytes).await?;
            tokio::fs::rename(&tmp, path).await?;
        }

        *self.data.write() = next;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("things.json");

        let store: JsonFile<BTreeMap<String, u32>> = JsonFile::open(&path).await.unwrap();
        store.update(|m| m.insert("a".into(), 1)).await.unwrap();
        store.update(|m| m.insert("b".into(), 2)).await.unwrap();

        let reopened: JsonFile<BTreeMap<String, u32>> = JsonFile::open(&path).await.unwrap();
        assert_eq!(reopened.read(|m| m.len()), 2);
        assert_eq!(reopened.read(|m| m.get("b").copied()), Some(2));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        let opened = JsonFile::<Vec<u32>>::open(&path).await;
        assert!(matches!(opened, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-subdir").join("things.json");

        let store: JsonFile<Vec<u32>> = JsonFile::open(&path).await.unwrap();
        let written = store.update(|v| v.push(1)).await;
        assert!(matches!(written, Err(StoreError::Io(_))));
        assert_eq!(store.read(|v| v.len()), 0);
    }

    #[tokio::test]
    async fn test_in_memory_never_touches_disk() {
        let store: JsonFile<Vec<u32>> = JsonFile::in_memory();
        let len = store.update(|v| { v.push(7); v.len() }).await.unwrap();
        assert_eq!(len, 1);
    }
}
