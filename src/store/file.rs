//! Directory-backed secret store
//!
//! One file per key. File names are the hex encoding of the key so user ids
//! can never escape the directory. Writes go to a temporary file, created
//! owner-only on unix, that is then renamed over the target.

use alloy::hex;
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::AsyncWriteExt;
use std::path::{Path, PathBuf};

use super::SecretStore;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.secret", hex::encode(key.as_bytes())))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        // A stale temp file from an interrupted write keeps its old mode
        match tokio::fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Storage(format!("remove {}: {}", tmp.display(), e))),
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&tmp)
            .await
            .map_err(|e| Error::Storage(format!("create {}: {}", tmp.display(), e)))?;
        file.write_all(&blob)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {}", tmp.display(), e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Storage(format!("sync {}: {}", tmp.display(), e)))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("rename {}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "Stored secret blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .map_err(|e| Error::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileSecretStore::open(dir.path()).await.unwrap();
        store.put("wallet:123", b"ciphertext".to_vec()).await.unwrap();

        let reopened = FileSecretStore::open(dir.path()).await.unwrap();
        assert!(reopened.contains("wallet:123").await.unwrap());
        assert_eq!(
            reopened.get("wallet:123").await.unwrap(),
            Some(b"ciphertext".to_vec())
        );
        assert_eq!(reopened.get("wallet:456").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_cannot_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(dir.path().join("secrets")).await.unwrap();

        store.put("../../etc/passwd", b"x".to_vec()).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(store.dir()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(!dir.path().join("etc").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(dir.path()).await.unwrap();
        store.put("wallet:1", b"x".to_vec()).await.unwrap();

        let mode = std::fs::metadata(store.path_for("wallet:1"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_temp_file_does_not_leak_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(dir.path()).await.unwrap();
        let tmp = store.path_for("wallet:1").with_extension("tmp");
        std::fs::write(&tmp, b"partial").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.put("wallet:1", b"sealed".to_vec()).await.unwrap();

        let path = store.path_for("wallet:1");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&path).unwrap(), b"sealed");
        assert!(!tmp.exists());
    }
}
