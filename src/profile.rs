//! On-disk profile: each storage class lives under its own path inside the
//! profile directory. Clearing a class removes that path.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ShellError, ShellResult};
use crate::lifecycle::{SessionStorage, StorageClass};

const HTTP_CACHE_DIR: &str = "Cache";

#[derive(Debug, Clone)]
pub struct DiskProfile {
    root: PathBuf,
}

impl DiskProfile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, class: StorageClass) -> PathBuf {
        let name = match class {
            StorageClass::Cookies => "Cookies",
            StorageClass::LocalStorage => "Local Storage",
            StorageClass::CacheStorage => "CacheStorage",
            StorageClass::FileSystem => "File System",
            StorageClass::IndexedDb => "IndexedDB",
            StorageClass::ServiceWorkers => "Service Worker",
            StorageClass::WebSql => "databases",
        };
        self.root.join(name)
    }

    pub fn http_cache_path(&self) -> PathBuf {
        self.root.join(HTTP_CACHE_DIR)
    }
}

/// Removes a file or a directory tree. A missing path is already clear.
async fn remove_path(path: &Path) -> io::Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let result = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => {
            debug!(path = %path.display(), "Removed");
            other
        }
    }
}

#[async_trait]
impl SessionStorage for DiskProfile {
    async fn clear(&self, class: StorageClass) -> ShellResult<()> {
        remove_path(&self.path_for(class))
            .await
            .map_err(|source| ShellError::StorageClear { class, source })
    }

    async fn clear_http_cache(&self) -> ShellResult<()> {
        remove_path(&self.http_cache_path())
            .await
            .map_err(ShellError::HttpCacheClear)
    }

    /// Nothing is buffered in memory: every write already reached the disk.
    async fn flush(&self) -> ShellResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::clear_all;

    #[tokio::test]
    async fn test_clear_removes_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let profile = DiskProfile::new(dir.path());

        std::fs::write(profile.path_for(StorageClass::Cookies), b"sid=1").unwrap();
        let idb = profile.path_for(StorageClass::IndexedDb);
        std::fs::create_dir_all(idb.join("https_example.com_0")).unwrap();
        std::fs::write(idb.join("https_example.com_0/data"), b"x").unwrap();

        profile.clear(StorageClass::Cookies).await.unwrap();
        profile.clear(StorageClass::IndexedDb).await.unwrap();

        assert!(!profile.path_for(StorageClass::Cookies).exists());
        assert!(!idb.exists());
    }

    #[tokio::test]
    async fn test_missing_paths_are_already_clear() {
        let dir = tempfile::tempdir().unwrap();
        let profile = DiskProfile::new(dir.path().join("never-created"));
        let report = clear_all(&profile).await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_http_cache_and_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let profile = DiskProfile::new(dir.path());
        std::fs::create_dir_all(profile.http_cache_path()).unwrap();
        std::fs::write(dir.path().join("Preferences"), b"{}").unwrap();

        profile.clear_http_cache().await.unwrap();

        assert!(!profile.http_cache_path().exists());
        assert!(dir.path().join("Preferences").exists());
    }
}
