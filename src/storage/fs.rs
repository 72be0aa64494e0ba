// Filesystem object store — one directory per bucket.
//
// Object bodies live at `<root>/<key>`; headers live in a JSON sidecar under
// `<root>/.meta/<key>.json`. Writes go to a temporary file first and are
// renamed into place, so readers never observe a partial object.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;

use super::{validate_key, ObjectMeta, ObjectStore, PutOptions};

const META_DIR: &str = ".meta";
const TMP_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    async fn write_atomic(path: &Path, body: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let tmp = path.with_extension(match path.extension() {
            Some(ext) => format!("{}{TMP_SUFFIX}", ext.to_string_lossy()),
            None => TMP_SUFFIX.trim_start_matches('.').to_string(),
        });
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to move {} into place", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<()> {
        validate_key(key)?;
        let meta = ObjectMeta {
            key: key.to_string(),
            size: body.len() as u64,
            options: options.clone(),
        };
        Self::write_atomic(&self.object_path(key), &body).await?;
        Self::write_atomic(&self.meta_path(key), &serde_json::to_vec(&meta)?).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.object_path(key)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object {key}")),
        }
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        validate_key(key)?;
        let size = match fs::metadata(self.object_path(key)).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to stat object {key}")),
        };

        let options = match fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice::<ObjectMeta>(&raw)
                .map(|meta| meta.options)
                .unwrap_or_default(),
            Err(_) => PutOptions::default(),
        };

        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size,
            options,
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only the directory that can contain matches is walked.
        let dir_part = match prefix.rfind('/') {
            Some(index) => &prefix[..index],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.root.join(dir_part)
        };

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to list {}", dir.display()))
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .with_context(|| format!("Failed to list {}", dir.display()))?
            {
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if key == META_DIR || key.ends_with(TMP_SUFFIX) {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        for path in [self.object_path(key), self.meta_path(key)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("Failed to delete {key}")),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_and_head() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let options = PutOptions::new("application/json").encrypted();

        store
            .put("data/top-links.json", b"{}".to_vec(), &options)
            .await
            .unwrap();

        assert_eq!(
            store.get("data/top-links.json").await.unwrap(),
            Some(b"{}".to_vec())
        );
        let meta = store.head("data/top-links.json").await.unwrap().unwrap();
        assert_eq!(meta.size, 2);
        assert_eq!(meta.options, options);
        assert!(store.exists("data/top-links.json").await.unwrap());
        assert!(!store.exists("data/missing.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_prefix_skips_metadata() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let options = PutOptions::new("application/json");

        for key in [
            "events/2024-01-02-00-00-00.json",
            "events/2024-01-01-12-00-00.json",
            "events/2024-01-01-00-00-00.json",
            "thumbnails/abc.png",
        ] {
            store.put(key, Vec::new(), &options).await.unwrap();
        }

        assert_eq!(
            store.list("events/2024-01-01").await.unwrap(),
            vec![
                "events/2024-01-01-00-00-00.json".to_string(),
                "events/2024-01-01-12-00-00.json".to_string(),
            ]
        );
        assert_eq!(store.list("events/").await.unwrap().len(), 3);
        assert!(store.list("nothing/here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.delete("feeds/top-day.xml").await.unwrap();
    }
}
