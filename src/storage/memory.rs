// In-memory object store for tests and dry runs.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{validate_key, ObjectMeta, ObjectStore, PutOptions};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, PutOptions)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>, options: &PutOptions) -> Result<()> {
        validate_key(key)?;
        self.objects
            .lock()
            .insert(key.to_string(), (body, options.clone()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().get(key).map(|(body, _)| body.clone()))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.objects.lock().get(key).map(|(body, options)| ObjectMeta {
            key: key.to_string(),
            size: body.len() as u64,
            options: options.clone(),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().remove(key);
        Ok(())
    }
}
