//! Persisted provider descriptors.
//!
//! The registry and orchestrator never cache descriptors across calls; they
//! go through a [`ProviderStore`] every time.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::{ProviderDescriptor, ProviderName, ProviderUpdate};

/// Default location of the JSON descriptor file.
pub const DEFAULT_STORE_PATH: &str = ".textlift/providers.json";

#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Latest descriptors, in store order.
    async fn load(&self) -> Result<Vec<ProviderDescriptor>, StoreError>;

    /// Merge `update` into the descriptor for `name`, creating it from
    /// backend defaults if absent. Returns the saved descriptor.
    async fn save(
        &self,
        name: ProviderName,
        update: &ProviderUpdate,
    ) -> Result<ProviderDescriptor, StoreError>;
}

fn validate(update: &ProviderUpdate) -> Result<(), StoreError> {
    if update.priority == Some(0) {
        return Err(StoreError::Invalid("priority must be a positive integer".to_string()));
    }
    if update.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
        return Err(StoreError::Invalid("model must not be empty".to_string()));
    }
    Ok(())
}

fn merge(
    descriptors: &mut Vec<ProviderDescriptor>,
    name: ProviderName,
    update: &ProviderUpdate,
) -> ProviderDescriptor {
    match descriptors
        .iter_mut()
        .find(|d| d.provider_name() == Some(name))
    {
        Some(existing) => {
            existing.apply(update);
            existing.clone()
        }
        None => {
            let mut fresh = ProviderDescriptor::defaults_for(name);
            fresh.apply(update);
            descriptors.push(fresh.clone());
            fresh
        }
    }
}

/// Descriptors for every known backend, seeded with whatever keys the
/// environment provides. Remote backends start enabled only with a key;
/// the local backend only when `OLLAMA_BASE_URL` is set.
pub fn default_descriptors() -> Vec<ProviderDescriptor> {
    ProviderName::ALL
        .iter()
        .map(|&name| {
            let mut d = ProviderDescriptor::defaults_for(name);
            match name {
                ProviderName::Ollama => {
                    if let Ok(url) = std::env::var("OLLAMA_BASE_URL")
                        && !url.trim().is_empty()
                    {
                        d.base_url = Some(url);
                        d.enabled = true;
                    }
                }
                _ => {
                    if let Some(key) = env_key(name) {
                        d.api_key = key;
                        d.enabled = true;
                    }
                }
            }
            d
        })
        .collect()
}

fn env_key(name: ProviderName) -> Option<String> {
    let var = match name {
        ProviderName::OpenAi => "OPENAI_API_KEY",
        ProviderName::Anthropic => "ANTHROPIC_API_KEY",
        ProviderName::OpenRouter => "OPENROUTER_API_KEY",
        ProviderName::Ollama => return None,
    };
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// In-process store. Used for embedding and tests.
#[derive(Default)]
pub struct MemoryProviderStore {
    inner: RwLock<Vec<ProviderDescriptor>>,
}

impl MemoryProviderStore {
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        Self {
            inner: RwLock::new(descriptors),
        }
    }

    /// Replace everything, as an external settings panel would.
    pub fn replace(&self, descriptors: Vec<ProviderDescriptor>) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = descriptors;
    }
}

#[async_trait]
impl ProviderStore for MemoryProviderStore {
    async fn load(&self) -> Result<Vec<ProviderDescriptor>, StoreError> {
        Ok(self.inner.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(
        &self,
        name: ProviderName,
        update: &ProviderUpdate,
    ) -> Result<ProviderDescriptor, StoreError> {
        validate(update)?;
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        Ok(merge(&mut guard, name, update))
    }
}

/// JSON file store. A missing file yields [`default_descriptors`].
///
/// Writes go through temp+rename so readers never see a partial file.
pub struct FileProviderStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileProviderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<ProviderDescriptor>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default_descriptors()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, descriptors: &[ProviderDescriptor]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(descriptors)?;
        atomic_write(&self.path, &json).await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for FileProviderStore {
    async fn load(&self) -> Result<Vec<ProviderDescriptor>, StoreError> {
        self.read().await
    }

    async fn save(
        &self,
        name: ProviderName,
        update: &ProviderUpdate,
    ) -> Result<ProviderDescriptor, StoreError> {
        validate(update)?;
        let _lock = self.write_lock.lock().await;
        let mut descriptors = self.read().await?;
        let saved = merge(&mut descriptors, name, update);
        self.write(&descriptors).await?;
        tracing::info!(provider = %name, "provider configuration saved");
        Ok(saved)
    }
}

/// Atomic write: write to temp file, then rename.
async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
