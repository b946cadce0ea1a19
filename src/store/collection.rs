use crate::errors::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

pub(crate) type Records<T> = BTreeMap<Uuid, T>;

/// One JSON document on disk mapping id -> record, mirrored in memory.
///
/// Readers see the last committed map. Writers hold the write lock across
/// the file write and publish the new map only after it reached the disk,
/// so a failed write leaves both copies untouched.
pub(crate) struct Collection<T> {
    name: &'static str,
    path: PathBuf,
    records: RwLock<Records<T>>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) async fn open(dir: &Path, name: &'static str) -> Result<Self, AppError> {
        let path = dir.join(format!("{}.json", name));

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Records::new(),
            Ok(bytes) => serde_json::from_slice::<Records<T>>(&bytes).map_err(|err| {
                tracing::error!("Failed to parse {}: {:?}", path.display(), err);
                AppError::Storage(format!("corrupt collection file {}: {}", path.display(), err))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Creating empty collection file {}", path.display());
                let empty = Records::<T>::new();
                write_atomic(&path, &empty).await?;
                empty
            }
            Err(err) => {
                tracing::error!("Failed to read {}: {:?}", path.display(), err);
                return Err(AppError::storage(err));
            }
        };

        tracing::debug!(collection = name, records = records.len(), "Collection loaded");

        Ok(Self {
            name,
            path,
            records: RwLock::new(records),
        })
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, Records<T>> {
        self.records.read().await
    }

    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, Records<T>> {
        self.records.write().await
    }

    /// Writes `next` to disk. The caller publishes it with `*guard = next`.
    pub(crate) async fn persist(&self, next: &Records<T>) -> Result<(), AppError> {
        write_atomic(&self.path, next).await.map_err(|err| {
            tracing::error!(collection = self.name, "Failed to persist collection: {}", err);
            err
        })
    }

    /// Persist then publish in one step, for single-collection mutations.
    pub(crate) async fn commit(
        &self,
        guard: &mut RwLockWriteGuard<'_, Records<T>>,
        next: Records<T>,
    ) -> Result<(), AppError> {
        self.persist(&next).await?;
        **guard = next;
        Ok(())
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }
}

/// Temp file in the target directory, fsync, rename over the target.
async fn write_atomic<T: Serialize>(path: &Path, records: &Records<T>) -> Result<(), AppError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    })
    .await
    .map_err(|err| AppError::Storage(format!("write task failed: {}", err)))?
    .map_err(AppError::from)
}
