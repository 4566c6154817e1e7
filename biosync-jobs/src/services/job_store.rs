//! Flat-file job store
//!
//! Every location is a pure function of its key. There is no index: a result
//! exists when its file exists. Layout under the root folder:
//!
//! ```text
//! uploads/<signal>_<id>.<ext>        raw analysis input
//! uploads/correlation_<id>.json      correlation descriptor
//! results/<id>.json                  analysis result
//! results/correlation_<id>.json      correlation result
//! results/.<result name>.partial     engine output before commit
//! ```
//!
//! Results only ever appear through a rename from their staging file, so a
//! reader never sees a partially written result.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::models::{CorrelationDescriptor, JobId, JobKind, SignalKind};

pub const UPLOADS_DIR: &str = "uploads";
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no {kind} result stored for job {id}")]
    NotFound { kind: JobKind, id: JobId },

    #[error("no staged {kind} output for job {id}")]
    NothingStaged { kind: JobKind, id: JobId },

    #[error("failed to encode {0}")]
    Encode(String),

    #[error("storage I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Open (creating if needed) a store rooted at `root`. The root is made
    /// absolute because paths inside it are handed to engine subprocesses that
    /// may run in another working directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .await
            .map_err(|e| StoreError::io(root, e))?;
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| StoreError::io(root, e))?;

        let store = Self { root };
        store.ensure_layout().await?;
        debug!(root = %store.root.display(), "Job store opened");
        Ok(store)
    }

    /// Create `uploads/` and `results/` under the root if missing
    pub async fn ensure_layout(&self) -> Result<(), StoreError> {
        for dir in [self.uploads_dir(), self.results_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    fn result_file_name(kind: JobKind, id: &JobId) -> String {
        match kind {
            JobKind::Analysis => format!("{}.json", id),
            JobKind::Correlation => format!("correlation_{}.json", id),
        }
    }

    /// Final location of a job's result
    pub fn result_path(&self, kind: JobKind, id: &JobId) -> PathBuf {
        self.results_dir().join(Self::result_file_name(kind, id))
    }

    /// Where the engine writes before the result is committed
    pub fn staging_path(&self, kind: JobKind, id: &JobId) -> PathBuf {
        self.results_dir()
            .join(format!(".{}.partial", Self::result_file_name(kind, id)))
    }

    pub fn input_path(&self, signal: SignalKind, id: &JobId, extension: &str) -> PathBuf {
        self.uploads_dir()
            .join(format!("{}_{}.{}", signal.as_str(), id, extension))
    }

    pub fn descriptor_path(&self, id: &JobId) -> PathBuf {
        self.uploads_dir().join(format!("correlation_{}.json", id))
    }

    pub async fn exists(&self, kind: JobKind, id: &JobId) -> bool {
        fs::metadata(self.result_path(kind, id))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Store a whole result payload atomically
    pub async fn write(&self, kind: JobKind, id: &JobId, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let staging = self.staging_path(kind, id);
        fs::write(&staging, bytes)
            .await
            .map_err(|e| StoreError::io(&staging, e))?;
        self.commit(kind, id).await
    }

    pub async fn read(&self, kind: JobKind, id: &JobId) -> Result<Vec<u8>, StoreError> {
        let path = self.result_path(kind, id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                kind,
                id: id.clone(),
            }),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Promote staged output to the job's result location
    pub async fn commit(&self, kind: JobKind, id: &JobId) -> Result<PathBuf, StoreError> {
        let staging = self.staging_path(kind, id);
        let target = self.result_path(kind, id);
        match fs::rename(&staging, &target).await {
            Ok(()) => Ok(target),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NothingStaged {
                kind,
                id: id.clone(),
            }),
            Err(e) => Err(StoreError::io(&target, e)),
        }
    }

    /// Drop any staged output left by a failed run
    pub async fn discard(&self, kind: JobKind, id: &JobId) {
        let staging = self.staging_path(kind, id);
        match fs::remove_file(&staging).await {
            Ok(()) => debug!(job_id = %id, "Discarded staged output"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                job_id = %id,
                path = %staging.display(),
                error = %e,
                "Failed to discard staged output"
            ),
        }
    }

    /// Persist raw uploaded bytes for an analysis job
    pub async fn write_input(
        &self,
        signal: SignalKind,
        id: &JobId,
        extension: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        let path = self.input_path(signal, id, extension);
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    pub async fn write_descriptor(
        &self,
        id: &JobId,
        descriptor: &CorrelationDescriptor,
    ) -> Result<PathBuf, StoreError> {
        let bytes = serde_json::to_vec(descriptor)
            .map_err(|e| StoreError::Encode(format!("correlation descriptor: {}", e)))?;
        let path = self.descriptor_path(id);
        write_atomic(&path, &bytes).await?;
        Ok(path)
    }
}

/// Write to a hidden sibling then rename over the target
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{}.tmp", file_name));

    if let Err(e) = fs::write(&temp, bytes).await {
        let _ = fs::remove_file(&temp).await;
        return Err(StoreError::io(&temp, e));
    }
    fs::rename(&temp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
