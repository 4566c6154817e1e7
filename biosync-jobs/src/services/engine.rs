//! External signal engine
//!
//! The engine is an opaque program that reads a signal (or a correlation
//! descriptor) and writes a JSON result to a path it is given. A run succeeds
//! only if the process exits zero, writes nothing to stderr, and leaves output
//! where it was told to.
//!
//! [`ProcessEngine`] spawns the configured program. Tests substitute their
//! own [`SignalEngine`] implementations.

use async_trait::async_trait;
use biosync_common::config::EngineConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::job_store::{JobStore, StoreError};
use crate::models::{JobId, JobKind, SignalKind};

/// Engine run failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineFailure {
    #[error("engine could not be started: {0}")]
    Launch(String),

    #[error("engine exited with {}", exit_label(.code))]
    NonZeroExit {
        code: Option<i32>,
        diagnostics: String,
    },

    #[error("engine reported diagnostics")]
    Diagnostics(String),

    #[error("engine did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("engine finished without writing a result")]
    MissingOutput,
}

impl EngineFailure {
    /// Captured stderr, when the failure carries any
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            EngineFailure::NonZeroExit { diagnostics, .. } => Some(diagnostics),
            EngineFailure::Diagnostics(text) => Some(text),
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Inputs for one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input_path: PathBuf,
    pub kind: SignalKind,
    pub output_path: PathBuf,
    pub sampling_rate: Option<u32>,
}

/// Output of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// Human-readable progress text, surfaced to clients as `details`
    pub stdout: String,
}

#[async_trait]
pub trait SignalEngine: Send + Sync {
    /// Analyze one signal, writing the result to `request.output_path`
    async fn analyze(&self, request: &AnalysisRequest) -> Result<EngineOutput, EngineFailure>;

    /// Correlate the two analyses named in the descriptor file, writing the
    /// result to the descriptor's `outputPath`
    async fn correlate(&self, descriptor_path: &Path) -> Result<EngineOutput, EngineFailure>;
}

/// Engine backed by an external program
pub struct ProcessEngine {
    config: EngineConfig,
    permits: Arc<Semaphore>,
}

impl ProcessEngine {
    pub fn new(config: EngineConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, permits }
    }

    fn command(&self, script_args: &[String]) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(script_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        command
    }

    async fn run(&self, mut command: Command, label: &'static str) -> Result<EngineOutput, EngineFailure> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineFailure::Launch("engine pool closed".to_string()))?;

        let started = Instant::now();
        let output = match tokio::time::timeout(self.config.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(
                    program = %self.config.program,
                    run = label,
                    error = %e,
                    "Failed to launch engine"
                );
                return Err(EngineFailure::Launch(e.to_string()));
            }
            Err(_) => {
                warn!(
                    run = label,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Engine timed out, process killed"
                );
                return Err(EngineFailure::Timeout(self.config.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(EngineFailure::NonZeroExit {
                code: output.status.code(),
                diagnostics: stderr,
            });
        }
        if !stderr.is_empty() {
            return Err(EngineFailure::Diagnostics(stderr));
        }

        debug!(
            run = label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            "Engine run finished"
        );
        Ok(EngineOutput { stdout })
    }
}

#[async_trait]
impl SignalEngine for ProcessEngine {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<EngineOutput, EngineFailure> {
        let mut args = self.config.analysis_args.clone();
        args.extend([
            "--file".to_string(),
            request.input_path.to_string_lossy().into_owned(),
            "--type".to_string(),
            request.kind.as_str().to_string(),
            "--output".to_string(),
            request.output_path.to_string_lossy().into_owned(),
        ]);
        if let Some(hz) = request.sampling_rate {
            args.extend(["--sampling_rate".to_string(), hz.to_string()]);
        }

        self.run(self.command(&args), "analysis").await
    }

    async fn correlate(&self, descriptor_path: &Path) -> Result<EngineOutput, EngineFailure> {
        let mut args = self.config.correlation_args.clone();
        args.extend([
            "--config".to_string(),
            descriptor_path.to_string_lossy().into_owned(),
        ]);

        self.run(self.command(&args), "correlation").await
    }
}

/// Commit a run's staged output, or clean up after it failed.
///
/// An engine that reports success without leaving staged output is treated
/// as [`EngineFailure::MissingOutput`].
pub(crate) async fn settle_run<E>(
    store: &JobStore,
    kind: JobKind,
    id: &JobId,
    outcome: Result<EngineOutput, EngineFailure>,
) -> Result<(PathBuf, EngineOutput), E>
where
    E: From<EngineFailure> + From<StoreError>,
{
    let output = match outcome {
        Ok(output) => output,
        Err(failure) => {
            store.discard(kind, id).await;
            return Err(failure.into());
        }
    };

    match store.commit(kind, id).await {
        Ok(location) => Ok((location, output)),
        Err(StoreError::NothingStaged { .. }) => Err(EngineFailure::MissingOutput.into()),
        Err(e) => {
            store.discard(kind, id).await;
            Err(e.into())
        }
    }
}
