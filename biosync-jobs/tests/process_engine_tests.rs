//! Subprocess engine tests
//!
//! Each test writes a small shell script standing in for the engine and runs
//! it through `sh`.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use biosync_common::config::EngineConfig;
use biosync_jobs::models::SignalKind;
use biosync_jobs::services::{AnalysisRequest, EngineFailure, ProcessEngine, SignalEngine};

/// Prelude shared by every script: records its arguments and extracts the
/// output / config paths
const ARG_PARSER: &str = r#"
echo "$@" > "$(dirname "$0")/args.txt"
out=""
cfg=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --config) cfg="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("engine.sh");
    std::fs::write(&path, format!("{}{}", ARG_PARSER, body)).unwrap();
    path
}

fn engine_for(script: &Path, timeout: Duration) -> ProcessEngine {
    ProcessEngine::new(EngineConfig {
        program: "sh".to_string(),
        analysis_args: vec![script.to_string_lossy().into_owned()],
        correlation_args: vec![script.to_string_lossy().into_owned()],
        working_dir: None,
        timeout,
        max_concurrent: 2,
    })
}

fn request(dir: &Path, sampling_rate: Option<u32>) -> AnalysisRequest {
    AnalysisRequest {
        input_path: dir.join("ecg_job.csv"),
        kind: SignalKind::Ecg,
        output_path: dir.join("out.json"),
        sampling_rate,
    }
}

fn recorded_args(dir: &Path) -> String {
    std::fs::read_to_string(dir.join("args.txt")).unwrap()
}

#[tokio::test]
async fn test_successful_analysis_writes_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        r#"echo "Detected 72 beats"
printf '{"hr": NaN}' > "$out"
"#,
    );
    let engine = engine_for(&script, Duration::from_secs(10));

    let output = engine.analyze(&request(dir.path(), None)).await.unwrap();

    assert_eq!(output.stdout, "Detected 72 beats");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out.json")).unwrap(),
        r#"{"hr": NaN}"#
    );
    let args = recorded_args(dir.path());
    assert!(args.contains("--type ecg"));
    assert!(args.contains("--file"));
    assert!(!args.contains("--sampling_rate"));
}

#[tokio::test]
async fn test_sampling_rate_forwarded() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "printf '{}' > \"$out\"\n");
    let engine = engine_for(&script, Duration::from_secs(10));

    engine.analyze(&request(dir.path(), Some(500))).await.unwrap();

    assert!(recorded_args(dir.path()).contains("--sampling_rate 500"));
}

#[tokio::test]
async fn test_stderr_with_zero_exit_is_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        r#"printf '{}' > "$out"
echo "RuntimeWarning: invalid value encountered" >&2
"#,
    );
    let engine = engine_for(&script, Duration::from_secs(10));

    let err = engine.analyze(&request(dir.path(), None)).await.unwrap_err();
    assert_eq!(
        err,
        EngineFailure::Diagnostics("RuntimeWarning: invalid value encountered".to_string())
    );
}

#[tokio::test]
async fn test_whitespace_only_stderr_is_not_failure() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        r#"printf '{}' > "$out"
printf '\n  \n' >&2
"#,
    );
    let engine = engine_for(&script, Duration::from_secs(10));

    assert!(engine.analyze(&request(dir.path(), None)).await.is_ok());
}

#[tokio::test]
async fn test_non_zero_exit_keeps_diagnostics() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        r#"echo "unsupported file" >&2
exit 3
"#,
    );
    let engine = engine_for(&script, Duration::from_secs(10));

    let err = engine.analyze(&request(dir.path(), None)).await.unwrap_err();
    assert_eq!(
        err,
        EngineFailure::NonZeroExit {
            code: Some(3),
            diagnostics: "unsupported file".to_string(),
        }
    );
}

#[tokio::test]
async fn test_slow_engine_times_out() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "exec sleep 5\n");
    let engine = engine_for(&script, Duration::from_millis(300));

    let started = std::time::Instant::now();
    let err = engine.analyze(&request(dir.path(), None)).await.unwrap_err();

    assert_eq!(err, EngineFailure::Timeout(Duration::from_millis(300)));
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_missing_program_is_launch_failure() {
    let engine = ProcessEngine::new(EngineConfig {
        program: "/nonexistent/biosync-engine".to_string(),
        analysis_args: Vec::new(),
        correlation_args: Vec::new(),
        working_dir: None,
        timeout: Duration::from_secs(5),
        max_concurrent: 1,
    });
    let dir = TempDir::new().unwrap();

    let err = engine.analyze(&request(dir.path(), None)).await.unwrap_err();
    assert!(matches!(err, EngineFailure::Launch(_)));
}

#[tokio::test]
async fn test_correlation_receives_descriptor_path() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        dir.path(),
        r#"cp "$cfg" "$(dirname "$0")/seen.json"
echo "correlated"
"#,
    );
    let descriptor = dir.path().join("correlation_abc.json");
    std::fs::write(&descriptor, r#"{"ecgAnalysisId": "a"}"#).unwrap();
    let engine = engine_for(&script, Duration::from_secs(10));

    let output = engine.correlate(&descriptor).await.unwrap();

    assert_eq!(output.stdout, "correlated");
    assert!(recorded_args(dir.path()).contains("--config"));
    assert_eq!(
        std::fs::read_to_string(dir.path().join("seen.json")).unwrap(),
        r#"{"ecgAnalysisId": "a"}"#
    );
}
