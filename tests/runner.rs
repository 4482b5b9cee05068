#![cfg(unix)]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose};
use futures_util::future::join_all;
use slice_recognition::runner::{ProcessParameters, ProcessRunner, RunnerError};
use tempfile::TempDir;

// 最后两个参数分别是输入、输出路径
const COPY: &str = r#"for arg; do in=$out; out=$arg; done
cp "$in" "$out""#;
const ECHO_ARGS: &str = r#"for arg; do out=$arg; done
printf '%s\n' "$@" > "$out""#;
const FAIL: &str = r#"echo "cannot decode image" >&2
exit 3"#;
const NO_OUTPUT: &str = r#"echo "nothing detected" >&2
exit 0"#;
const NOISY: &str = r#"for arg; do in=$out; out=$arg; done
head -c 262144 /dev/zero | tr '\0' o
head -c 262144 /dev/zero | tr '\0' e >&2
cp "$in" "$out""#;
const HANG: &str = "exec sleep 30";
// 工具本身立即退出，但后台进程继承了输出管道
const LINGERING_CHILD: &str = r#"for arg; do in=$out; out=$arg; done
cp "$in" "$out"
sleep 30 &
exit 0"#;
const KILLED: &str = "kill -9 $$";

fn sh_runner(scratch: &Path, script: &str) -> ProcessRunner {
    ProcessRunner::new("/bin/sh", scratch)
        .with_leading_args(["-c", script, "slice_localize"].map(OsString::from))
        .with_timeout(Some(Duration::from_secs(30)))
}

fn scratch(dir: &TempDir) -> PathBuf {
    dir.path().join("scratch")
}

fn leftover_files(scratch: &Path) -> usize {
    std::fs::read_dir(scratch).map(|d| d.count()).unwrap_or(0)
}

fn decode(encoded: &str) -> Vec<u8> {
    general_purpose::STANDARD.decode(encoded).unwrap()
}

#[tokio::test]
async fn successful_run_returns_tool_output() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), COPY);
    let input = b"\x89PNG\r\n\x1a\nfake image body".to_vec();

    let encoded = runner
        .process_image(&input, &ProcessParameters::default())
        .await
        .unwrap();

    assert_eq!(decode(&encoded), input);
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn parameters_and_paths_reach_the_tool() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = scratch(&dir);
    let runner = sh_runner(&scratch, ECHO_ARGS);
    let params = ProcessParameters {
        iterations: Some(50),
        seed: Some(7),
        ..Default::default()
    };

    let encoded = runner.process_image(b"img", &params).await.unwrap();
    let written = String::from_utf8(decode(&encoded)).unwrap();
    let args: Vec<&str> = written.lines().collect();

    assert_eq!(args.len(), 6);
    assert_eq!(args[..4], ["--iterations", "50", "--seed", "7"]);

    let input = Path::new(args[4]);
    let output = Path::new(args[5]);
    assert_eq!(input.parent(), Some(scratch.as_path()));
    assert_eq!(output.parent(), Some(scratch.as_path()));

    let input_id = args[4].rsplit('/').next().unwrap().strip_suffix("_in.png").unwrap();
    let output_id = args[5].rsplit('/').next().unwrap().strip_suffix("_out.png").unwrap();
    assert_eq!(input_id, output_id);
    assert_eq!(input_id.len(), 32);
}

#[tokio::test]
async fn non_zero_exit_is_process_failure() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), FAIL);

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    match err {
        RunnerError::ProcessFailure { exit_code, stderr } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "cannot decode image\n");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn zero_exit_without_output_is_output_missing() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), NO_OUTPUT);

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    match err {
        RunnerError::OutputMissing { stderr } => assert_eq!(stderr, "nothing detected\n"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn missing_executable_is_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ProcessRunner::new(dir.path().join("no_such_tool"), scratch(&dir));

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::LaunchFailure { .. }), "{err:?}");
    assert_eq!(err.stderr(), None);
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn large_output_on_both_streams_does_not_deadlock() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), NOISY);

    let encoded = runner
        .process_image(b"payload", &ProcessParameters::default())
        .await
        .unwrap();

    assert_eq!(decode(&encoded), b"payload");
}

#[tokio::test]
async fn hung_tool_is_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let runner =
        sh_runner(&scratch(&dir), HANG).with_timeout(Some(Duration::from_millis(200)));
    let started = Instant::now();

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn timeout_covers_pipes_held_by_background_child() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), LINGERING_CHILD)
        .with_timeout(Some(Duration::from_millis(500)));
    let started = Instant::now();

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test]
async fn signal_termination_reports_minus_one() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), KILLED);

    let err = runner
        .process_image(b"img", &ProcessParameters::default())
        .await
        .unwrap_err();

    match err {
        RunnerError::ProcessFailure { exit_code, stderr } => {
            assert_eq!(exit_code, -1);
            assert!(stderr.is_empty());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_keep_their_own_files() {
    let dir = tempfile::tempdir().unwrap();
    let runner = sh_runner(&scratch(&dir), COPY);
    let params = ProcessParameters::default();
    let inputs: Vec<Vec<u8>> = (0..8)
        .map(|i| format!("image-{i}").repeat(100).into_bytes())
        .collect();

    let results = join_all(inputs.iter().map(|input| runner.process_image(input, &params))).await;

    for (input, result) in inputs.iter().zip(results) {
        assert_eq!(&decode(&result.unwrap()), input);
    }
    assert_eq!(leftover_files(&scratch(&dir)), 0);
}
