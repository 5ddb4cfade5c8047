//! End-to-end tests driving the real `jsfence` binary as the sandbox worker.
//!
//! Deadlines are looser than the defaults so debug builds have room to start.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use jsfence::config::SandboxConfig;
use jsfence::sandbox::{Supervisor, TransformResponse};
use jsfence::{Error, ErrorKind};
use serde_json::{json, Value};

const BIN: &str = env!("CARGO_BIN_EXE_jsfence");

fn config() -> SandboxConfig {
    let mut config = SandboxConfig {
        timeout: Duration::from_secs(10),
        ..SandboxConfig::default()
    };
    config.worker.timeout = Duration::from_secs(5);
    config
}

fn supervisor(config: SandboxConfig) -> Supervisor {
    Supervisor::new(config).unwrap().with_exec_path(BIN)
}

#[tokio::test]
async fn transform_runs_in_worker() {
    let payload = json!({
        "data": {"list": [{"id": 101, "title": "Blue", "tags": ["a", "b"]}, {"id": 102, "title": "Red", "tags": []}]}
    });
    let code = r#"function (r) {
        return r.data.list.map(function (s) {
            return { id: String(s.id), name: s.title, tagged: s.tags.length > 0 };
        });
    }"#;

    let result = supervisor(config()).run_transform(code, &payload).await.unwrap();
    assert_eq!(
        result,
        json!([
            {"id": "101", "name": "Blue", "tagged": true},
            {"id": "102", "name": "Red", "tagged": false}
        ])
    );
}

#[tokio::test]
async fn infinite_loop_hits_worker_deadline() {
    let mut config = config();
    config.worker.timeout = Duration::from_millis(300);

    let started = Instant::now();
    let err = supervisor(config)
        .run_transform("function (x) { while (true) {} }", &json!({}))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err:?}");
    assert!(matches!(err, Error::Worker { kind: ErrorKind::Timeout, .. }));
    // Well before the 10s supervisor deadline: the worker stopped the script itself
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[tokio::test]
async fn runaway_native_iteration_is_interrupted() {
    let mut config = config();
    config.worker.timeout = Duration::from_millis(300);

    let started = Instant::now();
    let err = supervisor(config)
        .run_transform(
            "(r) => Array(20000).fill(0).map((a) => Array(20000).fill(1).reduce((s, b) => s + b, a)).length",
            &json!(null),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Worker { kind: ErrorKind::Timeout, .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[tokio::test]
async fn null_result_is_returned() {
    let supervisor = supervisor(config());
    let result = supervisor.run_transform("(r) => null", &json!(1)).await.unwrap();
    assert_eq!(result, Value::Null);

    let result = supervisor
        .run_transform("(r) => r.missing ?? null", &json!({}))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn non_json_result_is_reported() {
    // Functions nested in objects are dropped by JSON serialization
    let trimmed = supervisor(config())
        .run_transform("(r) => ({ f: function () {}, n: undefined, self: null, get: Math.max })", &json!(1))
        .await
        .unwrap();
    assert_eq!(trimmed, json!({"self": null}));

    let err = supervisor(config())
        .run_transform("(r) => function () {}", &json!(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResultNotJson);
}

#[tokio::test]
async fn concurrent_transforms_are_isolated() {
    let supervisor = supervisor(config());
    let code = "(r) => { globalThis.seen = (globalThis.seen || 0) + 1; return { id: r.id, seen: globalThis.seen }; }";

    let runs = (0..4).map(|id| {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.run_transform(code, &json!({"id": id})).await })
    });
    let mut results = Vec::new();
    for run in runs.collect::<Vec<_>>() {
        results.push(run.await.unwrap().unwrap());
    }

    for (id, result) in results.iter().enumerate() {
        assert_eq!(result, &json!({"id": id, "seen": 1}));
    }
}

#[tokio::test]
async fn oversized_output_is_rejected() {
    let mut config = config();
    config.worker.max_result_bytes = 16;
    config.max_stdout_bytes = 32;

    let err = supervisor(config)
        .run_transform("(r) => 'abcdefghijklmn'", &Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OutputTooLarge { limit: 32 }), "{err:?}");
}

#[tokio::test]
async fn thrown_error_crosses_process_boundary() {
    let err = supervisor(config())
        .run_transform("(r) => r.missing.field", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuntimeFault);
}

#[test]
fn worker_answers_empty_stdin() {
    let output = Command::new(BIN)
        .arg("js-sandbox")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(output.status.success());

    let response: TransformResponse = serde_json::from_slice(&output.stdout).unwrap();
    assert!(!response.ok);
    assert_eq!(response.kind, Some(ErrorKind::Protocol));
}

#[test]
fn worker_answers_request_on_stdin() {
    let mut child = Command::new(BIN)
        .arg("js-sandbox")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"{"kind":"transform","code":"(r) => r.a + r.b","payload":{"a":2,"b":3}}"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();

    let response: TransformResponse = serde_json::from_slice(&output.stdout).unwrap();
    assert!(response.ok, "{:?}", response.error);
    assert_eq!(response.result, Some(json!(5)));
}

#[test]
fn cli_evaluates_expression() {
    let output = Command::new(BIN)
        .args(["eval", "(page - 1) * limit", "-v", "page=3", "-v", "limit=20"])
        .env("JSFENCE_CONFIG", "/nonexistent/jsfence.toml")
        .env("JSFENCE_EVAL_TIMEOUT_MS", "5000")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "40");
}

#[test]
fn cli_runs_transform_file() {
    let dir = tempfile::tempdir().unwrap();
    let code = dir.path().join("pick.js");
    std::fs::write(&code, "(r) => r.items.filter((i) => i.keep).length").unwrap();
    let input = dir.path().join("input.json");
    std::fs::write(&input, r#"{"items":[{"keep":true},{"keep":false},{"keep":true}]}"#).unwrap();

    let output = Command::new(BIN)
        .arg("transform")
        .arg(&code)
        .arg("--input")
        .arg(&input)
        .env("JSFENCE_CONFIG", "/nonexistent/jsfence.toml")
        .env("JSFENCE_SANDBOX_TIMEOUT_MS", "10000")
        .env("JSFENCE_WORKER_TIMEOUT_MS", "5000")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "2");
}
