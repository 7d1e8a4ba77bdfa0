//! The sample CPython kernel under `kernels/python3`, driven through the
//! process transport. Skipped when no `python3` is installed.

use std::path::PathBuf;
use std::time::Duration;

use mercury_core::{KernelProvider, KernelRegistry, KernelSpec, Payload, ProcessKernelProvider, Session};

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(30));

fn python_session() -> Option<Box<dyn Session>> {
    if which::which("python3").is_err() {
        eprintln!("python3 not found; skipping");
        return None;
    }
    let spec_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../kernels/python3/kernel.toml");
    let mut registry = KernelRegistry::new();
    registry.insert("python3", KernelSpec::load(&spec_path).expect("Failed to load kernel.toml"));
    Some(
        ProcessKernelProvider::new(registry)
            .start("python3")
            .expect("Failed to start python3 bridge"),
    )
}

fn stdout_text(outputs: &[Payload]) -> String {
    outputs
        .iter()
        .filter_map(|p| match p {
            Payload::Stream { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_fd_writes_do_not_break_the_session() {
    let Some(mut session) = python_session() else {
        return;
    };

    let outputs = session
        .execute("import os\nos.system('echo from-child')\nprint('from-print')", TIMEOUT)
        .unwrap();
    let text = stdout_text(&outputs);
    assert!(text.contains("from-child"), "got {:?}", text);
    assert!(text.contains("from-print"), "got {:?}", text);

    let outputs = session.execute("print(40 + 2)", TIMEOUT).unwrap();
    assert_eq!(stdout_text(&outputs), "42\n");

    session.shutdown().unwrap();
}

#[test]
fn test_traceback_lines_carry_no_newlines() {
    let Some(mut session) = python_session() else {
        return;
    };

    let outputs = session.execute("1 / 0", TIMEOUT).unwrap();
    let Some(Payload::Error { ename, traceback, .. }) = outputs.first() else {
        panic!("expected an error payload, got {:?}", outputs);
    };
    assert_eq!(ename, "ZeroDivisionError");
    assert!(traceback.iter().all(|line| !line.contains('\n')), "got {:?}", traceback);
    assert_eq!(traceback.last().map(String::as_str), Some("ZeroDivisionError: division by zero"));
    assert!(!traceback.iter().any(|line| line.contains("bridge.py")));

    session.shutdown().unwrap();
}

#[test]
fn test_language_info() {
    let Some(mut session) = python_session() else {
        return;
    };

    let info = session.language_info().unwrap();
    assert_eq!(info.file_extension, ".py");
    assert_eq!(info.lexer(), "ipython3");

    session.shutdown().unwrap();
}
