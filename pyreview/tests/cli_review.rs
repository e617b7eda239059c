//! CLI tests for the `pyreview` binary.
//!
//! Only failure paths that stop before the model loads are exercised here.

use std::fs;
use std::process::Command;

use pyreview::exit_codes;

#[test]
fn existing_feedback_exits_with_feedback_exists_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("hello.py"), "print('hello')\n").expect("source");
    fs::write(temp.path().join("hello.md"), "earlier feedback\n").expect("feedback");

    let output = Command::new(env!("CARGO_BIN_EXE_pyreview"))
        .current_dir(temp.path())
        .arg("hello.py")
        .output()
        .expect("run pyreview");

    assert_eq!(output.status.code(), Some(exit_codes::FEEDBACK_EXISTS));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists"));
    assert_eq!(
        fs::read_to_string(temp.path().join("hello.md")).expect("md"),
        "earlier feedback\n"
    );
}

#[test]
fn missing_config_exits_with_failure_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("hello.py"), "print('hello')\n").expect("source");

    let status = Command::new(env!("CARGO_BIN_EXE_pyreview"))
        .current_dir(temp.path())
        .args(["--config", "nope.toml", "hello.py"])
        .status()
        .expect("run pyreview");

    assert_eq!(status.code(), Some(exit_codes::FAILED));
    assert!(!temp.path().join("hello.md").exists());
}

#[test]
fn missing_input_exits_with_failure_code() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_pyreview"))
        .current_dir(temp.path())
        .arg("absent.py")
        .status()
        .expect("run pyreview");

    assert_eq!(status.code(), Some(exit_codes::FAILED));
}

#[test]
fn colliding_inputs_are_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("task.py"), "x = 1\n").expect("py");
    fs::write(temp.path().join("task.ipynb"), "{}").expect("ipynb");

    let output = Command::new(env!("CARGO_BIN_EXE_pyreview"))
        .current_dir(temp.path())
        .args(["task.py", "task.ipynb"])
        .output()
        .expect("run pyreview");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("would both write feedback"));
}
