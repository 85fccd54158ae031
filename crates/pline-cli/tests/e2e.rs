// Black-box tests driving the real `pline` binary against literal shell
// snippets.

use std::io::Write;
use std::process::Command;

fn pline_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pline"))
}

fn script_with(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn e1_single_echo_prints_line_and_exits_zero() {
    let script = script_with(&["echo hi"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap(), "-n", "1"])
        .output()
        .expect("run pline");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("hi"), "stdout was: {stdout}");
}

#[test]
fn e2_three_echoes_all_observed() {
    let script = script_with(&["echo a", "echo b", "echo c"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap(), "-n", "2"])
        .output()
        .expect("run pline");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for needle in ["a", "b", "c"] {
        assert!(stdout.contains(needle), "stdout missing {needle}: {stdout}");
    }
}

#[test]
fn e3_default_mode_exits_zero_despite_child_failure() {
    let script = script_with(&["exit 7"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap()])
        .output()
        .expect("run pline");
    assert!(output.status.success(), "default mode always exits 0");
}

#[test]
fn e3_chunked_mode_exits_one_on_child_failure() {
    let script = script_with(&["exit 7"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap(), "-m", "chunked"])
        .output()
        .expect("run pline");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn e4_signaled_child_is_reported() {
    let script = script_with(&["kill -TERM $$"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap()])
        .output()
        .expect("run pline");
    assert!(output.status.success(), "default mode always exits 0");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("signal"), "stderr was: {stderr}");
}

#[test]
fn e6_no_inputs_is_a_no_op_success() {
    let output = pline_cmd().output().expect("run pline");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no inputs given"));
}

#[test]
fn list_modes_exits_one_and_names_both_modes() {
    let output = pline_cmd().arg("--list-modes").output().expect("run pline");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("default"));
    assert!(stderr.contains("chunked"));
}

#[test]
fn bad_mode_is_a_cmdline_error() {
    let script = script_with(&["echo hi"]);
    let output = pline_cmd()
        .args(["-i", script.path().to_str().unwrap(), "-m", "nonexistent"])
        .output()
        .expect("run pline");
    assert!(!output.status.success());
}

#[test]
fn stdin_input_source_is_accepted() {
    let mut child = pline_cmd()
        .args(["-i", "-"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .expect("spawn pline");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"echo from-stdin\n")
        .unwrap();
    let output = child.wait_with_output().expect("wait pline");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("from-stdin"), "stdout was: {stdout}");
}
