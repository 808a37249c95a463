//! Pipeline exit-status semantics, with and without pipefail.

mod common;

use common::TestShell;

#[test]
fn pipeline_status_is_last_stage() {
    let mut sh = TestShell::new();
    assert_eq!(sh.status("true | false"), 1);
    assert_eq!(sh.status("false | true"), 0);
}

#[test]
fn pipefail_reports_rightmost_failure() {
    let mut sh = TestShell::new();
    sh.run("set -o pipefail");
    assert_eq!(sh.status("false | true"), 1);
    assert_eq!(sh.status("true | true"), 0);
}

#[test]
fn pipefail_prefers_rightmost_nonzero() {
    let mut sh = TestShell::new();
    sh.run("set -o pipefail");
    // sh -c 'exit 3' fails with 3 in the middle; rightmost non-zero wins.
    assert_eq!(sh.status("sh -c 'exit 2' | sh -c 'exit 3' | true"), 3);
}

#[test]
fn pipe_actually_carries_data() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.txt");
    let cmd = format!("printf 'b\\na\\n' | sort > {}", out.display());
    assert_eq!(sh.status(&cmd), 0);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "a\nb\n");
}

#[test]
fn negated_pipeline_complements_status() {
    let mut sh = TestShell::new();
    assert_eq!(sh.status("! true"), 1);
    assert_eq!(sh.status("! false"), 0);
    assert_eq!(sh.status("! true | false"), 0);
}

#[test]
fn command_not_found_is_127() {
    let mut sh = TestShell::new();
    assert_eq!(sh.status("definitely-not-a-command-xyzzy"), 127);
}

#[test]
fn non_executable_file_is_126() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");
    std::fs::write(&path, "not a program\n").unwrap();
    assert_eq!(sh.status(&path.display().to_string()), 126);
}

#[test]
fn and_or_short_circuits_left_to_right() {
    let mut sh = TestShell::new();
    assert_eq!(sh.status("true && false"), 1);
    assert_eq!(sh.status("false && true"), 1);
    assert_eq!(sh.status("false || true"), 0);
    assert_eq!(sh.status("true || false"), 0);
    sh.run("x=start; false && x=and || x=or");
    assert_eq!(sh.var("x"), Some("or"));
}

#[test]
fn sequence_runs_left_to_right() {
    let mut sh = TestShell::new();
    sh.run("x=1; x=2; x=3");
    assert_eq!(sh.var("x"), Some("3"));
}
