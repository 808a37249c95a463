//! Subshell isolation, brace groups, and redirection scoping.

mod common;

use common::TestShell;

#[test]
fn subshell_mutations_stay_in_the_subshell() {
    let mut sh = TestShell::new();
    sh.run("x=outer");
    assert_eq!(sh.status("(x=10)"), 0);
    assert_eq!(sh.var("x"), Some("outer"));

    // Never-set variables stay unset too.
    sh.run("(fresh=inside)");
    assert_eq!(sh.var("fresh"), None);
}

#[test]
fn subshell_reports_its_own_exit_status() {
    let mut sh = TestShell::new();
    assert_eq!(sh.status("(true; false)"), 1);
    assert_eq!(sh.status("(false; true)"), 0);
    assert_eq!(sh.status("(exit 9)"), 9);
}

#[test]
fn brace_group_runs_in_the_current_context() {
    let mut sh = TestShell::new();
    sh.run("{ x=inside; }");
    assert_eq!(sh.var("x"), Some("inside"));
}

#[test]
fn command_scoped_redirect_does_not_leak() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.txt");
    let second = dir.path().join("second.txt");

    sh.run(&format!("echo one > {}", first.display()));
    sh.run(&format!("echo two > {}", second.display()));
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "one\n");
    assert_eq!(std::fs::read_to_string(&second).unwrap(), "two\n");
}

#[test]
fn append_redirect_accumulates() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("log.txt");
    sh.run(&format!("echo a > {0}; echo b >> {0}", log.display()));
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "a\nb\n");
}

#[test]
fn stderr_redirect_and_dup() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("both.txt");
    // sh -c writes to stderr; 2>&1 folds it into the same file.
    let cmd = format!(
        "sh -c 'echo to-out; echo to-err >&2' > {} 2>&1",
        out.display()
    );
    assert_eq!(sh.status(&cmd), 0);
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("to-out"));
    assert!(text.contains("to-err"));
}

#[test]
fn persistent_exec_redirect_survives_within_a_subshell() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exec.txt");
    // The subshell contains the persistence so the test harness's own
    // stdout is untouched.
    let cmd = format!("(exec > {}; echo first; echo second)", out.display());
    assert_eq!(sh.status(&cmd), 0);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "first\nsecond\n");
}

#[test]
fn heredoc_feeds_stdin() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("heredoc.txt");
    let cmd = format!("cat <<EOF > {}\nline one\nline two\nEOF\n", out.display());
    assert_eq!(sh.status(&cmd), 0);
    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "line one\nline two\n"
    );
}

#[test]
fn heredoc_expands_unless_delimiter_quoted() {
    let mut sh = TestShell::new();
    sh.run("W=expanded");
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");

    sh.run(&format!("cat <<EOF > {}\n$W\nEOF\n", a.display()));
    assert_eq!(std::fs::read_to_string(&a).unwrap(), "expanded\n");

    sh.run(&format!("cat <<'EOF' > {}\n$W\nEOF\n", b.display()));
    assert_eq!(std::fs::read_to_string(&b).unwrap(), "$W\n");
}

#[test]
fn here_string_feeds_one_line() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("hs.txt");
    sh.run("msg=payload");
    assert_eq!(
        sh.status(&format!("cat <<< $msg > {}", out.display())),
        0
    );
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "payload\n");
}

#[test]
fn input_redirect_reads_the_file() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.txt");
    let dst = dir.path().join("dst.txt");
    std::fs::write(&src, "contents\n").unwrap();
    assert_eq!(
        sh.status(&format!("cat < {} > {}", src.display(), dst.display())),
        0
    );
    assert_eq!(std::fs::read_to_string(&dst).unwrap(), "contents\n");
}

#[test]
fn redirection_failure_aborts_command_not_shell() {
    let mut sh = TestShell::new();
    sh.run("x=before");
    let status = sh.status("x=changed < /definitely/not/here/input.txt");
    assert_ne!(status, 0);
    // The command was aborted before the assignment took effect.
    assert_eq!(sh.var("x"), Some("before"));
    assert_eq!(sh.status("true"), 0);
}

#[test]
fn noclobber_blocks_overwrite_but_clobber_form_wins() {
    let mut sh = TestShell::new();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep.txt");
    std::fs::write(&path, "original").unwrap();
    sh.run("set -C");
    assert_ne!(sh.status(&format!("echo new > {}", path.display())), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    assert_eq!(sh.status(&format!("echo new >| {}", path.display())), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
}
