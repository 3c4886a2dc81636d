//! Binary-level end-to-end tests, in the teacher's `cli-sub-agent/tests/e2e.rs`
//! style: spawn the built `pocketwalk` binary against a real temp directory
//! rather than exercising `Supervisor` in-process.

use std::fs;
use std::path::Path;
use std::process::Command;

fn pocketwalk_cmd(tmp: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pocketwalk"));
    cmd.current_dir(tmp);
    cmd
}

fn write_config(tmp: &Path, body: &str) {
    fs::write(tmp.join(".pocketwalk.toml"), body).unwrap();
}

#[test]
fn version_flag_reports_the_crate_version() {
    let tmp = tempfile::tempdir().unwrap();
    let output = pocketwalk_cmd(tmp.path()).arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pocketwalk"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

/// S1 from spec.md §8: a first run with one passing tool exits 0 and leaves
/// behind a full cache triple for it.
#[test]
fn first_run_with_a_passing_tool_exits_zero_and_populates_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.py"), b"print('hi')\n").unwrap();
    write_config(
        tmp.path(),
        r#"
        run = "once"
        no_vcs = true

        [tools.cat]
        target_paths = ["a.py"]
        config = ["{affected_targets}"]
        "#,
    );

    let output = pocketwalk_cmd(tmp.path()).output().unwrap();
    assert!(
        output.status.success(),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let cache_dir = tmp.path().join(".pocketwalk.cache");
    assert!(cache_dir.join("cat.context").is_file());
    assert!(cache_dir.join("cat.output").is_file());
    assert!(cache_dir.join("cat.return_codes").is_file());

    let output_bytes = fs::read(cache_dir.join("cat.output")).unwrap();
    assert!(String::from_utf8_lossy(&output_bytes).contains("print('hi')"));

    let rcs = fs::read_to_string(cache_dir.join("cat.return_codes")).unwrap();
    assert!(rcs.contains("a.py"));
    assert!(rcs.contains('0'));
}

/// S5 from spec.md §8: a configured tool with no matching executable on
/// `PATH` is a synthetic failed outcome, not a crash, and its return code
/// becomes the process exit code.
#[test]
fn missing_executable_is_a_synthetic_failure_not_a_crash() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.py"), b"x = 1\n").unwrap();
    write_config(
        tmp.path(),
        r#"
        run = "once"
        no_vcs = true

        [tools.pocketwalk-definitely-not-a-real-binary-xyz]
        target_paths = ["a.py"]
        "#,
    );

    let output = pocketwalk_cmd(tmp.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(127));

    let cache_dir = tmp.path().join(".pocketwalk.cache");
    let cached = fs::read_to_string(
        cache_dir.join("pocketwalk-definitely-not-a-real-binary-xyz.output"),
    )
    .unwrap();
    assert!(cached.contains("no such executable found"));
}

/// Second run against an unchanged tree replays the cached result instead of
/// re-invoking the tool (spec.md §8 round-trip / idempotence laws).
#[test]
fn second_run_with_no_changes_replays_cached_output() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a.py"), b"print('hi')\n").unwrap();
    write_config(
        tmp.path(),
        r#"
        run = "once"
        no_vcs = true

        [tools.cat]
        target_paths = ["a.py"]
        config = ["{affected_targets}"]
        "#,
    );

    let first = pocketwalk_cmd(tmp.path()).output().unwrap();
    assert!(first.status.success());
    let cache_dir = tmp.path().join(".pocketwalk.cache");
    let context_after_first = fs::read_to_string(cache_dir.join("cat.context")).unwrap();

    let second = pocketwalk_cmd(tmp.path()).output().unwrap();
    assert!(second.status.success());
    let context_after_second = fs::read_to_string(cache_dir.join("cat.context")).unwrap();

    assert_eq!(context_after_first, context_after_second);
    assert!(String::from_utf8_lossy(&second.stdout).contains("print('hi')"));
}

#[test]
fn unknown_tool_named_on_the_cli_is_reported_and_exits_nonzero() {
    let tmp = tempfile::tempdir().unwrap();
    write_config(
        tmp.path(),
        "[tools.cat]\ntarget_paths = []\n",
    );

    let output = pocketwalk_cmd(tmp.path())
        .args(["--tools", "does-not-exist"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does-not-exist"));
}
