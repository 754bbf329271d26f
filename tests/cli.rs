//! End-to-end tests for the taskq binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// taskq pointed at a throwaway store, an empty config and UTC timestamps
fn taskq(temp: &TempDir) -> Command {
    let config = temp.path().join("config.yaml");
    if !config.exists() {
        fs::write(&config, "").unwrap();
    }

    let mut cmd = Command::cargo_bin("taskq").unwrap();
    cmd.env_remove("TASKQ_DB")
        .env_remove("TASKQ_QUEUE")
        .env_remove("TASKQ_TIMEZONE")
        .env_remove("RUST_LOG")
        .env("TASKQ_CONFIG", &config)
        .arg("--database")
        .arg(temp.path().join("queue.db"))
        .arg("--timezone")
        .arg("utc");
    cmd
}

fn add(temp: &TempDir, entries: &[&str]) {
    taskq(temp).arg("add").args(entries).assert().success();
}

fn count(temp: &TempDir, queue: &str) -> String {
    let output = taskq(temp).args(["-q", queue, "count"]).output().unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[test]
fn cli_shows_help() {
    let temp = TempDir::new().unwrap();
    taskq(&temp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("durable named FIFO work queues"))
        .stdout(predicate::str::contains("backup-to"))
        .stdout(predicate::str::contains("merge-from"));
}

#[test]
fn cli_add_and_list_in_order() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["first", "second", "third"]);

    taskq(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?s)^1 \S+ \S+ first\n2 \S+ \S+ second\n3 \S+ \S+ third\n$").unwrap());
}

#[test]
fn cli_take_is_fifo_then_reports_empty() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a", "b"]);

    taskq(&temp).arg("take").assert().success().stdout("a\n");
    taskq(&temp).arg("get").assert().success().stdout("b\n");
    taskq(&temp)
        .arg("take")
        .assert()
        .code(3)
        .stdout("")
        .stderr(predicate::str::contains("No entry"));
}

#[test]
fn cli_peek_does_not_remove() {
    let temp = TempDir::new().unwrap();
    taskq(&temp).arg("peek").assert().code(3);

    add(&temp, &["a", "b", "c"]);
    taskq(&temp).args(["peek", "-n", "2"]).assert().success().stdout("a\nb\n");
    assert_eq!(count(&temp, "default"), "3");
}

#[test]
fn cli_peek_zero_is_usage_error() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a"]);
    taskq(&temp).args(["peek", "-n", "0"]).assert().code(2).stdout("");
    assert_eq!(count(&temp, "default"), "1");
}

#[test]
fn cli_backup_to_same_queue_other_case_is_rejected() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a", "b"]);
    taskq(&temp).args(["backup-to", "Default"]).assert().code(2);
    assert_eq!(count(&temp, "default"), "2");
}

#[test]
fn cli_delete_ranges() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["e1", "e2", "e3", "e4", "e5"]);

    taskq(&temp)
        .args(["delete", "2...4"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Deleted 2 entries matching 2...4"));
    taskq(&temp).args(["remove", "1-4", "99"]).assert().success();

    taskq(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^5 \S+ \S+ e5\n$").unwrap());
}

#[test]
fn cli_delete_by_pattern() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["build-1", "deploy", "build-2"]);

    taskq(&temp).args(["--quiet", "delete", "/^build/"]).assert().success().stdout("");
    taskq(&temp).arg("take").assert().success().stdout("deploy\n");
}

#[test]
fn cli_bad_selector_is_usage_error() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["keep"]);

    taskq(&temp)
        .args(["delete", "1", "someday"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid selector `someday`"));
    assert_eq!(count(&temp, "default"), "1");
}

#[test]
fn cli_invalid_queue_name_is_usage_error() {
    let temp = TempDir::new().unwrap();
    taskq(&temp)
        .args(["-q", "9lives", "count"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid queue name"));
}

#[test]
fn cli_add_unique_and_dedupe() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["x", "y", "x", "x"]);
    taskq(&temp).args(["add", "--unique", "y"]).assert().success();
    assert_eq!(count(&temp, "default"), "4");

    taskq(&temp)
        .args(["dedupe", "--newest"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 2 duplicate entries"));
    taskq(&temp)
        .arg("dedupe")
        .assert()
        .success()
        .stderr(predicate::str::contains("No duplicates"));

    taskq(&temp).args(["peek", "-n", "5"]).assert().success().stdout("y\nx\n");
}

#[test]
fn cli_dedupe_flags_conflict() {
    let temp = TempDir::new().unwrap();
    taskq(&temp).args(["dedupe", "--oldest", "--newest"]).assert().code(2);
}

#[test]
fn cli_add_reads_stdin() {
    let temp = TempDir::new().unwrap();
    taskq(&temp).arg("add").write_stdin("one\n\ntwo\n").assert().success();
    assert_eq!(count(&temp, "default"), "2");
}

#[test]
fn cli_reset_with_yes() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a", "b"]);
    taskq(&temp)
        .args(["reset", "--yes"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Removed 2 entries"));
    assert_eq!(count(&temp, "default"), "0");
}

#[test]
fn cli_backup_and_restore() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a", "b"]);

    taskq(&temp).args(["backup-to", "saved"]).assert().success();
    taskq(&temp).arg("take").assert().success();
    taskq(&temp)
        .args(["restore-from", "saved"])
        .assert()
        .success()
        .stderr(predicate::str::contains("(+1 entries)"));
    taskq(&temp).args(["peek", "-n", "10"]).assert().success().stdout("a\nb\n");
}

#[test]
fn cli_merge_twice_adds_once() {
    let temp = TempDir::new().unwrap();
    taskq(&temp).args(["-q", "incoming", "add", "p", "q"]).assert().success();

    taskq(&temp)
        .args(["merge-from", "incoming"])
        .assert()
        .success()
        .stderr(predicate::str::contains("(+2 entries)"));
    taskq(&temp)
        .args(["merge-from", "incoming"])
        .assert()
        .success()
        .stderr(predicate::str::contains("(+0 entries)"));
    assert_eq!(count(&temp, "default"), "2");
}

#[test]
fn cli_merge_from_missing_queue_is_usage_error() {
    let temp = TempDir::new().unwrap();
    taskq(&temp)
        .args(["merge-from", "ghost"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn cli_json_output() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["payload"]);

    let output = taskq(&temp).args(["--json", "take"]).output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["id"], 1);
    assert_eq!(value["entry"], "payload");
}

#[test]
fn cli_queues_lists_counts() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a"]);
    taskq(&temp).args(["-q", "other", "add", "b", "c"]).assert().success();

    taskq(&temp)
        .arg("queues")
        .assert()
        .success()
        .stdout("default 1\nother 2\n");
}

#[cfg(unix)]
#[test]
fn cli_run_drains_queue_then_idles() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["one", "two"]);
    let log = temp.path().join("seen.txt");
    let script = format!("echo \"$1\" >> {}", log.display());

    taskq(&temp)
        .args(["run", "--timeout", "1", "--retry-delay", "1", "--", "sh", "-c", &script, "sh", ":"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&log).unwrap(), "one\ntwo\n");
    assert_eq!(count(&temp, "default"), "0");
}

#[cfg(unix)]
#[test]
fn cli_run_failure_exits_with_command_code() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["doomed", "untouched"]);

    taskq(&temp)
        .args(["run", "--timeout", "1", "--error-queue", "failed", "--", "sh", "-c", "exit 5"])
        .assert()
        .code(5);

    assert_eq!(count(&temp, "failed"), "1");
    assert_eq!(count(&temp, "default"), "1");
}

#[cfg(unix)]
#[test]
fn cli_run_ignore_error_continues() {
    let temp = TempDir::new().unwrap();
    add(&temp, &["a", "b"]);

    taskq(&temp)
        .args([
            "run",
            "--timeout",
            "1",
            "--retry-delay",
            "1",
            "--ignore-error",
            "--error-queue",
            "failed",
            "--",
            "sh",
            "-c",
            "exit 1",
        ])
        .assert()
        .success();

    assert_eq!(count(&temp, "failed"), "2");
    assert_eq!(count(&temp, "default"), "0");
}
