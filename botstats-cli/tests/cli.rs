//! End-to-end tests for the botstats binary.
//!
//! Runs the compiled binary against temporary log files. Nothing here
//! invokes ufw: blocking is either off or in dry-run mode.

use std::fs::File;
use std::io::Write;
use std::process::Command;

use tempfile::TempDir;

/// Write a log with one aggressive client and some background traffic.
fn create_log(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("access.log");
    let mut file = File::create(&path).unwrap();

    for i in 0..5 {
        writeln!(
            file,
            "198.51.100.1 - - [01/Mar/2024:12:0{}:00 +0000] \"GET / HTTP/1.1\" 200 512 \"-\" \"Mozilla/5.0\"",
            i
        )
        .unwrap();
    }
    // 1200 requests within two minutes.
    for i in 0..1200 {
        let secs = i / 10;
        writeln!(
            file,
            "203.0.113.9 - - [01/Mar/2024:12:1{}:{:02} +0000] \"GET /login HTTP/1.1\" 401 64 \"-\" \"python-requests/2.31\"",
            secs / 60,
            secs % 60
        )
        .unwrap();
    }
    path
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_botstats"))
        .args(args)
        .output()
        .expect("failed to run botstats")
}

#[test]
fn test_analyze_prints_report() {
    let dir = TempDir::new().unwrap();
    let log = create_log(&dir);

    let output = run(&["analyze", "--file", log.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== TOP 1 THREATS"));
    assert!(stdout.contains("#1 Address: 203.0.113.9"));
    assert!(stdout.contains("blocking disabled"));
}

#[test]
fn test_analyze_writes_json_file() {
    let dir = TempDir::new().unwrap();
    let log = create_log(&dir);
    let out = dir.path().join("results").join("threats.json");

    let output = run(&[
        "analyze",
        "-f",
        log.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "--format",
        "json",
    ]);

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["entries_processed"], 1_205);
    assert_eq!(json["threats"][0]["id"], "203.0.113.9");
}

#[test]
fn test_analyze_dry_run_block() {
    let dir = TempDir::new().unwrap();
    let log = create_log(&dir);
    let log_file = dir.path().join("botstats.log");

    let output = run(&[
        "analyze",
        "-f",
        log.to_str().unwrap(),
        "--block",
        "--dry-run",
        "--log-file",
        log_file.to_str().unwrap(),
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[DRY RUN - BLOCKED]"));
    assert!(stdout.contains("1 target(s) would be blocked (dry run)"));
    let logged = std::fs::read_to_string(&log_file).unwrap();
    assert!(logged.contains("[DRY RUN] Would block 203.0.113.9"));
}

#[test]
fn test_analyze_missing_file_exit_code() {
    let output = run(&["analyze", "--file", "/nonexistent/access.log"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("file not found"));
}

#[test]
fn test_unknown_strategy_exit_code() {
    let dir = TempDir::new().unwrap();
    let log = create_log(&dir);

    let output = run(&[
        "analyze",
        "-f",
        log.to_str().unwrap(),
        "--block-strategy",
        "aggressive",
    ]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_invalid_whitelist_exit_code() {
    let dir = TempDir::new().unwrap();
    let log = create_log(&dir);
    let whitelist = dir.path().join("whitelist.txt");
    std::fs::write(&whitelist, "10.0.0.1\nnot-an-address\n").unwrap();

    let output = run(&[
        "analyze",
        "-f",
        log.to_str().unwrap(),
        "-w",
        whitelist.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(4));
}
