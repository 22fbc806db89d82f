use std::process::{Command, Output};

const PG_VARS: [&str; 6] = [
    "PGHOST",
    "PGPORT",
    "PGUSER",
    "PGPASSWORD",
    "PGDATABASE",
    "PGCONNECT_TIMEOUT",
];

fn retry_audit() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_retry-audit"));
    for var in PG_VARS {
        command.env_remove(var);
    }
    for var in [
        "RETRY_AUDIT_DRIVERS",
        "RETRY_AUDIT_UPDATES",
        "RETRY_AUDIT_LIBSQL_URL",
        "RETRY_AUDIT_MEMORY_FAIL_EVERY",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command.env("PGUSER", "retry_audit_test");
    command
}

fn run(command: &mut Command) -> Output {
    command.output().expect("retry-audit should start")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_memory_driver_prints_report() {
    let output = run(retry_audit().args(["--driver", "memory", "--updates", "25"]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "Testing with memory\n\
         Exec'ed statements: 25\n\
         Reported error count: 0\n\
         Actual updates: 25\n"
    );
}

#[test]
fn test_libsql_and_memory_run_in_order() {
    let output = run(retry_audit().args(["-d", "libsql,memory", "-n", "10"]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    let libsql = text.find("Testing with libsql").expect("libsql section");
    let memory = text.find("Testing with memory").expect("memory section");
    assert!(libsql < memory);
    assert_eq!(text.matches("Actual updates: 10\n").count(), 2);
}

#[test]
fn test_phantom_failures_are_visible() {
    let output = run(retry_audit().args([
        "--driver",
        "memory",
        "--updates",
        "40",
        "--memory-fail-every",
        "8",
        "--memory-commit-failed",
        "--summary",
    ]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Reported error count: 5\n"));
    assert!(text.contains("Actual updates: 40\n"));
    assert!(text.contains("discrepancy +5"));
    assert!(text.contains("Error count disagrees with committed state: memory"));
}

#[test]
fn test_discrepancy_is_logged_as_warning() {
    let output = run(retry_audit().env("RUST_LOG", "warn").args([
        "--driver",
        "memory",
        "--updates",
        "40",
        "--memory-fail-every",
        "8",
        "--memory-commit-failed",
    ]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("WARN"), "stderr: {err}");
    assert!(err.contains("reported errors disagree with committed updates"));
    assert!(!stdout(&output).contains("WARN"));
}

#[test]
fn test_consistent_run_logs_no_warning() {
    let output = run(retry_audit()
        .env("RUST_LOG", "warn")
        .args(["--driver", "memory", "--updates", "10"]));

    assert!(output.status.success());
    assert!(!stderr(&output).contains("disagree"));
}

#[test]
fn test_summary_compares_drivers() {
    let output = run(retry_audit()
        .env("RETRY_AUDIT_MEMORY_FAIL_EVERY", "8")
        .args([
            "-d",
            "libsql,memory",
            "-n",
            "40",
            "--memory-commit-failed",
            "--summary",
        ]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("  libsql: 0 reported errors, 40 actual of 40 executed, discrepancy +0"));
    assert!(text.contains("  memory: 5 reported errors, 40 actual of 40 executed, discrepancy +5"));
    assert!(text.ends_with("Drivers disagree: discrepancies +0 vs +5\n"));
}

#[test]
fn test_json_rejects_summary() {
    let output = run(retry_audit().args(["--driver", "memory", "--json", "--summary"]));

    assert_eq!(output.status.code(), Some(2));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_json_output() {
    let output = run(retry_audit().args(["--driver", "memory", "--updates", "3", "--json"]));

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let line = stdout(&output);
    let report: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(report["driver"], "memory");
    assert_eq!(report["executed"], 3);
    assert_eq!(report["reported_errors"], 0);
    assert_eq!(report["actual_updates"], 3);
}

#[test]
fn test_invalid_port_exits_with_status_one() {
    let output = run(retry_audit().env("PGPORT", "not-a-port").args(["--driver", "memory"]));

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    let err = stderr(&output);
    assert!(err.contains("extract config failed"));
    assert!(err.contains("invalid PGPORT"));
}

#[test]
fn test_unreachable_postgres_exits_before_any_probe() {
    let output = run(retry_audit()
        .env("PGHOST", "127.0.0.1")
        .env("PGPORT", "1")
        .env("PGCONNECT_TIMEOUT", "2")
        .args(["--driver", "memory,sqlx"]));

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(stderr(&output).contains("open sqlx failed"));
}

#[test]
fn test_zero_read_attempts_is_rejected() {
    let output = run(retry_audit().args(["--driver", "memory", "--read-attempts", "0"]));

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("read_attempts must be greater than zero"));
}
