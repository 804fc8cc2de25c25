#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: seed and pay inv-1
    let mut cmd1 = Command::new(cargo_bin!("rentpilot"));
    cmd1.arg("--db-path")
        .arg(&db_path)
        .arg("--properties")
        .arg("tests/fixtures/properties.csv")
        .arg("--invoices")
        .arg("tests/fixtures/invoices.csv")
        .args(["pay", "inv-1", "--tenant", "tenant-1"])
        .env_remove("RENTPILOT_WALLET_API_KEY");

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());

    // 2. Second run: no seed, the store alone must remember the payment
    let mut cmd2 = Command::new(cargo_bin!("rentpilot"));
    cmd2.arg("--db-path").arg(&db_path).arg("report");

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);

    let row = stdout2
        .lines()
        .find(|line| line.starts_with("inv-1,"))
        .expect("inv-1 missing from report");
    assert!(row.contains(",paid,"));
    assert!(stdout2.contains("inv-3,"));

    // 3. Paying again is rejected
    let mut cmd3 = Command::new(cargo_bin!("rentpilot"));
    cmd3.arg("--db-path")
        .arg(&db_path)
        .args(["pay", "inv-1", "--tenant", "tenant-1"]);
    let output3 = cmd3.output().expect("Failed to execute command");
    assert!(!output3.status.success());
}
