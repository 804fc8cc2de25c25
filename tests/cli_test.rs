mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use chrono::{Duration, Utc};
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const PROPERTIES: &str = "tests/fixtures/properties.csv";
const INVOICES: &str = "tests/fixtures/invoices.csv";

/// The binary with no provider credentials leaking in from the environment.
fn rentpilot() -> Command {
    let mut cmd = Command::new(cargo_bin!("rentpilot"));
    for var in [
        "RENTPILOT_GEMINI_API_KEY",
        "RENTPILOT_OPENAI_API_KEY",
        "RENTPILOT_WALLET_API_KEY",
        "RENTPILOT_TENANT_WALLET_ID",
        "RENTPILOT_OWNER_ADDRESS",
        "RENTPILOT_ALLOW_SIMULATED_SETTLEMENT",
        "RENTPILOT_LOG_JSON",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RENTPILOT_LOG_LEVEL", "warn");
    cmd
}

fn seeded() -> Command {
    let mut cmd = rentpilot();
    cmd.arg("--properties").arg(PROPERTIES).arg("--invoices").arg(INVOICES);
    cmd
}

#[test]
fn test_report_lists_seeded_invoices() -> Result<(), Box<dyn std::error::Error>> {
    seeded()
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "id,property,tenant,amount,due_date,status,late_fee,decision,confidence,tx_hash,paid_date",
        ))
        .stdout(predicate::str::contains(
            "inv-1,Ocean Apartment,tenant-1,3,2031-01-01T00:00:00+00:00,pending,,,,,",
        ))
        .stdout(predicate::str::contains(
            "inv-2,Ocean Apartment,tenant-1,2.5,2030-12-01T00:00:00+00:00,paid,,,,0x8c2f4e6a,2030-11-30T12:00:00+00:00",
        ));

    Ok(())
}

#[test]
fn test_report_for_tenant_hides_other_tenants() {
    seeded()
        .args(["report", "--tenant", "tenant-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("inv-3"))
        .stdout(predicate::str::contains("inv-1").not());
}

#[test]
fn test_pay_settles_with_simulated_reference() {
    seeded()
        .args(["pay", "inv-1", "--tenant", "tenant-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"paid\""))
        .stdout(predicate::str::contains("\"simulated\": true"))
        .stdout(predicate::str::is_match(r#""reference": "0x[0-9a-f]{64}""#).unwrap());
}

#[test]
fn test_pay_without_invoice_picks_next_due() {
    seeded()
        .args(["pay", "--tenant", "tenant-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"inv-3\""));
}

#[test]
fn test_pay_by_other_tenant_is_forbidden() {
    seeded()
        .args(["pay", "inv-1", "--tenant", "tenant-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Forbidden"));
}

#[test]
fn test_pay_settled_invoice_fails() {
    seeded()
        .args(["pay", "inv-2", "--tenant", "tenant-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invoice already paid"));
}

#[test]
fn test_decide_late_uses_late_fee_rule() {
    rentpilot()
        .args(["decide", "late", "--days-overdue", "10", "--amount", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"apply_late_fee\""))
        .stdout(predicate::str::contains("\"lateFeeAmount\": \"5.00\""))
        .stdout(predicate::str::contains("\"confidence\": 90"))
        .stdout(predicate::str::contains("\"source\": \"fallback\""));
}

#[test]
fn test_decide_pre_due_without_provider_asks_for_review() {
    rentpilot()
        .args(["decide", "pre-due", "--due-in-days", "5", "--amount", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"manual_review\""))
        .stdout(predicate::str::contains("\"confidence\": 0"));
}

#[test]
fn test_out_of_range_due_date_is_rejected() {
    seeded()
        .args([
            "decide",
            "pre-due",
            "--due-in-days",
            "9223372036854775807",
            "--amount",
            "3",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Validation error"));
}

#[test]
fn test_cancel_by_owner() {
    seeded()
        .args(["cancel", "inv-3", "--owner", "owner-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"cancelled\""));

    seeded()
        .args(["cancel", "inv-3", "--owner", "owner-2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Forbidden"));
}

#[test]
fn test_summary_counts_statuses() {
    seeded()
        .args(["summary", "--owner", "owner-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 3"))
        .stdout(predicate::str::contains("\"paid\": 1"))
        .stdout(predicate::str::contains("\"pending\": 2"));
}

#[test]
fn test_summary_lists_owner_properties() {
    seeded()
        .args(["summary", "--owner", "owner-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ocean Apartment"))
        .stdout(predicate::str::contains("Hill House"));

    seeded()
        .args(["summary", "--owner", "owner-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"properties\": []"));
}

#[test]
fn test_monitor_once_applies_late_fee() {
    let dir = tempfile::tempdir().unwrap();
    let invoices = dir.path().join("invoices.csv");
    let now = Utc::now();
    common::write_invoices_csv(
        &invoices,
        &[
            ("late", "tenant-1", "100", now - Duration::days(10)),
            ("soon", "tenant-1", "3", now + Duration::days(2)),
        ],
    )
    .unwrap();

    rentpilot()
        .arg("--invoices")
        .arg(&invoices)
        .args(["monitor", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"overdueEvaluated\": 1"))
        .stdout(predicate::str::contains("\"lateFeesApplied\": 1"))
        .stdout(predicate::str::contains("\"reminders\": 1"));
}

#[test]
fn test_malformed_seed_row_is_reported_and_skipped() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "id,propertyId,propertyName,ownerId,tenantId,amount,dueDate").unwrap();
    writeln!(csv, "bad,prop-1,Ocean Apartment,owner-1,tenant-1,abc,2031-01-01T00:00:00Z").unwrap();
    writeln!(csv, "good,prop-1,Ocean Apartment,owner-1,tenant-1,3,2031-01-01T00:00:00Z").unwrap();

    rentpilot()
        .arg("--invoices")
        .arg(csv.path())
        .arg("report")
        .assert()
        .success()
        .stderr(predicate::str::contains("Error reading invoice"))
        .stdout(predicate::str::contains("good,"))
        .stdout(predicate::str::contains("bad,").not());
}
