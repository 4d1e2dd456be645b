use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use coursemart::application::signature;
use predicates::prelude::*;
use serde_json::json;
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, tempdir};

const SECRET: &str = "cli-secret";
const LEARNER: &str = "aaaaaaaa-0000-0000-0000-000000000001";
const INSTRUCTOR: &str = "aaaaaaaa-0000-0000-0000-000000000002";
const PAID_COURSE: &str = "bbbbbbbb-0000-0000-0000-000000000001";
const FREE_COURSE: &str = "bbbbbbbb-0000-0000-0000-000000000002";
const SECTION: &str = "cccccccc-0000-0000-0000-000000000001";
const LECTURE_1: &str = "dddddddd-0000-0000-0000-000000000001";
const LECTURE_2: &str = "dddddddd-0000-0000-0000-000000000002";

fn write_json(value: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{value}").unwrap();
    file
}

fn config_file() -> NamedTempFile {
    write_json(&json!({ "server_secret": SECRET }))
}

fn fixture_file() -> NamedTempFile {
    write_json(&json!({
        "users": [
            {
                "id": LEARNER,
                "email": "asha@example.com",
                "name": "Asha",
                "role": "learner",
                "token": "tok_asha"
            },
            {
                "id": INSTRUCTOR,
                "email": "nadia@example.com",
                "name": "Nadia",
                "role": "instructor",
                "token": "tok_nadia"
            }
        ],
        "courses": [
            {
                "id": PAID_COURSE,
                "title": "Systems Programming",
                "price": "50.00",
                "is_free": false,
                "published": true,
                "instructor": INSTRUCTOR,
                "sections": [
                    { "id": SECTION, "lectures": [LECTURE_1, LECTURE_2] }
                ]
            },
            {
                "id": FREE_COURSE,
                "title": "Intro to Rust",
                "price": "0",
                "is_free": true,
                "published": true,
                "instructor": INSTRUCTOR,
                "sections": []
            }
        ]
    }))
}

fn script_file(lines: &[serde_json::Value]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# generated by cli_test").unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn test_purchase_to_completion_flow() {
    // The sandbox gateway hands out sequential handles, so the script
    // can name the order before it exists and sign it here.
    let sig = signature::sign(SECRET, "order_000001", "txn_cli_1");
    let script = script_file(&[
        json!({"op": "enroll", "actor": "tok_asha", "course": FREE_COURSE}),
        json!({"op": "create_order", "actor": "tok_asha", "course": PAID_COURSE}),
        json!({"op": "verify_payment", "actor": "tok_asha", "order_handle": "order_000001",
               "transaction_id": "txn_cli_1", "signature": sig}),
        json!({"op": "verify_payment", "actor": "tok_asha", "order_handle": "order_000001",
               "transaction_id": "txn_cli_1", "signature": sig}),
        json!({"op": "toggle_lecture", "actor": "tok_asha", "course": PAID_COURSE, "lecture": LECTURE_1}),
        json!({"op": "toggle_lecture", "actor": "tok_asha", "course": PAID_COURSE, "lecture": LECTURE_2}),
        json!({"op": "verify_certificate", "certificate_id": "doesnotexist"}),
    ]);
    let fixture = fixture_file();
    let config = config_file();

    let mut cmd = Command::new(cargo_bin!("coursemart"));
    cmd.arg(script.path())
        .arg("--fixture")
        .arg(fixture.path())
        .arg("--config")
        .arg(config.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"order_handle\":\"order_000001\""))
        .stdout(predicate::str::contains("\"amount\":5000"))
        .stdout(predicate::str::contains("\"currency\":\"INR\""))
        // The duplicate verification loses with a conflict.
        .stdout(predicate::str::contains("\"status\":409"))
        .stdout(predicate::str::contains("payment already verified"))
        // Two toggles of a two-lecture course complete it.
        .stdout(predicate::str::contains("\"updated_percentage\":50"))
        .stdout(predicate::str::contains("\"course_completed\":true"))
        // Unknown certificate ids are a 404, not an error dump.
        .stdout(predicate::str::contains("\"status\":404"));
}

#[test]
fn test_sandbox_settlement_round_trip() {
    let script = script_file(&[
        json!({"op": "create_order", "actor": "tok_asha", "course": PAID_COURSE}),
        json!({"op": "settle_order", "order_handle": "order_000001"}),
    ]);
    let fixture = fixture_file();
    let config = config_file();

    let mut cmd = Command::new(cargo_bin!("coursemart"));
    cmd.arg(script.path())
        .arg("--fixture")
        .arg(fixture.path())
        .arg("--config")
        .arg(config.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"transaction_id\":\"txn_000001\""))
        .stdout(predicate::str::contains("\"signature\":"));
}

#[test]
fn test_payments_export_csv() {
    let sig = signature::sign(SECRET, "order_000001", "txn_cli_1");
    let script = script_file(&[
        json!({"op": "create_order", "actor": "tok_asha", "course": PAID_COURSE}),
        json!({"op": "verify_payment", "actor": "tok_asha", "order_handle": "order_000001",
               "transaction_id": "txn_cli_1", "signature": sig}),
    ]);
    let fixture = fixture_file();
    let config = config_file();
    let out_dir = tempdir().unwrap();
    let export = out_dir.path().join("payments.csv");

    let mut cmd = Command::new(cargo_bin!("coursemart"));
    cmd.arg(script.path())
        .arg("--fixture")
        .arg(fixture.path())
        .arg("--config")
        .arg(config.path())
        .arg("--export-payments")
        .arg(&export);
    cmd.assert().success();

    let csv = std::fs::read_to_string(&export).unwrap();
    assert!(csv.starts_with("id,user,course,amount"));
    assert!(csv.contains("5000,INR,success,order_000001,txn_cli_1"));
}

#[test]
fn test_bad_token_and_malformed_line() {
    let script = {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", json!({"op": "list_my_payments", "actor": "tok_nobody"})).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, "{}", json!({"op": "list_my_payments", "actor": "tok_asha"})).unwrap();
        file
    };
    let fixture = fixture_file();

    let mut cmd = Command::new(cargo_bin!("coursemart"));
    cmd.arg(script.path()).arg("--fixture").arg(fixture.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"status\":403"))
        .stdout(predicate::str::contains("unknown or expired access token"))
        .stdout(predicate::str::contains("\"status\":200"))
        .stderr(predicate::str::contains("Error reading request"));
}
