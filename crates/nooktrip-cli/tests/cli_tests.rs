//! End-to-end tests for the `nooktrip` binary against a temporary database.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct TestEnv {
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestEnv {
    /// Fresh directory with an initialized database.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("nooktrip.db");

        nooktrip()
            .args(["init-db", "--db", db_path.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Database initialized"));

        Self {
            _temp_dir: temp_dir,
            db_path,
        }
    }

    fn invoke(&self, args: &[&str]) -> Command {
        let mut cmd = nooktrip();
        cmd.args(["invoke", "--db", self.db_path.to_str().unwrap()])
            .args(args);
        cmd
    }

    fn itinerary_id(&self) -> String {
        let output = self
            .invoke(&[
                "--method",
                "POST",
                "--path",
                "/itineraries",
                "--body",
                r#"{"destination":"Paris","startDate":"2025-06-01","endDate":"2025-06-10"}"#,
            ])
            .output()
            .expect("run nooktrip");
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).expect("utf-8 output");
        let json = stdout
            .split_once('\n')
            .map(|(_, body)| body)
            .expect("status line then body");
        let body: serde_json::Value = serde_json::from_str(json).expect("JSON body");
        body["itineraryId"].as_str().expect("itinerary id").to_string()
    }
}

fn nooktrip() -> Command {
    Command::cargo_bin("nooktrip").expect("binary exists")
}

#[test]
fn routes_lists_every_handler() {
    nooktrip()
        .arg("routes")
        .assert()
        .success()
        .stdout(predicate::str::contains("POST /itineraries"))
        .stdout(predicate::str::contains("POST /emails"))
        .stdout(predicate::str::contains("GET /feedback"));
}

#[test]
fn invoke_creates_itinerary() {
    let env = TestEnv::new();

    env.invoke(&[
        "--method",
        "POST",
        "--path",
        "/itineraries",
        "--body",
        r#"{"destination":"Paris","startDate":"2025-06-01","endDate":"2025-06-10"}"#,
    ])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("HTTP 200"))
    .stdout(predicate::str::contains("\"itineraryId\""))
    .stdout(predicate::str::contains("\"destination\": \"Paris\""));
}

#[test]
fn invoke_reports_validation_failure() {
    let env = TestEnv::new();

    env.invoke(&[
        "--method",
        "POST",
        "--path",
        "/itineraries",
        "--body",
        r#"{"destination":"Paris"}"#,
    ])
    .assert()
    .failure()
    .stdout(predicate::str::starts_with("HTTP 400"))
    .stdout(predicate::str::contains("startDate"));
}

#[test]
fn invoke_unknown_route_is_not_found() {
    let env = TestEnv::new();

    env.invoke(&["--method", "DELETE", "--path", "/itineraries"])
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("HTTP 404"))
        .stdout(predicate::str::contains("RouteNotFound"));
}

#[test]
fn feedback_round_trip() {
    let env = TestEnv::new();
    let itinerary_id = env.itinerary_id();
    let body = format!(r#"{{"itineraryId":"{}","feedback":"like"}}"#, itinerary_id);

    env.invoke(&["--method", "POST", "--path", "/feedback", "--body", &body])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"feedback\": \"like\""));

    let filter = format!("itineraryId={}", itinerary_id);
    env.invoke(&["--path", "/feedback", "--query", &filter])
        .assert()
        .success()
        .stdout(predicate::str::contains(itinerary_id.as_str()));
}

#[test]
fn email_uses_dry_run_transport() {
    let env = TestEnv::new();
    let body = r#"{
        "to": "traveler@example.com",
        "itinerary": {
            "packageName": "Paris in a Day",
            "stops": [
                {"locationName": "Louvre", "googleMapCoordinates": "48.8606,2.3376"}
            ]
        }
    }"#;

    env.invoke(&["--method", "POST", "--path", "/emails", "--body", body])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"sent\""))
        .stdout(predicate::str::contains("dry-run-"));
}

#[test]
fn unopenable_database_is_service_unavailable() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let db_path = temp_dir.path().join("missing").join("nooktrip.db");

    nooktrip()
        .args(["invoke", "--db", db_path.to_str().unwrap(), "--path", "/feedback"])
        .assert()
        .failure()
        .stdout(predicate::str::starts_with("HTTP 503"));
}
