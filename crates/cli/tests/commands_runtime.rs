use std::env;
use std::sync::{Mutex, OnceLock};

use leadflow_cli::commands::{assign, attach, doctor, migrate, rebalance, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_database(|| {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("LEADFLOW_DATABASE_URL", "postgres://localhost/leadflow")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_database(|| {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        let first_payload = parse_payload(&first.output);
        let second_payload = parse_payload(&second.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["message"], second_payload["message"]);
        let message = first_payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("acme-realty"));
        assert!(message.contains("10 members"));
    });
}

#[test]
fn assign_places_unassigned_demo_lead() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let result = assign::run("LEAD-008", None, None);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "assign");
        assert_eq!(payload["data"]["assigned"], true);
        assert_eq!(payload["data"]["mode"], "LEADER_HIERARCHY");
        assert_eq!(payload["data"]["executive"], "EXE-002");
        assert_eq!(payload["data"]["manager"], "MGR-001");
    });
}

#[test]
fn assign_reports_unknown_lead_as_not_found() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let result = assign::run("LEAD-404", None, None);
        assert_eq!(result.exit_code, 7);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "not_found");
    });
}

#[test]
fn rebalance_reports_summary() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let result = rebalance::run("acme-realty", &[]);
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["total_leads"], 6);
        assert_eq!(payload["data"]["executive_count"], 5);
        assert_eq!(payload["data"]["updated"], 5);
    });
}

#[test]
fn attach_gives_new_hire_a_manager_once() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let first = attach::run("EXE-004");
        let second = attach::run("EXE-004");

        let first_payload = parse_payload(&first.output);
        assert_eq!(first.exit_code, 0);
        assert_eq!(first_payload["data"]["id"], "MGR-001");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second.exit_code, 0);
        assert!(second_payload.get("data").is_none());
    });
}

#[test]
fn attach_rejects_manager_as_domain_validation() {
    with_database(|| {
        assert_eq!(seed::run().exit_code, 0);

        let result = attach::run("MGR-002");

        assert_eq!(result.exit_code, 8);
        assert_eq!(parse_payload(&result.output)["error_class"], "domain_validation");
    });
}

#[test]
fn doctor_passes_after_migrate() {
    with_database(|| {
        assert_eq!(migrate::run().exit_code, 0);

        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["overall_status"], "pass", "report: {report}");
    });
}

#[test]
fn doctor_flags_unmigrated_database() {
    with_database(|| {
        let report = parse_payload(&doctor::run(true));

        assert_eq!(report["overall_status"], "fail");
        let schema = report["checks"]
            .as_array()
            .and_then(|checks| checks.iter().find(|check| check["name"] == "schema_migrations"))
            .cloned()
            .unwrap_or_default();
        assert_eq!(schema["status"], "fail");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

/// Runs `test_fn` against a fresh file-backed database.
fn with_database(test_fn: impl FnOnce()) {
    let dir = TempDir::new().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("leadflow.db").display());
    with_env(&[("LEADFLOW_DATABASE_URL", url.as_str())], test_fn);
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "LEADFLOW_DATABASE_URL",
        "LEADFLOW_DATABASE_MAX_CONNECTIONS",
        "LEADFLOW_DATABASE_TIMEOUT_SECS",
        "LEADFLOW_ASSIGNMENT_MAX_ACTIVE_LEADS",
        "MAX_ACTIVE_LEADS_PER_EXECUTIVE",
        "LEADFLOW_ASSIGNMENT_HIERARCHY_MAX_DEPTH",
        "LEADFLOW_ASSIGNMENT_ANCESTOR_MAX_HOPS",
        "LEADFLOW_LOGGING_LEVEL",
        "LEADFLOW_LOGGING_FORMAT",
        "LEADFLOW_LOG_LEVEL",
        "LEADFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
