//! CLI tests for `pilot plan`, `pilot rules` and `pilot run`.
//!
//! Spawns the pilot binary and verifies exit codes and output for offline
//! planning and for a full run against a shell-script backend.

use std::process::Command;

use pilot::exit_codes;
use pilot::test_support::TestProject;
use serde_json::Value;

fn pilot(root: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pilot"));
    cmd.arg("--root").arg(root);
    cmd
}

#[test]
fn plan_dependent_goals_exits_ok() {
    let project = TestProject::new().expect("project");
    let goal_path = project
        .write_file(
            "meta.json",
            r#"{
  "meta_type": "dependent_multi",
  "goals": [
    {"goal_id": "g1", "domain": "files", "verb": "create", "object": "Reports"},
    {"goal_id": "g2", "domain": "files", "verb": "create", "object": "2024", "scope": "inside:g1"}
  ],
  "dependencies": {"1": [0]}
}"#,
        )
        .expect("write meta-goal");

    let output = pilot(project.path())
        .arg("plan")
        .arg(&goal_path)
        .output()
        .expect("pilot plan");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let result: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(result["status"], "success");
    assert_eq!(
        result["graph"]["execution_order"],
        serde_json::json!(["g0.a1", "g1.a1"])
    );
    assert_eq!(
        result["graph"]["nodes"]["g1.a1"]["args"]["location"],
        "HOME/Reports"
    );
}

#[test]
fn plan_unplannable_goal_exits_failure() {
    let project = TestProject::new().expect("project");
    let goal_path = project
        .write_file(
            "meta.json",
            r#"{"meta_type": "single", "goals": [{"goal_id": "g1", "domain": "screen", "verb": "delete"}]}"#,
        )
        .expect("write meta-goal");

    let status = pilot(project.path())
        .arg("plan")
        .arg(&goal_path)
        .status()
        .expect("pilot plan");

    assert_eq!(status.code(), Some(exit_codes::FAILURE));
}

#[test]
fn plan_rejects_invalid_file() {
    let project = TestProject::new().expect("project");
    let goal_path = project
        .write_file("meta.json", r#"{"meta_type": "single", "goals": []}"#)
        .expect("write");

    let output = pilot(project.path())
        .arg("plan")
        .arg(&goal_path)
        .output()
        .expect("pilot plan");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("schema validation failed"));
}

#[test]
fn rules_lists_every_capability() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = pilot(temp.path()).arg("rules").output().expect("pilot rules");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let rules: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(rules.as_array().map(Vec::len), Some(13));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = pilot(temp.path()).arg("init").status().expect("init");
    assert_eq!(first.code(), Some(exit_codes::OK));
    let second = pilot(temp.path()).arg("init").status().expect("init again");
    assert_eq!(second.code(), Some(exit_codes::INVALID));
    let forced = pilot(temp.path())
        .args(["init", "--force"])
        .status()
        .expect("init --force");
    assert_eq!(forced.code(), Some(exit_codes::OK));
}

/// Backend script: `$2` is the schema path, `$4` the output file.
#[cfg(unix)]
const FAKE_BACKEND: &str = r#"cat > /dev/null
case "$2" in
  *interpreter*) printf '%s' '{"goals":[{"goal_id":"g1","domain":"apps","verb":"launch","object":"slack","params":[],"scope":"root"}]}' > "$4" ;;
  *resolver*) printf '%s' '{"tool":"apps.launch","confidence":0.9,"params":[]}' > "$4" ;;
  *) printf '%s' '{"classification":"single"}' > "$4" ;;
esac
"#;

#[cfg(unix)]
fn backend_project(eligibility_deny: &[&str]) -> TestProject {
    let project = TestProject::new().expect("project");
    let mut cfg = pilot::io::config::PilotConfig::default();
    cfg.backend.command = vec![
        "sh".to_string(),
        "-c".to_string(),
        FAKE_BACKEND.to_string(),
        "sh".to_string(),
    ];
    cfg.eligibility.deny = eligibility_deny.iter().map(|s| s.to_string()).collect();
    project.write_config(&cfg).expect("write config");
    project
}

#[cfg(unix)]
#[test]
fn run_prints_summary_and_saves_goal() {
    let project = backend_project(&["shell"]);
    let goal_path = project.path().join("saved.json");

    let output = pilot(project.path())
        .args(["run", "open slack", "--save-goal"])
        .arg(&goal_path)
        .output()
        .expect("pilot run");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("status: success"));
    assert!(stdout.contains("apps.launch [g0.a1] app=slack"));

    let replay = pilot(project.path())
        .arg("plan")
        .arg(&goal_path)
        .status()
        .expect("pilot plan");
    assert_eq!(replay.code(), Some(exit_codes::OK));
}

#[cfg(unix)]
#[test]
fn run_denied_tool_exits_blocked() {
    let project = backend_project(&["apps"]);

    let output = pilot(project.path())
        .args(["run", "open slack", "--json"])
        .output()
        .expect("pilot run");

    assert_eq!(output.status.code(), Some(exit_codes::BLOCKED));
    let outcome: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(outcome["status"], "blocked");
    assert_eq!(outcome["eligibility"]["blocked"], true);
}
