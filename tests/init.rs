use std::process::Command;

fn prpilot(dir: &std::path::Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_prpilot"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["init"]);
    assert!(
        output.status.success(),
        "prpilot init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".prpilot.toml");
    assert!(config_path.exists(), ".prpilot.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    for section in ["[github]", "[llm]", "[sheets]", "[store]", "[server]", "[workflow]"] {
        assert!(content.contains(section), "missing {section}");
    }

    let _raw: toml::Value = toml::from_str(&content).unwrap();
    let config = prpilot_core::PrPilotConfig::from_toml(&content).unwrap();
    assert_eq!(config.github.base_branch, "main");
    assert_eq!(config.server.port, 8000);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".prpilot.toml"), "# existing").unwrap();

    let output = prpilot(dir.path(), &["init"]);
    assert!(!output.status.success());
    assert_eq!(
        std::fs::read_to_string(dir.path().join(".prpilot.toml")).unwrap(),
        "# existing"
    );
}

#[test]
fn no_command_prints_welcome() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["--color", "never"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("prpilot v"));
    assert!(stdout.contains("review-prs"));
}

#[test]
fn review_prs_needs_a_target() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["review-prs"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Nothing to review"));
}

#[test]
fn unknown_review_action_is_rejected_by_the_parser() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["submit-review", "-n", "1", "--action", "merge"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown review action"));
}

#[test]
fn completions_are_generated() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["completions", "bash"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("prpilot"));
}

#[test]
fn create_pr_help_explains_auto_merge_condition() {
    let dir = tempfile::tempdir().unwrap();

    let output = prpilot(dir.path(), &["create-pr", "--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("only when no reviewers are requested"));
    assert!(stdout.contains("never merged automatically"));
}
