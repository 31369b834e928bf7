use super::*;
use crate::ConfigLoader;

fn config(content: &str) -> Config {
    ConfigLoader::load_str(content).unwrap()
}

const VALID: &str = r#"
    [[jobs]]
    name = "scraper"
    schedule = "0 8 * * *"
    command = "python scraper.py"
    on_success = "processor"

    [[jobs]]
    name = "processor"
    schedule = "0 9 * * *"
    command = "python process.py"

    [[jobs]]
    name = "cleanup"
    schedule = "0 3 * * *"
    [jobs.sweep]
    max_age_days = 30
"#;

#[test]
fn test_validate_valid_config() {
    let result = ConfigValidator::validate(&config(VALID));
    assert!(result.is_valid(), "{:?}", result.errors);
}

#[test]
fn test_validate_empty_config_warns() {
    let result = ConfigValidator::validate(&Config::default());
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "jobs"));
}

#[test]
fn test_validate_duplicate_names() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "scraper"
        schedule = "0 8 * * *"
        command = "a"

        [[jobs]]
        name = "scraper"
        schedule = "0 9 * * *"
        command = "b"
    "#,
    ));
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.message.contains("Duplicate")));
}

#[test]
fn test_validate_reserved_name() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "cronhands"
        schedule = "0 8 * * *"
        command = "a"
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].name"));
}

#[test]
fn test_validate_schedule_field_count() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "scraper"
        schedule = "0 0 8 * * *"
        command = "a"
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].schedule"));
}

#[test]
fn test_validate_unknown_on_success() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "scraper"
        schedule = "0 8 * * *"
        command = "a"
        on_success = "missing"
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].on_success"));
}

#[test]
fn test_validate_self_chain() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "scraper"
        schedule = "0 8 * * *"
        command = "a"
        on_success = "scraper"
    "#,
    ));
    assert!(!result.is_valid());
}

#[test]
fn test_validate_command_and_sweep() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "both"
        schedule = "0 8 * * *"
        command = "a"
        [jobs.sweep]
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0]"));

    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "neither"
        schedule = "0 8 * * *"
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0]"));
}

#[test]
fn test_validate_sweep_values() {
    let result = ConfigValidator::validate(&config(
        r#"
        [[jobs]]
        name = "cleanup"
        schedule = "0 3 * * *"
        [jobs.sweep]
        max_age_days = 0
        patterns = ["../*.log"]
    "#,
    ));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].sweep.max_age_days"));
    assert!(result.errors.iter().any(|e| e.path == "jobs[0].sweep.patterns"));
}

#[test]
fn test_validate_unknown_health_job() {
    let mut cfg = config(VALID);
    cfg.health.job = Some("nope".to_string());
    let result = ConfigValidator::validate(&cfg);
    assert!(result.errors.iter().any(|e| e.path == "health.job"));
}

#[test]
fn test_validate_zero_max_sleep() {
    let mut cfg = config(VALID);
    cfg.daemon.max_sleep_secs = 0;
    let result = ConfigValidator::validate(&cfg);
    assert!(result.errors.iter().any(|e| e.path == "daemon.max_sleep_secs"));
}

#[test]
fn test_error_display() {
    let err = ValidationError::new("jobs[0].name", "bad");
    assert_eq!(err.to_string(), "jobs[0].name: bad");
}
