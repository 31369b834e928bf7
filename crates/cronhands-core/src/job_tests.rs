use super::*;

#[test]
fn test_validate_job_name_ok() {
    assert!(validate_job_name("scraper").is_ok());
    assert!(validate_job_name("log-cleanup_2").is_ok());
}

#[test]
fn test_validate_job_name_rejects_bad_chars() {
    assert!(validate_job_name("").is_err());
    assert!(validate_job_name("has space").is_err());
    assert!(validate_job_name("../escape").is_err());
    assert!(validate_job_name("glob*").is_err());
}

#[test]
fn test_validate_job_name_reserved() {
    let err = validate_job_name(RESERVED_JOB_NAME).unwrap_err();
    assert!(err.to_string().contains("reserved"));
}

#[test]
fn test_command_job() {
    let job = ScheduledJob::command("scraper", "0 8 * * *", "python scraper.py", "/app")
        .with_env("HEADLESS", "1")
        .with_timeout(Duration::from_secs(600))
        .with_on_success("processor");

    assert!(job.is_command());
    assert_eq!(job.command_line(), Some("python scraper.py"));
    assert_eq!(job.working_dir, PathBuf::from("/app"));
    assert_eq!(job.env.get("HEADLESS").map(String::as_str), Some("1"));
    assert_eq!(job.timeout(), Some(Duration::from_secs(600)));
    assert_eq!(job.on_success.as_deref(), Some("processor"));
}

#[test]
fn test_sweep_job_uses_policy_directory() {
    let policy = RetentionPolicy::for_job_logs("/app/logs", ["scraper"], Duration::from_secs(86400));
    let job = ScheduledJob::sweep("cleanup", "0 3 * * *", policy);

    assert!(!job.is_command());
    assert!(job.command_line().is_none());
    assert_eq!(job.working_dir, PathBuf::from("/app/logs"));
    assert!(job.timeout().is_none());
}

#[test]
fn test_policy_for_job_logs() {
    let policy = RetentionPolicy::for_job_logs(
        "/logs",
        ["scraper", "processor"],
        Duration::from_secs(30 * 86400),
    )
    .with_pattern("promo_*")
    .with_include_dirs(true);

    assert_eq!(
        policy.patterns,
        vec!["scraper_*.log", "processor_*.log", "promo_*"]
    );
    assert_eq!(policy.max_age(), Duration::from_secs(30 * 86400));
    assert!(policy.include_dirs);
}

#[test]
fn test_job_serialization_roundtrip() {
    let job = ScheduledJob::command("scraper", "0 8 * * *", "./run.sh", "/app");
    let json = serde_json::to_string(&job).unwrap();
    assert!(json.contains("\"kind\":\"command\""));

    let parsed: ScheduledJob = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, job);
}
