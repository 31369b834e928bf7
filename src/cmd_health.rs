//! `cronhands health`: liveness probe for the container runtime.

use std::process::ExitCode;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use cronhands_config::Config;
use cronhands_daemon::LivenessProbe;

/// Exit 0 when healthy (or starting), 1 otherwise. A probe error or timeout
/// counts as unhealthy.
pub(crate) async fn handle_health(config: Config, timeout: u64, as_json: bool) -> anyhow::Result<ExitCode> {
    let probe = LivenessProbe::from_config(&config);

    let report = match probe
        .check_with_timeout(Utc::now(), Duration::from_secs(timeout))
        .await
    {
        Ok(report) => report,
        Err(e) => {
            if as_json {
                println!("{}", json!({ "status": "unhealthy", "reason": e.to_string() }));
            } else {
                println!("unhealthy: {}", e);
            }
            return Ok(ExitCode::FAILURE);
        }
    };

    if as_json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("{}", report);
    }

    Ok(if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
