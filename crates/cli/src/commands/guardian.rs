//! `forgeloop guardian` — supervise a worker process.

use forgeloop_config::{AppConfig, RestartPolicyConfig};
use forgeloop_guardian::process::CommandChild;
use forgeloop_guardian::revision::GitRevisionControl;
use forgeloop_guardian::{Guardian, RestartPolicy};
use tracing::info;

pub async fn run(config: &AppConfig, worker_command: Vec<String>) -> anyhow::Result<()> {
    let (program, args) = match worker_command.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => {
            let exe = std::env::current_exe()?;
            (exe.to_string_lossy().into_owned(), vec!["worker".into()])
        }
    };

    let policy = match config.guardian.policy {
        RestartPolicyConfig::OnCrash => RestartPolicy::OnCrash,
        RestartPolicyConfig::Always => RestartPolicy::Always,
    };

    let child = Box::new(CommandChild::new(program, args));
    let revisions = Box::new(GitRevisionControl::new(std::env::current_dir()?));

    let mut guardian = Guardian::new(child, revisions, config.guardian.marker_path.as_str())
        .with_crash_threshold(config.guardian.crash_threshold)
        .with_restart_delay(config.guardian.restart_delay())
        .with_policy(policy)
        .with_crash_log_dir(config.guardian.crash_log_dir.as_str());

    let report = guardian.run().await?;
    info!(
        restarts = report.restarts,
        rollbacks = report.rollbacks,
        "Guardian finished"
    );
    Ok(())
}
