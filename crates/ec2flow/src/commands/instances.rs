use super::{print_json, print_row};
use colored::Colorize;
use ec2flow_cloud::{
    ComputeProvider, PowerAction, ResourceGraphWalker, SnapshotWorkflow, TagFilter, WaitConfig,
    WalkDepth, WorkflowEvent, WorkflowReport, WorkflowState, WorkflowStep, run_power_action,
    select_instances,
};
use ec2flow_config::Settings;
use tokio_util::sync::CancellationToken;

pub async fn list(
    provider: &dyn ComputeProvider,
    settings: &Settings,
    filter: &TagFilter,
    json: bool,
) -> anyhow::Result<()> {
    let instances = select_instances(provider, &settings.profile, filter).await?;
    let walker = ResourceGraphWalker::new(provider);

    if json {
        return print_json(&walker.collect(&instances, WalkDepth::Instances).await);
    }

    println!("{}", "Listing EC2 Instances...".blue());
    walker
        .walk(&instances, WalkDepth::Instances, |row| print_row(&row))
        .await;
    Ok(())
}

pub async fn power(
    provider: &dyn ComputeProvider,
    settings: &Settings,
    filter: &TagFilter,
    action: PowerAction,
    wait: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<WorkflowReport> {
    let instances = select_instances(provider, &settings.profile, filter).await?;
    let wait_config = WaitConfig::default().with_timeout(settings.wait_timeout);

    let header = match action {
        PowerAction::Stop => "Stopping EC2 Instances...",
        PowerAction::Start => "Starting EC2 Instances...",
    };
    println!("{}", header.blue());

    let report = run_power_action(
        provider,
        action,
        &instances,
        wait.then_some(&wait_config),
        cancel,
        |event| match event {
            WorkflowEvent::Stopping(id) => println!("Stopping {}...", id),
            WorkflowEvent::Starting(id) => println!("Starting {}...", id),
            WorkflowEvent::Stopped(id) => println!("  {} {}", id, "stopped".green()),
            WorkflowEvent::Running(id) => println!("  {} {}", id, "running".green()),
            WorkflowEvent::Failed(failure) => {
                println!("{}", format!(" Oops: {}", failure).red())
            }
            _ => {}
        },
    )
    .await;

    print_summary(&report);
    Ok(report)
}

pub async fn snapshot(
    provider: &dyn ComputeProvider,
    settings: &Settings,
    filter: &TagFilter,
    cancel: &CancellationToken,
) -> anyhow::Result<WorkflowReport> {
    let instances = select_instances(provider, &settings.profile, filter).await?;

    println!("{}", "Creating snapshots...".blue());
    let report = SnapshotWorkflow::new(provider)
        .with_wait(WaitConfig::default().with_timeout(settings.wait_timeout))
        .with_cancellation(cancel.clone())
        .with_description(settings.snapshot_description.clone())
        .run(&instances, |event| match event {
            WorkflowEvent::Stopping(id) => println!("Stopping EC2 instance: {}...", id),
            WorkflowEvent::Snapshotting { volume_id, .. } => {
                println!("  Creating snapshot of Volume: {}...", volume_id)
            }
            WorkflowEvent::SnapshotRequested { snapshot_id, .. } => {
                println!("    {}", snapshot_id.dimmed())
            }
            WorkflowEvent::Starting(id) => println!("Now restarting EC2 instance: {}...", id),
            WorkflowEvent::Failed(failure) => {
                println!("{}", format!(" Oops: {}", failure).red())
            }
            _ => {}
        })
        .await;

    print_summary(&report);
    Ok(report)
}

/// What the operator should know about an instance left mid-workflow
fn leftover_hint(state: &WorkflowState) -> Option<&'static str> {
    match state {
        WorkflowState::Failed { at } => match at {
            WorkflowStep::Stop => None,
            WorkflowStep::WaitStopped => Some("instance may still be stopping"),
            WorkflowStep::ListVolumes | WorkflowStep::Snapshot | WorkflowStep::Start => {
                Some("instance was left stopped")
            }
            WorkflowStep::WaitRunning => Some("instance may still be starting"),
        },
        WorkflowState::Selected => Some("not attempted"),
        _ => None,
    }
}

fn summary_line(report: &WorkflowReport) -> String {
    let mut line = format!(
        "{} succeeded, {} failed",
        report.completed().count(),
        report.failed().count()
    );
    let skipped = report.skipped().count();
    if skipped > 0 {
        line.push_str(&format!(", {} not started", skipped));
    }
    line
}

fn print_summary(report: &WorkflowReport) {
    println!();
    for entry in report.instances.iter().filter(|r| !r.state.is_failed()) {
        if let Some(hint) = leftover_hint(&entry.state) {
            println!("{}", format!("  {}: {}", entry.instance_id, hint).yellow());
        }
    }
    for entry in report.failed() {
        match leftover_hint(&entry.state) {
            Some(hint) => println!(
                "{}",
                format!("  {}: {} ({})", entry.instance_id, entry.state, hint).red()
            ),
            None => println!(
                "{}",
                format!("  {}: {}", entry.instance_id, entry.state).red()
            ),
        }
    }

    let line = summary_line(report);
    if report.is_success() {
        println!("{}", format!("✓ {}", line).green().bold());
    } else {
        println!("{}", format!("✗ {}", line).yellow().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2flow_cloud::mock::{Call, MockProvider};
    use ec2flow_cloud::{CloudError, Instance, InstanceState, PROJECT_TAG_KEY, Volume};

    fn settings() -> Settings {
        Settings {
            region: Some("us-east-1".to_string()),
            ..Settings::default()
        }
    }

    fn fleet() -> MockProvider {
        MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1").with_tag(PROJECT_TAG_KEY, "alpha"))
            .with_instance(Instance::new("i-2"))
            .with_volume(Volume::new("vol-1", "i-1", 8))
            .with_volume(Volume::new("vol-2", "i-2", 8))
            .with_volume(Volume::new("vol-3", "i-2", 8))
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_command_counts() {
        let provider = fleet();
        let report = snapshot(
            &provider,
            &settings(),
            &TagFilter::all(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(report.is_success());
        assert_eq!(provider.count(|c| matches!(c, Call::Stop(_))), 2);
        assert_eq!(provider.count(|c| matches!(c, Call::Start(_))), 2);
        assert_eq!(provider.count(|c| matches!(c, Call::CreateSnapshot(_))), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_command_respects_project() {
        let provider = fleet();
        snapshot(
            &provider,
            &settings(),
            &TagFilter::project("alpha"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(provider.mutations_for("i-2").is_empty());
        assert_eq!(provider.count(|c| matches!(c, Call::CreateSnapshot(_))), 1);
    }

    #[tokio::test]
    async fn test_stop_command_reports_failures_without_erroring() {
        let provider = fleet().with_failure(
            Call::Stop("i-2".into()),
            CloudError::client("IncorrectInstanceState", "cannot stop"),
        );
        let report = power(
            &provider,
            &settings(),
            &TagFilter::all(),
            PowerAction::Stop,
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.failed().count(), 1);
        assert_eq!(summary_line(&report), "1 succeeded, 1 failed");
        assert_eq!(provider.current_state("i-1"), Some(InstanceState::Stopping));
    }

    #[tokio::test]
    async fn test_selection_failure_is_fatal() {
        let provider = fleet().with_failure(
            Call::ListInstances,
            CloudError::Authorization("UnauthorizedOperation".into()),
        );
        let err = list(&provider, &settings(), &TagFilter::all(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("IAM EC2 access policy"));
    }

    #[test]
    fn test_leftover_hints() {
        assert_eq!(
            leftover_hint(&WorkflowState::Failed {
                at: WorkflowStep::Snapshot
            }),
            Some("instance was left stopped")
        );
        assert_eq!(
            leftover_hint(&WorkflowState::Failed {
                at: WorkflowStep::Stop
            }),
            None
        );
        assert_eq!(leftover_hint(&WorkflowState::Running), None);
    }
}
