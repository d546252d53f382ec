//! Lifecycle workflows: stop → snapshot → start, and bulk stop/start
//!
//! Every provider call goes through [`isolate`], so a failure on one
//! instance halts only that instance's workflow. Nothing is rolled back: an
//! instance that failed after being stopped stays stopped, and the report
//! says so.

use crate::isolate::{IsolatedFailure, isolate};
use crate::model::{DEFAULT_SNAPSHOT_DESCRIPTION, Instance, InstanceState};
use crate::provider::ComputeProvider;
use crate::wait::{WaitConfig, wait_for_instance_state};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One provider interaction within a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStep {
    Stop,
    WaitStopped,
    ListVolumes,
    Snapshot,
    Start,
    WaitRunning,
}

impl WorkflowStep {
    /// Verb phrase used in diagnostics ("can't {label} {resource}")
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowStep::Stop => "stop",
            WorkflowStep::WaitStopped => "confirm stopped",
            WorkflowStep::ListVolumes => "list volumes of",
            WorkflowStep::Snapshot => "snapshot",
            WorkflowStep::Start => "start",
            WorkflowStep::WaitRunning => "confirm running",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an instance got to.
///
/// `Selected` → `Stopping` → `Stopped` → `Snapshotting` → `Starting` →
/// `Running`, or `Failed` at any step. `Selected` at the end of a run means
/// the instance was never touched (the run was cancelled first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowState {
    Selected,
    Stopping,
    Stopped,
    Snapshotting,
    Starting,
    Running,
    Failed { at: WorkflowStep },
}

impl WorkflowState {
    pub fn is_failed(&self) -> bool {
        matches!(self, WorkflowState::Failed { .. })
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Selected => f.write_str("not started"),
            WorkflowState::Stopping => f.write_str("stopping"),
            WorkflowState::Stopped => f.write_str("stopped"),
            WorkflowState::Snapshotting => f.write_str("snapshotting"),
            WorkflowState::Starting => f.write_str("starting"),
            WorkflowState::Running => f.write_str("running"),
            WorkflowState::Failed { at } => write!(f, "failed at '{}'", at),
        }
    }
}

/// Progress notifications, in the order they happen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkflowEvent<'a> {
    Stopping(&'a str),
    Stopped(&'a str),
    Snapshotting {
        instance_id: &'a str,
        volume_id: &'a str,
    },
    SnapshotRequested {
        volume_id: &'a str,
        snapshot_id: &'a str,
    },
    Starting(&'a str),
    Running(&'a str),
    Failed(&'a IsolatedFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRequest {
    pub volume_id: String,
    pub snapshot_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceReport {
    pub instance_id: String,
    pub state: WorkflowState,
    pub snapshots: Vec<SnapshotRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<IsolatedFailure>,
}

impl InstanceReport {
    fn new(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            state: WorkflowState::Selected,
            snapshots: Vec::new(),
            failure: None,
        }
    }
}

/// Per-instance results of a workflow run, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub instances: Vec<InstanceReport>,
}

impl WorkflowReport {
    pub fn failed(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|r| r.state.is_failed())
    }

    /// Instances whose workflow ran to the end
    pub fn completed(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances
            .iter()
            .filter(|r| !r.state.is_failed() && r.state != WorkflowState::Selected)
    }

    /// Instances never touched because the run was cancelled
    pub fn skipped(&self) -> impl Iterator<Item = &InstanceReport> {
        self.instances.iter().filter(|r| r.state == WorkflowState::Selected)
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none() && self.skipped().next().is_none()
    }
}

struct StepFailure {
    step: WorkflowStep,
    failure: IsolatedFailure,
}

async fn step<T, Fut>(resource_id: &str, step: WorkflowStep, call: Fut) -> Result<T, StepFailure>
where
    Fut: Future<Output = crate::error::Result<T>>,
{
    isolate(resource_id, step.label(), call)
        .await
        .into_result()
        .map_err(|failure| StepFailure { step, failure })
}

fn fail<F>(report: &mut InstanceReport, failed: StepFailure, observer: &mut F)
where
    F: FnMut(&WorkflowEvent<'_>),
{
    observer(&WorkflowEvent::Failed(&failed.failure));
    warn!(
        instance_id = %report.instance_id,
        step = %failed.step,
        previous = %report.state,
        "Workflow halted"
    );
    report.state = WorkflowState::Failed { at: failed.step };
    report.failure = Some(failed.failure);
}

/// Stop every instance, snapshot each attached volume, start it again.
///
/// Instances are processed one at a time in the order given; each goes
/// through stop, wait-stopped, snapshot of every currently attached volume,
/// start and wait-running. Snapshot creation is not awaited.
pub struct SnapshotWorkflow<'a> {
    provider: &'a dyn ComputeProvider,
    wait: WaitConfig,
    cancel: CancellationToken,
    description: String,
}

impl<'a> SnapshotWorkflow<'a> {
    pub fn new(provider: &'a dyn ComputeProvider) -> Self {
        Self {
            provider,
            wait: WaitConfig::default(),
            cancel: CancellationToken::new(),
            description: DEFAULT_SNAPSHOT_DESCRIPTION.to_string(),
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub async fn run<F>(&self, instances: &[Instance], mut observer: F) -> WorkflowReport
    where
        F: FnMut(&WorkflowEvent<'_>),
    {
        let mut report = WorkflowReport::default();

        for instance in instances {
            let mut entry = InstanceReport::new(&instance.id);
            if self.cancel.is_cancelled() {
                report.instances.push(entry);
                continue;
            }

            if let Err(failed) = self.snapshot_one(instance, &mut entry, &mut observer).await {
                fail(&mut entry, failed, &mut observer);
            } else {
                info!(
                    instance_id = %instance.id,
                    snapshots = entry.snapshots.len(),
                    "Snapshot workflow complete"
                );
            }
            report.instances.push(entry);
        }

        report
    }

    async fn snapshot_one<F>(
        &self,
        instance: &Instance,
        report: &mut InstanceReport,
        observer: &mut F,
    ) -> Result<(), StepFailure>
    where
        F: FnMut(&WorkflowEvent<'_>),
    {
        let id = instance.id.as_str();

        observer(&WorkflowEvent::Stopping(id));
        report.state = WorkflowState::Stopping;
        step(id, WorkflowStep::Stop, self.provider.stop_instance(id)).await?;
        step(
            id,
            WorkflowStep::WaitStopped,
            wait_for_instance_state(
                self.provider,
                id,
                InstanceState::Stopped,
                &self.wait,
                &self.cancel,
            ),
        )
        .await?;
        report.state = WorkflowState::Stopped;
        observer(&WorkflowEvent::Stopped(id));

        let volumes = step(id, WorkflowStep::ListVolumes, self.provider.list_volumes(id)).await?;
        report.state = WorkflowState::Snapshotting;
        for volume in &volumes {
            observer(&WorkflowEvent::Snapshotting {
                instance_id: id,
                volume_id: &volume.id,
            });
            let snapshot_id = step(
                &volume.id,
                WorkflowStep::Snapshot,
                self.provider.create_snapshot(&volume.id, &self.description),
            )
            .await?;
            observer(&WorkflowEvent::SnapshotRequested {
                volume_id: &volume.id,
                snapshot_id: &snapshot_id,
            });
            report.snapshots.push(SnapshotRequest {
                volume_id: volume.id.clone(),
                snapshot_id,
            });
        }

        observer(&WorkflowEvent::Starting(id));
        report.state = WorkflowState::Starting;
        step(id, WorkflowStep::Start, self.provider.start_instance(id)).await?;
        step(
            id,
            WorkflowStep::WaitRunning,
            wait_for_instance_state(
                self.provider,
                id,
                InstanceState::Running,
                &self.wait,
                &self.cancel,
            ),
        )
        .await?;
        report.state = WorkflowState::Running;
        observer(&WorkflowEvent::Running(id));

        Ok(())
    }
}

/// Power action applied to every selected instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Stop,
    Start,
}

/// Stop or start every instance, optionally waiting for each to settle.
///
/// Without a wait config the request is fire-and-forget and the report
/// shows `Stopping`/`Starting`.
pub async fn run_power_action<F>(
    provider: &dyn ComputeProvider,
    action: PowerAction,
    instances: &[Instance],
    wait: Option<&WaitConfig>,
    cancel: &CancellationToken,
    mut observer: F,
) -> WorkflowReport
where
    F: FnMut(&WorkflowEvent<'_>),
{
    let mut report = WorkflowReport::default();

    for instance in instances {
        let id = instance.id.as_str();
        let mut entry = InstanceReport::new(id);
        if cancel.is_cancelled() {
            report.instances.push(entry);
            continue;
        }

        let result = match action {
            PowerAction::Stop => {
                observer(&WorkflowEvent::Stopping(id));
                entry.state = WorkflowState::Stopping;
                power_step(provider, id, WorkflowStep::Stop, wait, cancel, &mut entry).await
            }
            PowerAction::Start => {
                observer(&WorkflowEvent::Starting(id));
                entry.state = WorkflowState::Starting;
                power_step(provider, id, WorkflowStep::Start, wait, cancel, &mut entry).await
            }
        };

        match result {
            Ok(()) => match entry.state {
                WorkflowState::Stopped => observer(&WorkflowEvent::Stopped(id)),
                WorkflowState::Running => observer(&WorkflowEvent::Running(id)),
                _ => {}
            },
            Err(failed) => fail(&mut entry, failed, &mut observer),
        }
        report.instances.push(entry);
    }

    report
}

async fn power_step(
    provider: &dyn ComputeProvider,
    id: &str,
    request: WorkflowStep,
    wait: Option<&WaitConfig>,
    cancel: &CancellationToken,
    entry: &mut InstanceReport,
) -> Result<(), StepFailure> {
    let (wait_step, target, settled) = match request {
        WorkflowStep::Stop => {
            step(id, request, provider.stop_instance(id)).await?;
            (WorkflowStep::WaitStopped, InstanceState::Stopped, WorkflowState::Stopped)
        }
        _ => {
            step(id, request, provider.start_instance(id)).await?;
            (WorkflowStep::WaitRunning, InstanceState::Running, WorkflowState::Running)
        }
    };

    if let Some(config) = wait {
        step(
            id,
            wait_step,
            wait_for_instance_state(provider, id, target, config, cancel),
        )
        .await?;
        entry.state = settled;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloudError;
    use crate::filter::TagFilter;
    use crate::mock::{Call, MockProvider};
    use crate::model::Volume;
    use std::time::Duration;

    fn two_instances() -> MockProvider {
        MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1"))
            .with_instance(Instance::new("i-2"))
            .with_volume(Volume::new("vol-1", "i-1", 8))
            .with_volume(Volume::new("vol-2", "i-2", 8))
            .with_volume(Volume::new("vol-3", "i-2", 50))
    }

    async fn all(p: &MockProvider) -> Vec<Instance> {
        p.list_instances(&TagFilter::all()).await.unwrap()
    }

    fn stops(p: &MockProvider) -> usize {
        p.count(|c| matches!(c, Call::Stop(_)))
    }

    fn starts(p: &MockProvider) -> usize {
        p.count(|c| matches!(c, Call::Start(_)))
    }

    fn creates(p: &MockProvider) -> usize {
        p.count(|c| matches!(c, Call::CreateSnapshot(_)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_stop_and_start_per_instance_one_snapshot_per_volume() {
        let p = two_instances();
        let report = SnapshotWorkflow::new(&p).run(&all(&p).await, |_| {}).await;

        assert_eq!(stops(&p), 2);
        assert_eq!(starts(&p), 2);
        assert_eq!(creates(&p), 3);
        assert_eq!(report.completed().count(), 2);
        assert!(report.is_success());
        assert_eq!(report.instances[1].snapshots.len(), 2);
        assert_eq!(p.current_state("i-1"), Some(InstanceState::Running));
        assert_eq!(p.current_state("i-2"), Some(InstanceState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshots_carry_the_label() {
        let p = two_instances();
        SnapshotWorkflow::new(&p)
            .with_description("nightly")
            .run(&all(&p).await, |_| {})
            .await;

        let labels: Vec<_> = p.snapshots().into_iter().map(|s| s.description).collect();
        assert_eq!(labels, vec!["nightly"; 3]);

        let p = two_instances();
        SnapshotWorkflow::new(&p).run(&all(&p).await, |_| {}).await;
        assert!(
            p.snapshots()
                .iter()
                .all(|s| s.description == DEFAULT_SNAPSHOT_DESCRIPTION)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_failure_is_isolated_to_that_instance() {
        let p = two_instances().with_failure(
            Call::Stop("i-2".into()),
            CloudError::client(
                "IncorrectInstanceState",
                "This instance 'i-2' is not in a state from which it can be stopped.",
            ),
        );

        let mut diagnostics = Vec::new();
        let report = SnapshotWorkflow::new(&p)
            .run(&all(&p).await, |event| {
                if let WorkflowEvent::Failed(failure) = event {
                    diagnostics.push(failure.to_string());
                }
            })
            .await;

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("i-2"));

        assert_eq!(report.instances[0].state, WorkflowState::Running);
        assert_eq!(
            report.instances[1].state,
            WorkflowState::Failed {
                at: WorkflowStep::Stop
            }
        );
        assert_eq!(p.mutations_for("i-2"), vec![Call::Stop("i-2".into())]);
        assert_eq!(creates(&p), 1);
        assert!(!report.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_instance_does_not_affect_the_next() {
        let p = two_instances().with_failure(
            Call::Stop("i-1".into()),
            CloudError::Transport("connection reset".into()),
        );
        let report = SnapshotWorkflow::new(&p).run(&all(&p).await, |_| {}).await;

        assert_eq!(p.mutations_for("i-1"), vec![Call::Stop("i-1".into())]);
        assert_eq!(
            p.mutations_for("i-2"),
            vec![Call::Stop("i-2".into()), Call::Start("i-2".into())]
        );
        assert_eq!(report.failed().count(), 1);
        assert_eq!(report.completed().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_failure_leaves_instance_stopped() {
        let p = two_instances().with_failure(
            Call::CreateSnapshot("vol-2".into()),
            CloudError::client("SnapshotLimitExceeded", "limit reached"),
        );
        let report = SnapshotWorkflow::new(&p).run(&all(&p).await, |_| {}).await;

        let failed = &report.instances[1];
        assert_eq!(
            failed.state,
            WorkflowState::Failed {
                at: WorkflowStep::Snapshot
            }
        );
        assert_eq!(
            failed.failure.as_ref().map(|f| f.resource_id.as_str()),
            Some("vol-2")
        );
        assert!(!p.calls().contains(&Call::CreateSnapshot("vol-3".into())));
        assert!(!p.calls().contains(&Call::Start("i-2".into())));
        assert_eq!(p.current_state("i-2"), Some(InstanceState::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_halts_before_snapshots() {
        let p = two_instances().with_stuck_instance("i-1");
        let report = SnapshotWorkflow::new(&p)
            .with_wait(WaitConfig::default().with_timeout(Duration::from_secs(20)))
            .run(&all(&p).await, |_| {})
            .await;

        assert_eq!(
            report.instances[0].state,
            WorkflowState::Failed {
                at: WorkflowStep::WaitStopped
            }
        );
        assert!(matches!(
            report.instances[0].failure.as_ref().map(|f| &f.error),
            Some(CloudError::Timeout(_))
        ));
        assert_eq!(report.instances[1].state, WorkflowState::Running);
        assert_eq!(creates(&p), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_skips_remaining_instances() {
        let p = two_instances();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = SnapshotWorkflow::new(&p)
            .with_cancellation(cancel)
            .run(&all(&p).await, |_| {})
            .await;

        assert_eq!(report.skipped().count(), 2);
        assert!(p.calls().iter().all(|c| !c.is_mutation()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_wait_fails_current_and_skips_rest() {
        let p = two_instances().with_stuck_instance("i-1");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = SnapshotWorkflow::new(&p)
            .with_cancellation(cancel)
            .run(&all(&p).await, |_| {})
            .await;

        assert_eq!(
            report.instances[0].state,
            WorkflowState::Failed {
                at: WorkflowStep::WaitStopped
            }
        );
        assert!(matches!(
            report.instances[0].failure.as_ref().map(|f| &f.error),
            Some(CloudError::Cancelled(_))
        ));
        assert_eq!(report.instances[1].state, WorkflowState::Selected);
        assert_eq!(report.skipped().count(), 1);
        assert!(p.mutations_for("i-2").is_empty());
        assert_eq!(creates(&p), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_stop_tells_operator_to_check_policy() {
        let p = two_instances()
            .with_failure(
                Call::Stop("i-1".into()),
                CloudError::Authorization("UnauthorizedOperation".into()),
            )
            .with_failure(
                Call::Stop("i-2".into()),
                CloudError::Authorization("UnauthorizedOperation".into()),
            );

        let mut diagnostics = Vec::new();
        let report = SnapshotWorkflow::new(&p)
            .run(&all(&p).await, |event| {
                if let WorkflowEvent::Failed(failure) = event {
                    diagnostics.push(failure.to_string());
                }
            })
            .await;

        assert_eq!(report.failed().count(), 2);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics[0].starts_with("can't stop i-1."));
        assert!(
            diagnostics
                .iter()
                .all(|d| d.contains("Check the IAM EC2 access policy"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_the_workflow_order() {
        let p = MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1"))
            .with_volume(Volume::new("vol-1", "i-1", 8));

        let mut events = Vec::new();
        SnapshotWorkflow::new(&p)
            .run(&all(&p).await, |event| {
                events.push(match event {
                    WorkflowEvent::Stopping(id) => format!("stopping {id}"),
                    WorkflowEvent::Stopped(id) => format!("stopped {id}"),
                    WorkflowEvent::Snapshotting { volume_id, .. } => {
                        format!("snapshotting {volume_id}")
                    }
                    WorkflowEvent::SnapshotRequested { snapshot_id, .. } => {
                        format!("requested {snapshot_id}")
                    }
                    WorkflowEvent::Starting(id) => format!("starting {id}"),
                    WorkflowEvent::Running(id) => format!("running {id}"),
                    WorkflowEvent::Failed(f) => format!("failed {}", f.resource_id),
                })
            })
            .await;

        assert_eq!(
            events,
            vec![
                "stopping i-1",
                "stopped i-1",
                "snapshotting vol-1",
                "requested snap-0001",
                "starting i-1",
                "running i-1",
            ]
        );
    }

    #[tokio::test]
    async fn test_bulk_stop_without_wait() {
        let p = two_instances();
        let report = run_power_action(
            &p,
            PowerAction::Stop,
            &all(&p).await,
            None,
            &CancellationToken::new(),
            |_| {},
        )
        .await;

        assert_eq!(stops(&p), 2);
        assert_eq!(p.count(|c| matches!(c, Call::InstanceState(_))), 0);
        assert!(
            report
                .instances
                .iter()
                .all(|r| r.state == WorkflowState::Stopping)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_start_with_wait_isolates_failures() {
        let p = MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1").with_state(InstanceState::Stopped))
            .with_instance(Instance::new("i-2").with_state(InstanceState::Stopped))
            .with_failure(
                Call::Start("i-1".into()),
                CloudError::client("InsufficientInstanceCapacity", "no capacity"),
            );

        let report = run_power_action(
            &p,
            PowerAction::Start,
            &all(&p).await,
            Some(&WaitConfig::default()),
            &CancellationToken::new(),
            |_| {},
        )
        .await;

        assert_eq!(
            report.instances[0].state,
            WorkflowState::Failed {
                at: WorkflowStep::Start
            }
        );
        assert_eq!(report.instances[1].state, WorkflowState::Running);
        assert_eq!(p.current_state("i-2"), Some(InstanceState::Running));
    }
}
