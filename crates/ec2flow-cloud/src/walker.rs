//! Instance → volume → snapshot traversal producing flat listing rows

use crate::isolate::{Outcome, isolate};
use crate::model::{Instance, NO_PROJECT, Snapshot, SnapshotState, Volume};
use crate::provider::ComputeProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many snapshots to report per volume.
///
/// Snapshots come back in provider order. `FirstCompleted` reports them up
/// to and including the first one in `completed` state and skips the rest
/// of that volume, which gives "latest good snapshot" output when the
/// provider lists newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotPolicy {
    #[default]
    All,
    FirstCompleted,
}

/// How deep the walk goes; only rows of that level are emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDepth {
    Instances,
    Volumes,
    Snapshots,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRow {
    pub id: String,
    pub instance_type: String,
    pub availability_zone: String,
    pub state: String,
    /// Empty when the instance has no public address
    pub public_address: String,
    /// `Project` tag value, or [`NO_PROJECT`]
    pub project: String,
}

impl From<&Instance> for InstanceRow {
    fn from(i: &Instance) -> Self {
        Self {
            id: i.id.clone(),
            instance_type: i.instance_type.clone(),
            availability_zone: i.availability_zone.clone(),
            state: i.state.to_string(),
            public_address: i.public_address.clone().unwrap_or_default(),
            project: i.project().unwrap_or(NO_PROJECT).to_string(),
        }
    }
}

impl fmt::Display for InstanceRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.id,
            self.instance_type,
            self.availability_zone,
            self.state,
            self.public_address,
            self.project
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeRow {
    pub id: String,
    pub instance_id: String,
    pub state: String,
    pub size_gib: i32,
    pub encrypted: bool,
}

impl VolumeRow {
    fn new(volume: &Volume, instance: &Instance) -> Self {
        Self {
            id: volume.id.clone(),
            instance_id: instance.id.clone(),
            state: volume.state.to_string(),
            size_gib: volume.size_gib,
            encrypted: volume.encrypted,
        }
    }
}

impl fmt::Display for VolumeRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}GiB, {}",
            self.id,
            self.instance_id,
            self.state,
            self.size_gib,
            if self.encrypted {
                "Encrypted"
            } else {
                "Not Encrypted"
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRow {
    pub id: String,
    pub volume_id: String,
    pub instance_id: String,
    pub state: String,
    pub progress: String,
    pub start_time: Option<DateTime<Utc>>,
}

impl SnapshotRow {
    fn new(snapshot: &Snapshot, volume: &Volume, instance: &Instance) -> Self {
        Self {
            id: snapshot.id.clone(),
            volume_id: volume.id.clone(),
            instance_id: instance.id.clone(),
            state: snapshot.state.to_string(),
            progress: snapshot.progress.clone(),
            start_time: snapshot.start_time,
        }
    }

    /// Start time in the locale's date-time representation
    pub fn formatted_start_time(&self) -> String {
        self.start_time
            .map(|t| t.format("%c").to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}

impl fmt::Display for SnapshotRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}, {}, {}",
            self.id,
            self.volume_id,
            self.instance_id,
            self.state,
            self.progress,
            self.formatted_start_time()
        )
    }
}

/// One emitted listing row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Row {
    Instance(InstanceRow),
    Volume(VolumeRow),
    Snapshot(SnapshotRow),
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Instance(r) => r.fmt(f),
            Row::Volume(r) => r.fmt(f),
            Row::Snapshot(r) => r.fmt(f),
        }
    }
}

/// Walks the owns-relationship of a set of instances.
///
/// Rows are handed to the sink in discovery order, exactly as the provider
/// returned them. A failed nested listing (volumes of one instance,
/// snapshots of one volume) becomes an isolated row and the walk carries on
/// with the next sibling. The walk is read-only.
pub struct ResourceGraphWalker<'a> {
    provider: &'a dyn ComputeProvider,
    snapshot_policy: SnapshotPolicy,
}

impl<'a> ResourceGraphWalker<'a> {
    pub fn new(provider: &'a dyn ComputeProvider) -> Self {
        Self {
            provider,
            snapshot_policy: SnapshotPolicy::default(),
        }
    }

    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    pub async fn walk<F>(&self, instances: &[Instance], depth: WalkDepth, mut sink: F)
    where
        F: FnMut(Outcome<Row>),
    {
        for instance in instances {
            if depth == WalkDepth::Instances {
                sink(Outcome::Ok(Row::Instance(InstanceRow::from(instance))));
                continue;
            }

            let volumes = match isolate(
                &instance.id,
                "list volumes of",
                self.provider.list_volumes(&instance.id),
            )
            .await
            {
                Outcome::Ok(volumes) => volumes,
                Outcome::Isolated(failure) => {
                    sink(Outcome::Isolated(failure));
                    continue;
                }
            };

            for volume in &volumes {
                if depth == WalkDepth::Volumes {
                    sink(Outcome::Ok(Row::Volume(VolumeRow::new(volume, instance))));
                    continue;
                }
                self.walk_snapshots(volume, instance, &mut sink).await;
            }
        }
    }

    async fn walk_snapshots<F>(&self, volume: &Volume, instance: &Instance, sink: &mut F)
    where
        F: FnMut(Outcome<Row>),
    {
        let snapshots = match isolate(
            &volume.id,
            "list snapshots of",
            self.provider.list_snapshots(&volume.id),
        )
        .await
        {
            Outcome::Ok(snapshots) => snapshots,
            Outcome::Isolated(failure) => {
                sink(Outcome::Isolated(failure));
                return;
            }
        };

        for snapshot in &snapshots {
            sink(Outcome::Ok(Row::Snapshot(SnapshotRow::new(
                snapshot, volume, instance,
            ))));
            if self.snapshot_policy == SnapshotPolicy::FirstCompleted
                && snapshot.state == SnapshotState::Completed
            {
                break;
            }
        }
    }

    /// Collect a walk into a vector
    pub async fn collect(&self, instances: &[Instance], depth: WalkDepth) -> Vec<Outcome<Row>> {
        let mut rows = Vec::new();
        self.walk(instances, depth, |row| rows.push(row)).await;
        rows
    }
}
