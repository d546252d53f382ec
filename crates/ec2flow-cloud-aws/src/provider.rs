//! EC2 implementation of [`ComputeProvider`]

use crate::context::AwsContext;
use crate::error::from_sdk_error;
use async_trait::async_trait;
use aws_sdk_ec2::types::{self as ec2, Filter};
use chrono::{DateTime, Utc};
use ec2flow_cloud::{
    CloudError, ComputeProvider, Instance, InstanceState, ProviderFactory, Result, Snapshot,
    SnapshotState, TagFilter, Volume, VolumeState,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Region-scoped EC2 client
pub struct Ec2Provider {
    client: aws_sdk_ec2::Client,
    region: String,
}

impl Ec2Provider {
    pub fn new(context: &AwsContext) -> Self {
        Self {
            client: context.ec2_client(),
            region: context.region().to_string(),
        }
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    fn region(&self) -> &str {
        &self.region
    }

    async fn list_instances(&self, filter: &TagFilter) -> Result<Vec<Instance>> {
        let mut request = self.client.describe_instances();
        if let Some((name, value)) = filter.tag_query() {
            request = request.filters(Filter::builder().name(name).values(value).build());
        }

        let mut pages = request.into_paginator().send();
        let mut instances = Vec::new();
        while let Some(page) = pages.try_next().await.map_err(from_sdk_error)? {
            for reservation in page.reservations() {
                instances.extend(reservation.instances().iter().map(convert_instance));
            }
        }

        debug!(region = %self.region, count = instances.len(), "Described instances");
        Ok(instances)
    }

    async fn list_volumes(&self, instance_id: &str) -> Result<Vec<Volume>> {
        let mut pages = self
            .client
            .describe_volumes()
            .filters(
                Filter::builder()
                    .name("attachment.instance-id")
                    .values(instance_id)
                    .build(),
            )
            .into_paginator()
            .send();

        let mut volumes = Vec::new();
        while let Some(page) = pages.try_next().await.map_err(from_sdk_error)? {
            volumes.extend(page.volumes().iter().map(|v| convert_volume(v, instance_id)));
        }
        Ok(volumes)
    }

    async fn list_snapshots(&self, volume_id: &str) -> Result<Vec<Snapshot>> {
        let mut pages = self
            .client
            .describe_snapshots()
            .owner_ids("self")
            .filters(Filter::builder().name("volume-id").values(volume_id).build())
            .into_paginator()
            .send();

        let mut snapshots = Vec::new();
        while let Some(page) = pages.try_next().await.map_err(from_sdk_error)? {
            snapshots.extend(page.snapshots().iter().map(convert_snapshot));
        }
        Ok(snapshots)
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(from_sdk_error)?;

        response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(instance_id))
            .and_then(|i| i.state())
            .and_then(|s| s.name())
            .map(|name| InstanceState::from(name.as_str()))
            .ok_or_else(|| CloudError::ResourceNotFound(instance_id.to_string()))
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.client
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(from_sdk_error)?;
        info!(instance_id = %instance_id, region = %self.region, "Stop requested");
        Ok(())
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.client
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(from_sdk_error)?;
        info!(instance_id = %instance_id, region = %self.region, "Start requested");
        Ok(())
    }

    async fn create_snapshot(&self, volume_id: &str, description: &str) -> Result<String> {
        let response = self
            .client
            .create_snapshot()
            .volume_id(volume_id)
            .description(description)
            .send()
            .await
            .map_err(from_sdk_error)?;

        let snapshot_id = response.snapshot_id().ok_or_else(|| CloudError::Client {
            code: None,
            message: format!("CreateSnapshot for {} returned no snapshot id", volume_id),
        })?;
        info!(volume_id = %volume_id, snapshot_id = %snapshot_id, "Snapshot requested");
        Ok(snapshot_id.to_string())
    }
}

fn convert_instance(i: &ec2::Instance) -> Instance {
    let tags: HashMap<String, String> = i
        .tags()
        .iter()
        .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
        .collect();

    Instance {
        id: i.instance_id().unwrap_or_default().to_string(),
        instance_type: i
            .instance_type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        availability_zone: i
            .placement()
            .and_then(|p| p.availability_zone())
            .unwrap_or_default()
            .to_string(),
        state: i
            .state()
            .and_then(|s| s.name())
            .map(|n| InstanceState::from(n.as_str()))
            .unwrap_or_else(|| InstanceState::Unknown(String::new())),
        public_address: i
            .public_dns_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        tags,
    }
}

fn convert_volume(v: &ec2::Volume, instance_id: &str) -> Volume {
    Volume {
        id: v.volume_id().unwrap_or_default().to_string(),
        instance_id: instance_id.to_string(),
        size_gib: v.size().unwrap_or_default(),
        encrypted: v.encrypted().unwrap_or(false),
        state: v
            .state()
            .map(|s| VolumeState::from(s.as_str()))
            .unwrap_or_else(|| VolumeState::Unknown(String::new())),
    }
}

fn convert_snapshot(s: &ec2::Snapshot) -> Snapshot {
    Snapshot {
        id: s.snapshot_id().unwrap_or_default().to_string(),
        volume_id: s.volume_id().unwrap_or_default().to_string(),
        state: s
            .state()
            .map(|st| SnapshotState::from(st.as_str()))
            .unwrap_or_else(|| SnapshotState::Unknown(String::new())),
        progress: s.progress().unwrap_or_default().to_string(),
        start_time: s.start_time().and_then(to_chrono),
        description: s.description().unwrap_or_default().to_string(),
    }
}

fn to_chrono(t: &aws_sdk_ec2::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

/// Opens an [`Ec2Provider`] per region for a fixed profile
#[derive(Debug, Clone)]
pub struct Ec2ProviderFactory {
    profile: String,
}

impl Ec2ProviderFactory {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }
}

#[async_trait]
impl ProviderFactory for Ec2ProviderFactory {
    async fn connect(&self, region: &str) -> Result<Box<dyn ComputeProvider>> {
        let context = AwsContext::new(&self.profile, region).await;
        Ok(Box::new(Ec2Provider::new(&context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::primitives::DateTime as SmithyDateTime;

    #[test]
    fn test_convert_instance() {
        let raw = ec2::Instance::builder()
            .instance_id("i-0abc")
            .instance_type(ec2::InstanceType::from("t2.micro"))
            .placement(ec2::Placement::builder().availability_zone("us-east-1a").build())
            .state(
                ec2::InstanceState::builder()
                    .name(ec2::InstanceStateName::Stopped)
                    .build(),
            )
            .public_dns_name("")
            .tags(ec2::Tag::builder().key("Project").value("alpha").build())
            .tags(ec2::Tag::builder().key("Name").value("web").build())
            .build();

        let instance = convert_instance(&raw);
        assert_eq!(instance.id, "i-0abc");
        assert_eq!(instance.instance_type, "t2.micro");
        assert_eq!(instance.availability_zone, "us-east-1a");
        assert_eq!(instance.state, InstanceState::Stopped);
        assert_eq!(instance.public_address, None);
        assert_eq!(instance.project(), Some("alpha"));
        assert!(TagFilter::project("alpha").matches(&instance));
    }

    #[test]
    fn test_convert_volume() {
        let raw = ec2::Volume::builder()
            .volume_id("vol-1")
            .size(100)
            .encrypted(true)
            .state(ec2::VolumeState::InUse)
            .build();

        let volume = convert_volume(&raw, "i-1");
        assert_eq!(volume.instance_id, "i-1");
        assert_eq!(volume.size_gib, 100);
        assert!(volume.encrypted);
        assert_eq!(volume.state, VolumeState::InUse);
    }

    #[test]
    fn test_convert_snapshot() {
        let raw = ec2::Snapshot::builder()
            .snapshot_id("snap-1")
            .volume_id("vol-1")
            .state(ec2::SnapshotState::Completed)
            .progress("100%")
            .start_time(SmithyDateTime::from_secs(1_520_517_900))
            .build();

        let snapshot = convert_snapshot(&raw);
        assert_eq!(snapshot.state, SnapshotState::Completed);
        assert_eq!(snapshot.progress, "100%");
        assert_eq!(
            snapshot.start_time.map(|t| t.timestamp()),
            Some(1_520_517_900)
        );
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn test_list_instances_against_aws() {
        let context = AwsContext::new("default", "us-east-1").await;
        let provider = Ec2Provider::new(&context);
        let instances = provider.list_instances(&TagFilter::all()).await.unwrap();
        assert!(instances.iter().all(|i| i.id.starts_with("i-")));
    }
}
