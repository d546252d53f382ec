use super::{print_json, print_row};
use colored::Colorize;
use ec2flow_cloud::{ComputeProvider, ResourceGraphWalker, TagFilter, WalkDepth, select_instances};
use ec2flow_config::Settings;

pub async fn list(
    provider: &dyn ComputeProvider,
    settings: &Settings,
    filter: &TagFilter,
    json: bool,
) -> anyhow::Result<()> {
    let instances = select_instances(provider, &settings.profile, filter).await?;
    let walker =
        ResourceGraphWalker::new(provider).with_snapshot_policy(settings.snapshot_policy);

    if json {
        return print_json(&walker.collect(&instances, WalkDepth::Snapshots).await);
    }

    println!("{}", "Listing snapshots...".blue());
    walker
        .walk(&instances, WalkDepth::Snapshots, |row| print_row(&row))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2flow_cloud::mock::{Call, MockProvider};
    use ec2flow_cloud::{Instance, Snapshot, SnapshotPolicy, SnapshotState, Volume};

    #[tokio::test]
    async fn test_listing_is_read_only() {
        let provider = MockProvider::new("us-east-1")
            .with_instance(Instance::new("i-1"))
            .with_volume(Volume::new("vol-1", "i-1", 8))
            .with_snapshot(Snapshot::new("snap-1", "vol-1", SnapshotState::Completed))
            .with_snapshot(Snapshot::new("snap-2", "vol-1", SnapshotState::Completed));
        let settings = Settings {
            snapshot_policy: SnapshotPolicy::FirstCompleted,
            ..Settings::default()
        };

        list(&provider, &settings, &TagFilter::all(), false)
            .await
            .unwrap();
        list(&provider, &settings, &TagFilter::all(), true)
            .await
            .unwrap();

        assert_eq!(provider.count(Call::is_mutation), 0);
        assert_eq!(provider.count(|c| matches!(c, Call::ListSnapshots(_))), 2);
    }
}
