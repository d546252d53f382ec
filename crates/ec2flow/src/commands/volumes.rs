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
    let walker = ResourceGraphWalker::new(provider);

    if json {
        return print_json(&walker.collect(&instances, WalkDepth::Volumes).await);
    }

    println!("{}", "Listing EC2 Volumes...".blue());
    walker
        .walk(&instances, WalkDepth::Volumes, |row| print_row(&row))
        .await;
    Ok(())
}
