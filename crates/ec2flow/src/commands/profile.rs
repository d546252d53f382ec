use colored::Colorize;
use ec2flow_cloud::region_display_name;
use ec2flow_cloud_aws::AwsContext;
use ec2flow_config::Settings;

/// Credentials resolve the same in every region; this one is only used
/// when none is configured.
const FALLBACK_REGION: &str = "us-east-1";

pub async fn handle(settings: &Settings) -> anyhow::Result<()> {
    println!("Profile    = {}", settings.profile.cyan());
    match settings.region.as_deref() {
        Some(region) => println!(
            "Region     = {} ({})",
            region.cyan(),
            region_display_name(region).unwrap_or("unknown")
        ),
        None => println!("Region     = {}", "<not set>".dimmed()),
    }

    let region = settings.region.as_deref().unwrap_or(FALLBACK_REGION);
    let context = AwsContext::new(&settings.profile, region).await;
    let credentials = context.masked_credentials().await?;
    println!("Access Key = {}", credentials.access_key);
    println!("Secret Key = {}", credentials.secret_key);
    Ok(())
}
