pub mod instances;
pub mod profile;
pub mod regions;
pub mod scan;
pub mod snapshots;
pub mod volumes;

use colored::Colorize;
use ec2flow_cloud::{Outcome, Row};
use ec2flow_cloud_aws::{AwsContext, Ec2Provider};
use ec2flow_config::Settings;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// EC2 client for the configured profile and region
pub async fn connect(settings: &Settings) -> anyhow::Result<Ec2Provider> {
    let region = settings.require_region()?;
    let context = AwsContext::new(&settings.profile, region).await;
    tracing::debug!(profile = %settings.profile, region = %region, "Connected");
    Ok(Ec2Provider::new(&context))
}

/// Token cancelled on the first Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "Interrupted: abandoning the current wait, remaining instances are skipped"
                    .yellow()
            );
            trigger.cancel();
        }
    });
    token
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print one listing row, or the diagnostic for a failed lookup
pub fn print_row(row: &Outcome<Row>) {
    match row {
        Outcome::Ok(row) => println!("{}", row),
        Outcome::Isolated(failure) => println!("{}", format!(" Oops: {}", failure).red()),
    }
}
