use colored::Colorize;
use ec2flow_cloud::{Outcome, ProviderFactory, RegionEnumerator, RegionScan, TagFilter};
use ec2flow_config::Settings;
use std::io::Write;

pub async fn handle(
    factory: &dyn ProviderFactory,
    settings: &Settings,
    filter: &TagFilter,
) -> anyhow::Result<()> {
    println!("AWS_Profile set to: {}", settings.profile.cyan());
    println!("{}", "Scanning valid AWS regions for EC2 instances...".blue());

    let result = RegionEnumerator::new()
        .scan(factory, &settings.profile, filter, print_region)
        .await;
    println!();

    let scans = result?;
    let failed = scans.iter().filter(|s| s.outcome.failure().is_some()).count();
    if failed > 0 {
        println!(
            "{}",
            format!("{} region(s) could not be scanned", failed).yellow()
        );
    }
    Ok(())
}

/// Rows of a finished region, then one progress dot
fn print_region(scan: &RegionScan) {
    match &scan.outcome {
        Outcome::Ok(rows) if !rows.is_empty() => {
            println!();
            for row in rows {
                println!("{}, {}", scan.region, row);
            }
        }
        Outcome::Ok(_) => {}
        Outcome::Isolated(failure) => {
            println!();
            println!("{}", format!(" Oops: {}", failure).red());
        }
    }
    print!(".");
    std::io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec2flow_cloud::mock::{Call, MockFactory, MockProvider};
    use ec2flow_cloud::{CloudError, Instance};

    #[tokio::test]
    async fn test_region_failure_does_not_stop_scan() {
        let factory = MockFactory::new()
            .with_region(MockProvider::new("us-east-2").with_failure(
                Call::ListInstances,
                CloudError::Transport("timed out".into()),
            ))
            .with_region(MockProvider::new("sa-east-1").with_instance(Instance::new("i-sa")));

        handle(&factory, &Settings::default(), &TagFilter::all())
            .await
            .unwrap();
        assert_eq!(factory.connected().len(), 15);
    }

    #[tokio::test]
    async fn test_authorization_failure_is_fatal() {
        let factory = MockFactory::new().with_region(MockProvider::new("us-east-1").with_failure(
            Call::ListInstances,
            CloudError::Authorization("UnauthorizedOperation".into()),
        ));

        let err = handle(&factory, &Settings::default(), &TagFilter::all())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not have the required permissions"));
        assert_eq!(factory.connected(), vec!["us-east-1"]);
    }
}
