mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use ec2flow_cloud::{PowerAction, SnapshotPolicy, TagFilter};
use ec2flow_config::Overrides;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ec2ctl")]
#[command(
    about = "List EC2 instances, volumes and snapshots by project tag, and stop/snapshot/start them",
    long_about = None
)]
struct Cli {
    /// AWS credential profile
    #[arg(long, global = true, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// AWS region (falls back to AWS_REGION / AWS_DEFAULT_REGION)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Commands for instances
    #[command(subcommand)]
    Instances(InstanceCommands),
    /// Commands for volumes
    #[command(subcommand)]
    Volumes(VolumeCommands),
    /// Commands for snapshots
    #[command(subcommand)]
    Snapshots(SnapshotCommands),
    /// List instances in every known region
    Scan {
        /// Only instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
    },
    /// Show the known region table
    Regions,
    /// Show the resolved profile, region and masked credentials
    Profile,
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// List EC2 instances
    List {
        /// Only instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Print JSON instead of text rows
        #[arg(long)]
        json: bool,
    },
    /// Stop EC2 instances
    Stop {
        /// Only instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Wait for each instance to reach 'stopped'
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, value_name = "SECS")]
        wait_timeout: Option<u64>,
    },
    /// Start EC2 instances
    Start {
        /// Only instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Wait for each instance to reach 'running'
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, value_name = "SECS")]
        wait_timeout: Option<u64>,
    },
    /// Stop each instance, snapshot its volumes, start it again
    Snapshot {
        /// Only instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Give up waiting for a state change after this many seconds
        #[arg(long, value_name = "SECS")]
        wait_timeout: Option<u64>,
    },
}

#[derive(Subcommand)]
enum VolumeCommands {
    /// List EC2 volumes
    List {
        /// Only volumes of instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Print JSON instead of text rows
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// List EC2 snapshots
    List {
        /// Only snapshots of instances tagged Project=<PROJECT>
        #[arg(long)]
        project: Option<String>,
        /// Per volume, stop after the first completed snapshot
        #[arg(long)]
        latest_only: bool,
        /// Print JSON instead of text rows
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let wait_timeout_secs = match &self.command {
            Commands::Instances(
                InstanceCommands::Stop { wait_timeout, .. }
                | InstanceCommands::Start { wait_timeout, .. }
                | InstanceCommands::Snapshot { wait_timeout, .. },
            ) => *wait_timeout,
            _ => None,
        };
        let snapshot_policy = match &self.command {
            Commands::Snapshots(SnapshotCommands::List {
                latest_only: true, ..
            }) => Some(SnapshotPolicy::FirstCompleted),
            _ => None,
        };

        Overrides {
            profile: self.profile.clone(),
            region: self.region.clone(),
            wait_timeout_secs,
            snapshot_policy,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Neither needs a profile or region
    match cli.command {
        Commands::Version => {
            println!("ec2ctl {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Regions => {
            commands::regions::handle();
            return Ok(());
        }
        _ => {}
    }

    let result = match ec2flow_config::resolve(cli.overrides()) {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, settings: ec2flow_config::Settings) -> anyhow::Result<()> {
    match command {
        Commands::Instances(cmd) => match cmd {
            InstanceCommands::List { project, json } => {
                let provider = commands::connect(&settings).await?;
                commands::instances::list(&provider, &settings, &TagFilter::new(project), json)
                    .await
            }
            InstanceCommands::Stop { project, wait, .. } => {
                let provider = commands::connect(&settings).await?;
                commands::instances::power(
                    &provider,
                    &settings,
                    &TagFilter::new(project),
                    PowerAction::Stop,
                    wait,
                    &commands::cancel_on_ctrl_c(),
                )
                .await
                .map(|_| ())
            }
            InstanceCommands::Start { project, wait, .. } => {
                let provider = commands::connect(&settings).await?;
                commands::instances::power(
                    &provider,
                    &settings,
                    &TagFilter::new(project),
                    PowerAction::Start,
                    wait,
                    &commands::cancel_on_ctrl_c(),
                )
                .await
                .map(|_| ())
            }
            InstanceCommands::Snapshot { project, .. } => {
                let provider = commands::connect(&settings).await?;
                commands::instances::snapshot(
                    &provider,
                    &settings,
                    &TagFilter::new(project),
                    &commands::cancel_on_ctrl_c(),
                )
                .await
                .map(|_| ())
            }
        },
        Commands::Volumes(VolumeCommands::List { project, json }) => {
            let provider = commands::connect(&settings).await?;
            commands::volumes::list(&provider, &settings, &TagFilter::new(project), json).await
        }
        Commands::Snapshots(SnapshotCommands::List { project, json, .. }) => {
            let provider = commands::connect(&settings).await?;
            commands::snapshots::list(&provider, &settings, &TagFilter::new(project), json).await
        }
        Commands::Scan { project } => {
            let factory = ec2flow_cloud_aws::Ec2ProviderFactory::new(&settings.profile);
            commands::scan::handle(&factory, &settings, &TagFilter::new(project)).await
        }
        Commands::Profile => commands::profile::handle(&settings).await,
        Commands::Version | Commands::Regions => Ok(()),
    }
}
