use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline_cluster::{Cluster, ClusterSummary};
use pipeline_core::{ClusterId, LaunchRequest, NewClusterRecord, OrganizationId, SecretId, UserId};
use pipeline_runner::{merge_secret_args, Runner};

#[derive(Parser)]
#[command(name = "pipeline", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize .pipeline/ in the current directory (config and database)
    Init,

    /// Inspect clusters recorded in the database
    Cluster {
        #[command(subcommand)]
        cmd: ClusterCommand,
    },

    /// Spotguide catalog and launches
    Spotguide {
        #[command(subcommand)]
        cmd: SpotguideCommand,
    },
}

#[derive(Subcommand)]
enum ClusterCommand {
    /// List resolvable clusters, for one organization or all of them
    List {
        #[arg(long)]
        org: Option<u64>,
    },

    /// Show one cluster by id or name
    #[command(group(ArgGroup::new("target").required(true).args(["id", "name"])))]
    Get {
        #[arg(long)]
        org: u64,
        #[arg(long)]
        id: Option<u64>,
        #[arg(long)]
        name: Option<String>,
    },

    /// List the clusters that use a secret
    BySecret {
        #[arg(long)]
        org: u64,
        #[arg(long)]
        secret: String,
    },

    /// Record a cluster row (seeding helper)
    Add {
        #[arg(long)]
        org: u64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        provider: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long)]
        secret: String,
        #[arg(long, default_value = "RUNNING")]
        status: String,
        /// Provider configuration as JSON
        #[arg(long, default_value = "{}")]
        config: String,
        #[arg(long, default_value_t = 0)]
        created_by: u64,
    },
}

#[derive(Subcommand)]
enum SpotguideCommand {
    /// Refresh the catalog from the spotguide organization
    Scrape,

    /// List catalog entries with their decoded manifests
    List,

    /// Show one catalog entry
    Get {
        #[arg(long)]
        name: String,
    },

    /// Create a repository from a spotguide and enable CI on it
    Launch {
        #[arg(long)]
        org_id: u64,
        #[arg(long)]
        spotguide: String,
        #[arg(long)]
        repo_org: String,
        #[arg(long)]
        repo_name: String,
        /// NAME=KEY=VALUE; repeat a NAME to add more keys to one secret
        #[arg(long = "secret")]
        secrets: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Runner::init_repo(&repo_root)?;
            println!("Initialized pipeline in {}", repo_root.display());
        }
        Command::Cluster { cmd } => {
            let r = Runner::open(repo_root)?;
            match cmd {
                ClusterCommand::List { org } => {
                    let clusters = match org {
                        Some(org) => r.clusters.list_by_organization(OrganizationId(org))?,
                        None => r.clusters.list_all()?,
                    };
                    println!("{}", serde_json::to_string_pretty(&summaries(&clusters))?);
                }
                ClusterCommand::Get { org, id, name } => {
                    let cluster = match (id, name) {
                        (Some(id), _) => r.clusters.get_by_id(OrganizationId(org), ClusterId(id))?,
                        (None, Some(name)) => r.clusters.get_by_name(OrganizationId(org), &name)?,
                        (None, None) => anyhow::bail!("either --id or --name is required"),
                    };
                    println!("{}", serde_json::to_string_pretty(&cluster.summary())?);
                }
                ClusterCommand::BySecret { org, secret } => {
                    let clusters = r.clusters.list_by_secret(OrganizationId(org), &SecretId::from_str(secret))?;
                    println!("{}", serde_json::to_string_pretty(&summaries(&clusters))?);
                }
                ClusterCommand::Add { org, name, provider, location, secret, status, config, created_by } => {
                    let created = r.add_cluster(NewClusterRecord {
                        organization_id: OrganizationId(org),
                        name,
                        provider,
                        location,
                        secret_id: SecretId::from_str(secret),
                        status,
                        status_message: String::new(),
                        config,
                        created_by: UserId(created_by),
                    })?;
                    println!("Added cluster {} ({})", created.name, created.id);
                }
            }
        }
        Command::Spotguide { cmd } => {
            let r = Runner::open(repo_root)?;
            match cmd {
                SpotguideCommand::Scrape => {
                    let summary = r.scrape()?;
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                SpotguideCommand::List => {
                    println!("{}", serde_json::to_string_pretty(&r.catalog.list()?)?);
                }
                SpotguideCommand::Get { name } => {
                    println!("{}", serde_json::to_string_pretty(&r.catalog.get(&name)?)?);
                }
                SpotguideCommand::Launch { org_id, spotguide, repo_org, repo_name, secrets } => {
                    let request = LaunchRequest {
                        spotguide_name: spotguide,
                        repo_organization: repo_org,
                        repo_name,
                        secrets: merge_secret_args(&secrets)?,
                    };
                    let outcome = r.launch(OrganizationId(org_id), &request)?;
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
            }
        }
    }

    Ok(())
}

fn summaries(clusters: &[Box<dyn Cluster>]) -> Vec<ClusterSummary> {
    clusters.iter().map(|c| c.summary()).collect()
}
