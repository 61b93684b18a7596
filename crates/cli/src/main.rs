// cli/src/main.rs
use clap::{Parser, Subcommand};
use deploy::{ProjectConfig, Session, Signer};
use deployer::{ContractArtifact, ExecutionMode, GasSetting, TxOverrides};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "deploy")]
#[command(about = "Contract deployment tool", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project configuration file
    #[arg(short, long, global = true, default_value = "./deploy.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default project configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List configured networks
    Networks,

    /// Deploy a contract artifact
    Run {
        /// Build artifact (JSON with contractName, abi, bytecode)
        #[arg(short, long)]
        artifact: String,

        /// Constructor arguments
        #[arg(long, num_args = 0..)]
        args: Vec<String>,

        /// Network to deploy to
        #[arg(short, long)]
        network: Option<String>,

        /// Development account index or private key
        #[arg(long, default_value = "0")]
        account: Signer,

        /// Gas price: wei, or an amount with a unit ("10 gwei")
        #[arg(long)]
        gas_price: Option<String>,

        /// Gas limit
        #[arg(long)]
        gas_limit: Option<String>,

        /// Wei sent with the deployment
        #[arg(long)]
        value: Option<String>,

        /// Return reverted receipts instead of failing
        #[arg(long)]
        console: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "deploy={0},deployer={0},devchain={0},chain_client={0},hyper=warn",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Init { force } => {
            init_project(&cli.config, force)?;
        }
        Commands::Networks => {
            list_networks(&cli.config)?;
        }
        Commands::Run {
            artifact,
            args,
            network,
            account,
            gas_price,
            gas_limit,
            value,
            console,
        } => {
            let overrides = TxOverrides {
                gas_price: parse_amount(gas_price.as_deref())?,
                gas_limit: parse_amount(gas_limit.as_deref())?,
                value: parse_amount(value.as_deref())?,
            };
            let mode = if console {
                ExecutionMode::Interactive
            } else {
                ExecutionMode::Script
            };
            run_deployment(
                &cli.config,
                &artifact,
                &args,
                network.as_deref(),
                &account,
                overrides,
                mode,
            )
            .await?;
        }
    }

    Ok(())
}

fn parse_amount(text: Option<&str>) -> anyhow::Result<Option<ethers_core::types::U256>> {
    Ok(text.map(GasSetting::parse_amount).transpose()?)
}

fn init_project(path: &str, force: bool) -> anyhow::Result<()> {
    if std::path::Path::new(path).exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path);
    }

    ProjectConfig::default().to_file(path)?;
    tracing::info!("Wrote default configuration to {}", path);
    Ok(())
}

fn list_networks(path: &str) -> anyhow::Result<()> {
    let config = ProjectConfig::load_or_default(path)?;

    for (name, network) in &config.networks {
        let marker = if *name == config.default_network { "*" } else { " " };
        let endpoint = match (&network.host, &network.devchain) {
            (Some(host), _) => host.clone(),
            (None, Some(devchain)) => format!("devchain ({})", devchain.hardfork),
            (None, None) => "unconfigured".to_string(),
        };
        println!("{} {:<16} {}", marker, name, endpoint);
    }
    Ok(())
}

async fn run_deployment(
    config_path: &str,
    artifact_path: &str,
    args: &[String],
    network: Option<&str>,
    signer: &Signer,
    overrides: TxOverrides,
    mode: ExecutionMode,
) -> anyhow::Result<()> {
    let config = ProjectConfig::load_or_default(config_path)?;
    let artifact = ContractArtifact::from_file(artifact_path)?;
    let session = Session::open(&config, network, mode).await?;

    let record = deploy::runtime::deploy(&session, signer, &artifact, args, overrides).await?;
    let path = record.save(&config.deployments_dir)?;

    match record.address {
        Some(address) => tracing::info!("{} deployed at {:?}", record.contract, address),
        None => tracing::warn!(
            "{} deployment reverted: {}",
            record.contract,
            record
                .receipt
                .revert_reason
                .as_deref()
                .unwrap_or("no reason given")
        ),
    }
    tracing::info!("Deployment record saved to {}", path.display());
    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}
