//! CRD Mirror
//!
//! Copies custom resource definitions and their instances from the public
//! group/version into the internal one, and keeps them in sync.
//!
//! ## Usage
//!
//! ```bash
//! # List public and internal definitions
//! crd-mirror types
//!
//! # Bootstrap the internal definitions and instances
//! crd-mirror copy-crds
//! crd-mirror copy-resources
//!
//! # Keep the mirror live until interrupted
//! RUST_LOG=debug crd-mirror --kubeconfig ~/.kube/config server
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use crd_mirror::connection::{TokenFileProvider, TOKEN_FILE_PROVIDER};
use crd_mirror::{
    ConnectionConfig, CredentialRegistry, DefinitionStore, GroupVersion, MirrorConfig,
    MirrorController,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Mirror custom resources from the public group into the internal group
#[derive(Parser, Debug)]
#[command(name = "crd-mirror")]
#[command(version, about = "Mirror custom resource definitions and instances between API groups")]
struct Args {
    /// Kubeconfig file path; in-cluster config is used when unset
    #[arg(short = 'c', long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Credential provider used to authenticate
    #[arg(long, global = true, default_value = "kubeconfig", env = "CRD_MIRROR_CREDENTIAL_PROVIDER")]
    credential_provider: String,

    /// Bearer token file for the token-file credential provider
    #[arg(long, global = true, env = "CRD_MIRROR_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// API group mirrored from
    #[arg(long, global = true, default_value = crd_mirror::config::DEFAULT_PUBLIC_GROUP, env = "CRD_MIRROR_PUBLIC_GROUP")]
    public_group: String,

    /// API group mirrored into
    #[arg(long, global = true, default_value = crd_mirror::config::DEFAULT_INTERNAL_GROUP, env = "CRD_MIRROR_INTERNAL_GROUP")]
    internal_group: String,

    /// API version shared by both groups
    #[arg(long, global = true, default_value = crd_mirror::config::DEFAULT_API_VERSION, env = "CRD_MIRROR_API_VERSION")]
    api_version: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List public and internal custom resource definitions
    Types,
    /// Copy public definitions into the internal group
    CopyCrds,
    /// Copy public instances into the internal group
    CopyResources,
    /// Delete internal definitions
    Delete,
    /// Keep the internal group in sync until interrupted
    Server,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let mut providers = CredentialRegistry::with_defaults();
    if let Some(path) = &args.token_file {
        providers.register(Box::new(TokenFileProvider::new(path)));
    } else if args.credential_provider == TOKEN_FILE_PROVIDER {
        anyhow::bail!("--token-file is required with --credential-provider {}", TOKEN_FILE_PROVIDER);
    }

    let connection = ConnectionConfig {
        kubeconfig: args.kubeconfig.clone(),
        context: args.context.clone(),
        credential_provider: args.credential_provider.clone(),
    };
    let client = connection.connect(&providers).await?;
    info!("Connected to Kubernetes API server");

    let config = MirrorConfig::from_groups(&args.public_group, &args.internal_group, &args.api_version);
    let mut controller = MirrorController::connect(client, config).await?;

    match args.command {
        Command::Types => {
            let config = controller.config().clone();
            print_definitions(&controller, &config.public).await?;
            println!();
            print_definitions(&controller, &config.internal).await?;
        }
        Command::CopyCrds => controller.copy_crds().await?,
        Command::CopyResources => controller.copy_resources().await?,
        Command::Delete => controller.delete_resources().await?,
        Command::Server => {
            let liveness = controller.sync().await?;
            info!("Mirror running");

            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Received shutdown signal");
                }
                _ = liveness.cancelled() => {
                    info!("Controller stopped");
                }
            }

            controller.stop().await;
            info!("CRD mirror shutting down");
        }
    }

    Ok(())
}

async fn print_definitions(
    controller: &MirrorController,
    group_version: &GroupVersion,
) -> anyhow::Result<()> {
    let definitions = controller.definitions().get_all(group_version).await?;
    println!("Custom Resource Definitions for '{}':", group_version);
    for definition in definitions {
        println!(" {}", definition.metadata.name.unwrap_or_default());
    }
    Ok(())
}
