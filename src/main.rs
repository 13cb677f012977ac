//! kafkalo command line
//!
//! ## Usage
//!
//! ```bash
//! # Show what would change
//! kafkalo plan --config config.yaml
//!
//! # Apply the desired state
//! kafkalo sync --config config.yaml
//!
//! # Run with custom log level
//! RUST_LOG=debug kafkalo sync --config config.yaml --dry-run
//! ```

use clap::{Parser, Subcommand};
use kafkalo::model::Principal;
use kafkalo::reconcilers::ClusterIds;
use kafkalo::remote::{
    ClusterContext, MdsClient, RbacService, RegistryClient, SchemaLookup, SchemaRegistry,
};
use kafkalo::{
    Config, DesiredState, OutputFormat, Remotes, RoleBindingReconciler, Schema, SyncOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Declarative reconciler for Kafka topics, schemas and role bindings
#[derive(Parser, Debug)]
#[command(name = "kafkalo")]
#[command(version, about = "Declarative reconciler for Kafka topics, schemas and role bindings")]
struct Args {
    /// Emit logs as JSON
    #[arg(long, global = true, default_value = "false")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize the cluster with the desired state
    Sync {
        /// Path of the configuration document
        #[arg(long)]
        config: PathBuf,

        /// Don't change anything, only print the plan
        #[arg(long, default_value = "false")]
        dry_run: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Print a plan. Equivalent to `sync --dry-run`
    Plan {
        #[arg(long)]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Schema registry helpers
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// RBAC helpers
    #[command(subcommand)]
    Rbac(RbacCommand),
}

#[derive(Subcommand, Debug)]
enum SchemaCommand {
    /// Check whether a schema file is registered under a subject
    CheckExists {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        schema_file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum RbacCommand {
    /// List the roles bound to a principal in the Kafka cluster
    Roles {
        #[arg(long)]
        config: PathBuf,

        /// Principal in the form User:<name> or Group:<name>
        #[arg(long)]
        principal: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so that plans on stdout can be piped
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match args.command {
        Command::Sync {
            config,
            dry_run,
            output,
        } => run_sync(config, dry_run, output).await,
        Command::Plan { config, output } => run_sync(config, true, output).await,
        Command::Schema(SchemaCommand::CheckExists {
            config,
            subject,
            schema_file,
        }) => check_exists(config, &subject, schema_file).await,
        Command::Rbac(RbacCommand::Roles { config, principal }) => {
            list_roles(config, &principal).await
        }
    }
}

async fn run_sync(config: PathBuf, dry_run: bool, output: OutputFormat) -> anyhow::Result<()> {
    let config = Config::from_file(&config)?;
    let desired = DesiredState::load(config.input_patterns())?;
    let remotes = Remotes::connect(&config)?;
    let options = SyncOptions::from_config(&config, dry_run);

    let report = kafkalo::sync(&desired, &remotes, &options).await?;
    if dry_run {
        println!("{}", report.render(output)?);
    } else {
        info!(
            "Sync finished: topics {}; schemas {}; {} role binding(s) failed",
            report.summary.topics, report.summary.schemas, report.summary.failed_rolebindings
        );
    }
    Ok(())
}

async fn check_exists(config: PathBuf, subject: &str, schema_file: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_file(&config)?;
    let registry = RegistryClient::new(&config.schema_registry)?;
    let body = std::fs::read_to_string(&schema_file)?;
    let schema = Schema::new(subject, body, None);

    match registry.lookup_schema(subject, &schema).await {
        SchemaLookup::Found(found) => println!(
            "Schema found: SUBJECT: {}, ID: {}, VERSION: {}",
            found.subject, found.id, found.version
        ),
        SchemaLookup::NotFound => {
            println!("Schema not found. (Registry responded with: subject or schema not found)")
        }
        SchemaLookup::TransientError(reason) | SchemaLookup::PermanentError(reason) => {
            println!("Schema not found. (Registry responded with: {})", reason)
        }
    }
    Ok(())
}

async fn list_roles(config: PathBuf, principal: &str) -> anyhow::Result<()> {
    let principal: Principal = principal.parse()?;
    let config = Config::from_file(&config)?;
    let rbac = Arc::new(MdsClient::new(&config.mds)?);
    let reconciler = RoleBindingReconciler::new(rbac.clone(), ClusterIds::from(&config.mds)).await?;
    let scope = reconciler.scope(ClusterContext::Kafka)?;

    let principal = principal.to_string();
    let roles = rbac.role_names(&principal, &scope).await?;
    if roles.is_empty() {
        println!("No roles bound to {}", principal);
    }
    for role in roles {
        println!("{}", role);
    }
    Ok(())
}
