use std::{ffi::OsString, fs::OpenOptions, path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use atlanclient::{AtlanClient, S3Reader};
use catalink::{
    catalog::{CatalogService, SqliteCatalog},
    config::LinkConfig,
    gate::{AutoApprove, ConfirmationGate, StdinGate},
    hierarchy::{RegistrationPlan, RegistrationReport, TableOutcome},
    lineage::{LineageReport, LineageSource},
    models::ConnectorType,
    storage::{DirObjectStore, ObjectStore},
    upsert::ConnectionSpec,
    Catalink,
};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, fmt::writer::BoxMakeWriter, EnvFilter};
use url::Url;

/// Runs the command line interface.
pub async fn run_cli() -> anyhow::Result<()> {
    run_from(std::env::args_os()).await
}

/// Runs the command line interface on explicit arguments, program name first.
pub async fn run_from<I, T>(args: I) -> anyhow::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    let config = LinkConfig::from_env().context("failed to load configuration")?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level), config.log_file.as_ref())?;

    let catalog = open_catalog(&cli, &config)?;
    let engine = Catalink::new(catalog);

    match cli.command {
        Some(Command::Register(args)) => {
            let report = run_register(&engine, &config, args).await?;
            print_registration(&report);
        }
        Some(Command::Lineage(args)) => {
            let report = run_lineage(&engine, &config, args).await?;
            print_lineage(&report);
        }
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Write to a local SQLite catalog instead of the remote catalog API
    #[arg(long, global = true)]
    local_catalog: Option<PathBuf>,
    /// Catalog API base url
    #[arg(long, global = true, env = "CATALOG_BASE_URL")]
    base_url: Option<Url>,
    /// Log filter, e.g. `info` or `catalink=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Registers connection, database, schema, tables and columns for CSV
    /// objects in a bucket
    Register(RegisterArgs),
    /// Links matching tables and columns across a chain of connections
    Lineage(LineageArgs),
}

#[derive(Args, Default)]
struct RegisterArgs {
    /// Connection to register the objects under
    #[arg(long)]
    connection: Option<String>,
    #[arg(long)]
    database: Option<String>,
    #[arg(long)]
    schema: Option<String>,
    #[arg(long)]
    bucket: Option<String>,
    /// Object keys; repeat or comma separate. Defaults to S3_OBJECT_NAMES
    #[arg(long = "object", value_delimiter = ',')]
    objects: Vec<String>,
    /// Read objects from `{dir}/{bucket}/{key}` instead of S3
    #[arg(long)]
    objects_dir: Option<PathBuf>,
    /// S3-compatible endpoint for path-style requests
    #[arg(long)]
    s3_endpoint: Option<Url>,
}

#[derive(Args, Default)]
struct LineageArgs {
    /// Connection names in flow order; overrides LINEAGE_CHAIN
    #[arg(long, value_delimiter = ',')]
    chain: Vec<String>,
    /// Do not ask before linking each source
    #[arg(long, short = 'y', default_value_t = false)]
    yes: bool,
}

fn init_tracing(level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .try_init();
    Ok(())
}

fn open_catalog(cli: &Cli, config: &LinkConfig) -> anyhow::Result<Arc<dyn CatalogService>> {
    if let Some(path) = &cli.local_catalog {
        let catalog = SqliteCatalog::open(path)
            .with_context(|| format!("failed to open local catalog {}", path.display()))?;
        catalog.initialize_schema()?;
        info!("Using local catalog at {}", path.display());
        return Ok(Arc::new(catalog));
    }

    let mut config = config.clone();
    if cli.base_url.is_some() {
        config.base_url = cli.base_url.clone();
    }
    let client = AtlanClient::from_config(&config).context("failed to configure catalog client")?;
    info!("Using catalog API at {}", client.base_url());
    Ok(Arc::new(client))
}

fn registration_plan(config: &LinkConfig, args: &RegisterArgs) -> anyhow::Result<RegistrationPlan> {
    let pick = |flag: &Option<String>, fallback: &Option<String>, key: &str| -> anyhow::Result<String> {
        match flag.as_ref().or(fallback.as_ref()) {
            Some(value) => Ok(value.clone()),
            None => bail!("{key} must be set (flag or environment)"),
        }
    };
    let object_keys = if args.objects.is_empty() {
        config.object_names.clone()
    } else {
        args.objects.clone()
    };

    Ok(RegistrationPlan {
        connection: ConnectionSpec {
            name: pick(&args.connection, &config.s3_connection_name, "S3_CONNECTION_NAME")?,
            connector: ConnectorType::S3,
            admin_users: config.admin_users.clone(),
            admin_groups: config.admin_groups.clone(),
        },
        database_name: pick(&args.database, &config.database_name, "DATABASE_NAME")?,
        schema_name: pick(&args.schema, &config.schema_name, "SCHEMA_NAME")?,
        bucket: pick(&args.bucket, &config.bucket_name, "S3_BUCKET_NAME")?,
        object_keys,
    })
}

async fn run_register(
    engine: &Catalink,
    config: &LinkConfig,
    args: RegisterArgs,
) -> anyhow::Result<RegistrationReport> {
    let plan = registration_plan(config, &args)?;
    if plan.object_keys.is_empty() {
        warn!("No CSV objects specified in S3_OBJECT_NAMES or --object.");
    }

    let store: Arc<dyn ObjectStore> = match (args.objects_dir, args.s3_endpoint) {
        (Some(dir), _) => Arc::new(DirObjectStore::new(dir)),
        (None, Some(endpoint)) => Arc::new(S3Reader::with_endpoint(endpoint)),
        (None, None) => Arc::new(S3Reader::new()),
    };

    let report = engine
        .register(store, &plan)
        .await
        .context("registration failed")?;
    if !report.complete {
        bail!("failed to create or retrieve the connection, database or schema");
    }
    Ok(report)
}

fn lineage_chain(config: &LinkConfig, args: &LineageArgs) -> anyhow::Result<Vec<LineageSource>> {
    if args.chain.is_empty() {
        return Ok(config.lineage_sources()?);
    }
    let mut config = config.clone();
    config.lineage_chain = args.chain.clone();
    Ok(config.lineage_sources()?)
}

async fn run_lineage(
    engine: &Catalink,
    config: &LinkConfig,
    args: LineageArgs,
) -> anyhow::Result<LineageReport> {
    let chain = lineage_chain(config, &args)?;
    let mut auto = AutoApprove;
    let mut prompt = StdinGate::new();
    let gate: &mut dyn ConfirmationGate = if args.yes { &mut auto } else { &mut prompt };

    let report = engine
        .link(&chain, gate)
        .await
        .context("lineage run failed")?;
    if report.aborted {
        println!("Aborting.");
    }
    Ok(report)
}

fn print_registration(report: &RegistrationReport) {
    println!("\nSchema extraction and update completed.");
    if let Some(schema) = &report.schema_qualified_name {
        println!("- Schema: {schema}");
    }
    for object in &report.objects {
        match &object.outcome {
            TableOutcome::Registered {
                table_qualified_name,
                columns,
            } => println!(
                "- {} -> {} ({} new columns, {} typed, {} failed)",
                object.object_key,
                table_qualified_name,
                columns.created.len(),
                columns.patched.len(),
                columns.create_failed.len() + columns.patch_failed.len()
            ),
            TableOutcome::Empty => println!("- {}: no usable columns, skipped", object.object_key),
            TableOutcome::Unreadable(reason) => println!("- {}: unreadable ({reason})", object.object_key),
            TableOutcome::Failed => println!("- {}: table could not be created", object.object_key),
        }
    }
}

fn print_lineage(report: &LineageReport) {
    for stage in &report.stages {
        println!("\n{} -> {}", stage.source, stage.target);
        for link in &stage.links {
            match &link.edge {
                Some(edge) => println!(
                    "  {} ({} column edges{})",
                    edge.name,
                    link.column_edges.len(),
                    if link.failed_column_edges.is_empty() { "" } else { ", some failed" }
                ),
                None => println!(
                    "  {} -> {}: failed to create table lineage; columns skipped",
                    link.source_table, link.target_table
                ),
            }
        }
        for table in &stage.unmatched_source_tables {
            println!("  unmatched: {table}");
        }
    }
    if !report.aborted {
        println!(
            "\nLineage establishment completed: {} edges, {} new.",
            report.edges_total(),
            report.edges_created()
        );
    }
}
