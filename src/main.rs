use anyhow::Result;
use azinv::azure::broker::{IdentityBroker, OnBehalfOfBroker, StaticTokenBroker, TokenBroker};
use azinv::azure::client::ArmClientFactory;
use azinv::azure::http::{format_arm_error, ArmHttpClient};
use azinv::config::Config;
use azinv::error::AggregateEnumerationError;
use azinv::inventory::{list_resource_groups, list_resources, Context};
use azinv::render::{render_resource_groups, render_resources, OutputFormat};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Inventory of Azure resource groups and resources visible to the signed-in user
#[derive(Parser, Debug)]
#[command(name = "azinv", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory (tenant) id or domain
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    /// Client id of the app registration used for the on-behalf-of exchange
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Already-issued management token for the user
    #[arg(long, env = "AZINV_USER_TOKEN", hide_env_values = true, global = true)]
    user_token: Option<String>,

    /// User assertion (JWT) to exchange on behalf of the user
    #[arg(long, env = "AZINV_USER_ASSERTION", hide_env_values = true, global = true)]
    user_assertion: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Save --tenant and --client-id to the config file
    #[arg(long, global = true)]
    remember: bool,

    /// Log level for debugging (AZINV_LOG overrides)
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List resource groups across all subscriptions
    Groups,
    /// List resources of one resource group
    Resources {
        subscription_id: String,
        resource_group: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match std::env::var("AZINV_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives).ok()?,
        _ => EnvFilter::new(level.directive()?),
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azinv started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azinv").join("azinv.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azinv").join("azinv.log");
    }
    PathBuf::from("azinv.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("Initialization error: {:#}", err);
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<ExitCode> {
    let mut config = Config::load();
    if args.remember {
        if let Some(tenant) = &args.tenant {
            config.set_tenant(tenant)?;
        }
        if let Some(client_id) = &args.client_id {
            config.set_client_id(client_id)?;
        }
    }

    let tenant = config.effective_tenant(args.tenant.as_deref());
    let client_id = config.effective_client_id(args.client_id.as_deref());
    tracing::info!("Using tenant: {}", tenant.as_deref().unwrap_or("(default)"));

    let http = ArmHttpClient::with_retries(config.max_retries)?;

    let identity: Arc<dyn IdentityBroker> = match &args.user_token {
        Some(token) => Arc::new(StaticTokenBroker::new(token.as_str())),
        None => Arc::new(OnBehalfOfBroker::new(
            &http,
            config.app_registration(tenant.as_deref(), client_id.as_deref()),
            args.user_assertion.clone(),
        )),
    };

    let broker = TokenBroker::new(identity, &http, config.ambient_settings(tenant));
    let factory = ArmClientFactory::new(http, &config.effective_arm_endpoint())?;
    let ctx = Context::new(broker, Arc::new(factory));

    match &args.command {
        Command::Groups => match list_resource_groups(&ctx).await {
            Ok(records) => {
                println!("{}", render_resource_groups(&records, args.output)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                report_failure(
                    "Unable to fetch resource groups. Please check your Azure permissions and try again.",
                    &e,
                );
                println!("{}", render_resource_groups(&[], args.output)?);
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Resources {
            subscription_id,
            resource_group,
        } => match list_resources(&ctx, subscription_id, resource_group).await {
            Ok(records) => {
                println!("{}", render_resources(&records, args.output)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                report_failure(
                    &format!(
                        "Unable to fetch resources for resource group '{}'. Please check your Azure permissions and try again.",
                        resource_group
                    ),
                    &e,
                );
                println!("{}", render_resources(&[], args.output)?);
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn report_failure(message: &str, error: &AggregateEnumerationError) {
    eprintln!("{}", message);
    match error.cause() {
        Some(cause) => eprintln!("  {}", format_arm_error(cause)),
        None => eprintln!("  {}", error),
    }
}
