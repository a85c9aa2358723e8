//! maas-netif CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use maas_netif::cli::{Cli, Commands, ImportCommands, OutputFormatter, StateCommands};
use maas_netif::config::{ConfigParser, ConfigValidator, Manifest, find_config_file};
use maas_netif::error::Result;
use maas_netif::maas::MaasClient;
use maas_netif::reconciler::{self, Reconciler};
use maas_netif::resources::CancelFlag;
use maas_netif::state::{LocalStateStore, STATE_DIR, StateStore};

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` takes precedence over the
/// verbosity flag.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Everything a command needs once the manifest has been loaded.
struct Context {
    manifest: Manifest,
    store: Box<dyn StateStore>,
    formatter: OutputFormatter,
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    if let Commands::Validate { warnings } = cli.command {
        return cmd_validate(cli.config.as_ref(), warnings, &formatter);
    }

    let (manifest, config_dir) = load_manifest(cli.config.as_ref())?;
    let ctx = Context {
        store: create_state_store(&manifest, &config_dir),
        manifest,
        formatter,
    };

    if let Commands::State { command } = cli.command {
        return cmd_state(&ctx, command).await;
    }

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let api = Arc::new(MaasClient::new(&ctx.manifest.maas, &ConfigParser::get_api_key()?)?);
    let reconciler = Reconciler::new(&ctx.manifest, &ctx.store, api).with_cancel(&cancel);

    match cli.command {
        Commands::Plan => {
            let (plan, _) = reconciler.plan().await?;
            println!("{}", ctx.formatter.format_plan(&plan));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(&ctx, &reconciler, yes, continue_on_error).await,
        Commands::Refresh => {
            let report = reconciler.refresh().await?;
            println!("{}", ctx.formatter.format_refresh(&report));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Drift => {
            let report = reconciler.check_drift().await?;
            println!("{}", ctx.formatter.format_drift(&report));
            Ok(if report.is_converged() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
        Commands::Import {
            command: ImportCommands::Bridge { key, id },
        } => {
            let bridge = reconciler.import_bridge(&key, &id).await?;
            println!("{}", ctx.formatter.format_import(&key, &bridge));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Lookup => {
            let machines = reconciler.lookup().await?;
            println!("{}", ctx.formatter.format_machines(&machines));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { .. } | Commands::State { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Sets the cancellation flag on Ctrl-C; the running operation stops at the
/// next remote call.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping before the next MAAS call");
            cancel.cancel();
        }
    });
}

fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Validating manifest: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let manifest = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&manifest)?;

    println!("{}", formatter.format_validation(&result, show_warnings));
    eprintln!(
        "\nManifest summary: {} bridges, {} VLANs, {} machine lookups",
        manifest.bridges.len(),
        manifest.vlans.len(),
        manifest.machines.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn cmd_apply<S: StateStore>(
    ctx: &Context,
    reconciler: &Reconciler<'_, S>,
    auto_approve: bool,
    continue_on_error: bool,
) -> Result<ExitCode> {
    if !auto_approve {
        let (plan, _) = reconciler.plan().await?;
        if plan.is_empty() {
            eprintln!("No changes to apply.");
            return Ok(ExitCode::SUCCESS);
        }

        println!("{}", ctx.formatter.format_plan(&plan));
        eprint!("Do you want to apply this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let result = reconciler.apply(continue_on_error).await?;
    println!("{}", ctx.formatter.format_reconciliation(&result));

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_state(ctx: &Context, command: StateCommands) -> Result<ExitCode> {
    match command {
        StateCommands::Show => {
            if let Some(state) = ctx.store.load().await? {
                println!("{}", ctx.formatter.format_state(&state, &ctx.store.location()));
            } else {
                eprintln!("No state found at {}.", ctx.store.location());
            }
        }
        StateCommands::Rm { kind, key } => {
            reconciler::forget(&ctx.store, kind, &key).await?;
            eprintln!("Removed {kind}.{key} from state. The interface was left in MAAS.");
        }
        StateCommands::Unlock => match ctx.store.force_unlock().await? {
            Some(lock) => eprintln!("Removed lock {lock}"),
            None => eprintln!("State was not locked."),
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn config_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads `.env`, the manifest and its environment overrides, then validates.
fn load_manifest(config_path: Option<&PathBuf>) -> Result<(Manifest, PathBuf)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading manifest from: {}", config_file.display());

    let dir = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&dir);
    parser.load_dotenv()?;

    let manifest = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&manifest)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok((manifest, dir))
}

/// Relative state paths are taken from the manifest's directory.
fn create_state_store(manifest: &Manifest, config_dir: &Path) -> Box<dyn StateStore> {
    match manifest.state.path.as_deref() {
        Some(path) => Box::new(LocalStateStore::with_state_path(config_dir.join(path))),
        None => Box::new(LocalStateStore::with_base_dir(config_dir.join(STATE_DIR))),
    }
}
