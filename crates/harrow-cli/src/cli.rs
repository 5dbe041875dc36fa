//! Command-line surface: argument parsing and command dispatch.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use harrow_client::{ClientAdapter, Deluge, DelugeSettings, Qbittorrent, QbittorrentSettings};
use harrow_config::{ClientConfig, ClientKind, Config, FilterConfig};
use harrow_core::StatusMatcher;
use harrow_engine::Engine;
use harrow_telemetry::LoggingConfig;
use harrow_trackers::{Oracle, Registry};

/// Parses CLI arguments, executes the requested command, and returns the
/// process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        verbosity: cli.verbose,
        json: cli.log_json,
    };
    if let Err(err) = harrow_telemetry::init_logging(&logging) {
        eprintln!("error: {err}");
        return 1;
    }

    match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            1
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Command::Version = cli.command {
        println!("harrow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    match cli.command {
        Command::Clean(args) => {
            let run = prepare(&config, &args)?;
            let summary = run
                .engine
                .clean(run.adapter.as_ref(), &config, &args.client, run.filter)
                .await?;
            info!(
                ignored = summary.ignored,
                removed = summary.removed,
                failures = summary.failures,
                "clean completed"
            );
        }
        Command::Relabel(args) => {
            let run = prepare(&config, &args.action)?;
            let summary = run
                .engine
                .relabel(
                    run.adapter.as_ref(),
                    &config,
                    &args.action.client,
                    run.filter,
                    args.experimental_relabel_for_cross_seeds,
                )
                .await?;
            info!(
                ignored = summary.ignored,
                relabeled = summary.relabeled,
                failures = summary.failures,
                "relabel completed"
            );
        }
        Command::Retag(args) => {
            let run = prepare(&config, &args)?;
            let summary = run
                .engine
                .retag(run.adapter.as_ref(), &config, &args.client, run.filter)
                .await?;
            info!(
                ignored = summary.ignored,
                retagged = summary.retagged,
                failures = summary.failures,
                "retag completed"
            );
        }
        Command::Pause(args) => {
            let run = prepare(&config, &args)?;
            let summary = run
                .engine
                .pause(run.adapter.as_ref(), &config, &args.client, run.filter)
                .await?;
            info!(paused = summary.paused, "pause completed");
        }
        Command::Orphan(args) => {
            let run = prepare(&config, &args)?;
            let summary = run
                .engine
                .orphan(run.adapter.as_ref(), &config, &args.client, run.filter)
                .await?;
            info!(
                removed_files = summary.removed_files,
                removed_dirs = summary.removed_dirs,
                failures = summary.failures,
                "orphan completed"
            );
        }
        Command::Version => unreachable!("handled above"),
    }

    Ok(())
}

struct PreparedRun<'a> {
    engine: Engine,
    adapter: Box<dyn ClientAdapter>,
    filter: &'a FilterConfig,
}

fn prepare<'a>(config: &'a Config, args: &ActionArgs) -> Result<PreparedRun<'a>> {
    let client_cfg = config.client(&args.client)?;

    let filter = match args.filter.as_deref() {
        Some(name) => config.filter(name)?,
        None => config.filter_for_client(&args.client)?,
    };

    let matcher = StatusMatcher::new(&config.tracker_errors.per_tracker_unregistered_statuses);
    let registry = Registry::from_config(&config.trackers);
    let oracle = Oracle::new(matcher, registry);

    let engine = Engine::new(oracle, args.dry_run);
    if args.dry_run {
        warn!("dry-run enabled; no changes will be applied");
    }

    // a second interrupt falls through to the runtime's default abort
    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing current torrent then stopping");
            cancel.store(true, Ordering::Relaxed);
        }
    });

    let adapter = build_adapter(client_cfg)?;
    Ok(PreparedRun {
        engine,
        adapter,
        filter,
    })
}

fn build_adapter(client_cfg: &ClientConfig) -> Result<Box<dyn ClientAdapter>> {
    let adapter: Box<dyn ClientAdapter> = match client_cfg.kind {
        ClientKind::Qbittorrent => Box::new(Qbittorrent::new(QbittorrentSettings {
            url: client_cfg.url.clone().unwrap_or_default(),
            user: client_cfg.user.clone().unwrap_or_default(),
            password: client_cfg.password.clone().unwrap_or_default(),
            enable_auto_tmm_after_relabel: client_cfg.enable_auto_tmm_after_relabel,
        })),
        ClientKind::Deluge => Box::new(Deluge::new(DelugeSettings {
            host: client_cfg.host.clone().unwrap_or_default(),
            port: client_cfg.port.unwrap_or(8112),
            password: client_cfg.password.clone().unwrap_or_default(),
            v2: client_cfg.v2,
        })),
    };
    Ok(adapter)
}

#[derive(Parser)]
#[command(
    name = "harrow",
    about = "Queue reconciler for qBittorrent and Deluge",
    version
)]
pub(crate) struct Cli {
    /// Path to the configuration file.
    #[arg(
        long,
        global = true,
        env = "HARROW_CONFIG",
        default_value = "config.yml"
    )]
    pub config: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Emit JSON logs.
    #[arg(long, global = true)]
    pub log_json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Remove torrents matching the filter's remove rules.
    Clean(ActionArgs),
    /// Relabel torrents by the filter's label rules.
    Relabel(RelabelArgs),
    /// Reconcile tags and upload limits (qBittorrent only).
    Retag(ActionArgs),
    /// Delete files in the download location no torrent owns.
    Orphan(ActionArgs),
    /// Pause torrents matching the filter's pause rules.
    Pause(ActionArgs),
    /// Print the version.
    Version,
}

#[derive(Args)]
pub(crate) struct ActionArgs {
    /// Configured client name.
    pub client: String,
    /// Log what would happen without changing anything.
    #[arg(long)]
    pub dry_run: bool,
    /// Use this filter instead of the client's configured one.
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args)]
pub(crate) struct RelabelArgs {
    #[command(flatten)]
    pub action: ActionArgs,
    /// Relabel cross-seeded torrents by hardlink-cloning their payload
    /// into the label path.
    #[arg(long)]
    pub experimental_relabel_for_cross_seeds: bool,
}
