//! policyd command line tool
//!
//! Runs the configuration core as a daemon, or validates a file with `--check`.

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};

use policyd::client::{Client, ClientOptions};
use policyd::common::{init_logger, PolicyError, Result};
use policyd::config::{defaults, ConfigStore, JsonFileStore, ServerAddress, Validator, WatcherOptions};
use policyd::subsystems::host::HostProcessMonitor;
use policyd::subsystems::MonitorProbe;
use policyd::{APP_NAME, VERSION};

/// Runtime configuration and policy reconciliation for the filtering daemon
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file
    #[clap(long, env = "POLICYD_CONFIG", default_value = defaults::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// UI socket address used when the file has none (unix:///path or host:port)
    #[clap(long, env = "POLICYD_SOCKET", default_value = defaults::SERVER_ADDRESS_STR)]
    socket: String,

    /// Log level
    #[clap(long, env = "POLICYD_LOG_LEVEL", default_value = defaults::LOG_LEVEL_STR)]
    log_level: String,

    /// Poll interval in milliseconds (defaults to the firewall monitor interval)
    #[clap(long, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval: Option<u64>,

    /// Debounce window in milliseconds
    #[clap(long, default_value_t = defaults::WATCH_DEBOUNCE.as_millis() as u64)]
    debounce: u64,

    /// Poll only, without filesystem notifications
    #[clap(long)]
    no_notify: bool,

    /// Log invalid fields without writing the corrected file back
    #[clap(long)]
    no_persist_fallbacks: bool,

    /// Validate the file, print fallbacks and exit (status 1 if any field fell back)
    #[clap(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level);

    if args.check {
        let clean = check(&args)?;
        exit(if clean { 0 } else { 1 });
    }

    info!("Starting {} v{}", APP_NAME, VERSION);
    info!("Configuration file: {}", args.config.display());

    let options = ClientOptions {
        persist_fallbacks: !args.no_persist_fallbacks,
        watcher: WatcherOptions {
            poll_interval: args.poll_interval.map(Duration::from_millis),
            debounce: Duration::from_millis(args.debounce),
            use_notify: !args.no_notify,
            ..WatcherOptions::default()
        },
    };

    let client = Client::builder(&args.socket, &args.config)
        .process_monitor(Arc::new(HostProcessMonitor::detect()))
        .options(options)
        .build()?;

    if let Some(report) = client.last_report() {
        if !report.fallbacks.is_empty() {
            warn!("{} field(s) fell back to defaults", report.fallbacks.len());
        }
        for e in &report.downstream_errors {
            error!("{}", e);
        }
    }

    info!(
        "Policy: monitor={} firewall={} action={} duration={} intercept_unknown={} ui={}",
        client.proc_monitor_method(),
        client.firewall_type(),
        client.default_action(),
        client.default_duration(),
        client.intercept_unknown(),
        client.server_address()
    );

    let watching = client.start_watching();
    info!("{} ready, press Ctrl+C to stop", APP_NAME);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    watching.stop().await;

    Ok(())
}

/// Dry run: load and validate without publishing or saving
fn check(args: &Args) -> Result<bool> {
    let default_address: ServerAddress = args
        .socket
        .parse()
        .map_err(|e| PolicyError::Config(format!("invalid socket address: {}", e)))?;

    let store = JsonFileStore::new(&args.config);
    let loaded = store.load()?;

    let monitor = HostProcessMonitor::detect();
    let probe = MonitorProbe(&monitor);
    let outcome = Validator::new(&probe)
        .with_default_address(default_address)
        .validate(&loaded.raw);

    println!("{}: {} field(s) fell back", store.path().display(), outcome.fallbacks.len());
    for fallback in &outcome.fallbacks {
        println!("  {}", fallback);
    }

    Ok(outcome.is_clean())
}
