//! peer-metadata-fetcher - Main entry point
//!
//! Fetches the info dictionary for a torrent from one peer and prints it.

use anyhow::{Context, Result};
use peer_metadata_fetcher::cli::report::print_error;
use peer_metadata_fetcher::{CliArgs, FetchConfig, FetchTarget, MetadataFetcher, Report, TorrentError};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    if let Err(e) = run(&args).await {
        debug!("Fetch failed: {:?}", e);
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(args: &CliArgs) -> Result<()> {
    let target = FetchTarget::parse(&args.target).context("Invalid target")?;
    if let Some(name) = &target.display_name {
        info!("Magnet display name: {}", name);
    }

    let config = FetchConfig::from_args(args);
    config.validate().context("Invalid configuration")?;

    let addr = resolve_peer(&args.peer).await?;

    let started = Instant::now();
    let result = MetadataFetcher::new(target.info_hash, addr, config)
        .fetch()
        .await
        .with_context(|| format!("Failed to fetch metadata for {} from {}", target.info_hash_hex(), addr))?;
    let elapsed = started.elapsed();

    let peer = addr.to_string();
    let mut report = Report::stdout(args.is_quiet());
    if args.json {
        report.print_json(&result, &peer, elapsed)?;
    } else {
        report.print_summary(&result, &peer, elapsed)?;
    }
    Ok(())
}

/// Resolve `host:port` to the first socket address it names
async fn resolve_peer(peer: &str) -> Result<SocketAddr> {
    if let Ok(addr) = peer.parse::<SocketAddr>() {
        return Ok(addr);
    }

    debug!("Resolving peer address: {}", peer);
    let mut addrs = tokio::net::lookup_host(peer)
        .await
        .map_err(|e| TorrentError::network_error_full("Failed to resolve peer address", peer, e.to_string()))?;
    let addr = addrs
        .next()
        .ok_or_else(|| TorrentError::validation_error_with_field(format!("No address found for {}", peer), "peer"))?;
    debug!("Resolved {} to {}", peer, addr);
    Ok(addr)
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level: {:?}", level);
}
