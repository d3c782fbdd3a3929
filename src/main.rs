use beacon_telemetry::app::{Options, run_with_io};
use beacon_telemetry::driver::driver_for;
use clap::Parser;
use std::panic::{self, PanicHookInfo};
use tracing_subscriber::EnvFilter;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// Log to stderr so stdout carries only line protocol. `RUST_LOG` overrides
/// the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        // Without a signal handler the only way out is the process being killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd, Telegraf execd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(options.verbose);

    let driver = driver_for(options.backend, &options.roster());
    tracing::info!(backend = %options.backend, "starting scanner");

    let mut stdout = std::io::stdout();
    match run_with_io(options, driver, &mut stdout, shutdown_signal()).await {
        Ok(stats) => {
            tracing::info!(
                updated = stats.updated,
                dropped = stats.dropped,
                "exiting"
            );
            std::process::exit(EXIT_SUCCESS)
        }
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
