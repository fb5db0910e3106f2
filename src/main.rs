use clap::Parser;
use linekv::config::{Cli, Config};
use linekv::server::{self, Server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_path(path).map_err(|e| {
            eprintln!("*** FATAL CONFIG FILE ERROR ***\n{e}");
            e
        })?,
        None => Config::default(),
    };

    let _file_guard = init_logging(&config);

    let server = Arc::new(Server::new(config));
    if let Err(e) = server.load_snapshot() {
        tracing::error!(error = %e, "fatal error loading snapshot, exiting");
        std::process::exit(1);
    }

    tokio::select! {
        result = server::run(Arc::clone(&server)) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "server loop exited with an error");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received interrupt, saving DB before exit...");
            if let Err(e) = server.save_foreground() {
                tracing::warn!(error = %e, "error trying to save the DB on shutdown");
            }
        }
    }

    Ok(())
}

/// Wires up `tracing` the way `kaspa-stratum-bridge`'s `main.rs` does: a
/// registry with an `EnvFilter` layer (falling back to the config's
/// `loglevel` directive when `RUST_LOG` is unset) plus a console fmt
/// layer, and an optional non-blocking file layer when `logfile` names a
/// path. The returned guard must be kept alive for the process lifetime
/// or buffered log lines are dropped.
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = format!("{}", config.loglevel).to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match &config.logfile {
        None => {
            tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
            None
        }
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let filename = path.file_name().unwrap_or_else(|| std::ffi::OsStr::new("linekv.log"));
            let appender = tracing_appender::rolling::never(dir, filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
            Some(guard)
        }
    }
}
