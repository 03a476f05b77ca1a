mod cli;
mod config;
mod errors;
mod models;
mod services;
mod ui;

use std::process::exit;

use clap::Parser;
use colored::Colorize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::CliArgs;
use crate::config::Config;
use crate::services::engine::SweepEngine;

const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }
    init_logging(args.verbose);

    ui::print_banner();

    let config = Config::from_args(args);
    info!(
        sources = config.sources.len(),
        concurrency = config.concurrency,
        timeout_secs = config.timeout_secs,
        "starting cleaning run"
    );

    let cancel = CancellationToken::new();
    spawn_ct_watcher(cancel.clone());

    let engine = match SweepEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            error!("failed to initialize: {err:#}");
            eprintln!("{} {err:#}", "Error:".red().bold());
            exit(1);
        }
    };

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(ui::render_progress(progress_rx));

    let result = engine.run(progress_tx, cancel.clone()).await;
    let _ = renderer.await;

    match result {
        Ok(report) => {
            let cancelled = cancel.is_cancelled();
            ui::print_report(&report, cancelled);
            if cancelled {
                exit(EXIT_CANCELLED);
            }
        }
        Err(err) => {
            error!("cleaning run failed: {err}");
            eprintln!("{} {err}", "Error:".red().bold());
            exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "m3u_sweeper=debug"
    } else {
        "m3u_sweeper=warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn spawn_ct_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("caught interrupt signal, finishing up");
        cancel.cancel();
    });
}
