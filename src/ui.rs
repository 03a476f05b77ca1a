use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::models::{CleanReport, ProgressReport};

pub fn print_banner() {
    println!("==================================================");
    println!(" m3u-sweeper {} - playlist cleaner", env!("CARGO_PKG_VERSION"));
    println!(" duplicate removal | dead stream detection");
    println!("==================================================");
    println!();
}

/// Renders scheduler progress reports on a single progress bar.
///
/// The bar is sized lazily from the first report so one renderer can serve
/// several probe passes in sequence.
pub async fn render_progress(mut reports: UnboundedReceiver<ProgressReport>) {
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut sized = false;
    let mut current_total = 0;
    while let Some(report) = reports.recv().await {
        if report.total == 0 {
            continue;
        }
        if !sized {
            bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            sized = true;
        }
        if report.total != current_total {
            current_total = report.total;
            bar.set_length(current_total as u64);
            bar.set_position(0);
        }
        bar.set_position(report.processed() as u64);
        bar.set_message(format!(
            "{} up, {} down - {}",
            report.working, report.not_working, report.activity_label
        ));
    }
    if sized {
        bar.finish_and_clear();
    }
}

pub fn print_report(report: &CleanReport, cancelled: bool) {
    println!();
    if cancelled {
        println!("{}", "Run cancelled, partial results:".yellow().bold());
    } else {
        println!("{}", "Cleaning finished:".green().bold());
    }
    println!("  {:<22} {}", "Channels in source:".bold(), report.original_count);
    println!("  {:<22} {}", "Duplicates removed:".bold(), report.doubles_removed);
    println!("  {:<22} {}", "After dedup:".bold(), report.total_after_dedupe);
    println!(
        "  {:<22} {}",
        "Working channels:".bold(),
        report.working_count.to_string().green()
    );
    println!("  {:<22} {}", "Groups:".bold(), report.group_count);
}
