//! Reconcile command - repair records and files after a crash

use crate::cache::{format_bytes, Cache};
use crate::cli::args::ReconcileArgs;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;

/// Execute the reconcile command
pub async fn execute(args: ReconcileArgs, config: &Config) -> CacheResult<()> {
    let cache = Cache::open(config).await?;
    let report = cache.reconcile(args.dry_run).await?;

    if report.is_clean() {
        println!("{} records and files agree", style("✓").green());
        return Ok(());
    }

    let verb = if args.dry_run { "Would remove" } else { "Removed" };

    for entry in &report.dangling_records {
        println!(
            "  {} record {} (file missing)",
            style("•").red(),
            entry.content_url
        );
    }
    for path in &report.orphan_files {
        println!("  {} file {} (no record)", style("•").red(), path.display());
    }

    println!();
    println!(
        "{} {} record(s) and {} file(s); usage {}",
        verb,
        report.dangling_records.len(),
        report.orphan_files.len(),
        format_bytes(report.usage_bytes)
    );

    Ok(())
}
