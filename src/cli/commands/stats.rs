//! Stats command - usage against the configured budget

use crate::cache::{format_bytes, Cache, CacheSizeStatus, CacheStats};
use crate::config::Config;
use crate::error::CacheResult;
use console::style;

/// Execute the stats command
pub async fn execute(config: &Config) -> CacheResult<()> {
    let cache = Cache::open(config).await?;
    let stats = cache.stats().await;

    println!("{}", style("Image cache").cyan().bold());
    println!();
    println!("  {:<12} {}", "Directory", cache.dir().display());
    println!("  {:<12} {}", "Entries", stats.entries);
    println!("  {:<12} {}", "Cache ids", stats.bindings);
    println!("  {:<12} {}", "Usage", usage_line(&stats));

    Ok(())
}

fn usage_line(stats: &CacheStats) -> String {
    let percent = CacheSizeStatus::percentage(stats.usage_bytes, stats.budget_bytes);
    let text = format!(
        "{} / {} ({:.0}%)",
        format_bytes(stats.usage_bytes),
        format_bytes(stats.budget_bytes),
        percent
    );

    match stats.status() {
        CacheSizeStatus::Ok => style(text).green().to_string(),
        CacheSizeStatus::Warning => style(text).yellow().to_string(),
        CacheSizeStatus::Exceeded => style(text).red().to_string(),
    }
}
