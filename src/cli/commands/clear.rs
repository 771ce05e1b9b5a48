//! Clear command - remove every cached image

use crate::cache::{format_bytes, Cache};
use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;
use std::io::{self, Write};

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> CacheResult<()> {
    let cache = Cache::open(config).await?;
    let stats = cache.stats().await;

    if stats.entries == 0 {
        println!("Cache is already empty.");
        return Ok(());
    }

    println!(
        "This will remove {} cached image(s) ({}) from {}",
        stats.entries,
        format_bytes(stats.usage_bytes),
        cache.dir().display()
    );

    if !args.yes {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = cache.clear().await?;
    println!("{} cleared {} image(s)", style("✓").green(), removed);

    Ok(())
}
