//! List command - show cached entries and the cache ids bound to them

use crate::cache::{format_bytes, paths, Cache, ContentEntry, LogicalBinding};
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::CacheResult;
use chrono::DateTime;
use console::style;
use serde::Serialize;

/// One entry with the cache ids resolving to it
#[derive(Debug, Serialize)]
struct EntryRow {
    url: String,
    file: String,
    refs: u32,
    bytes: u64,
    last_touch: i64,
    keys: Vec<String>,
}

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> CacheResult<()> {
    let cache = Cache::open(config).await?;
    let rows = rows(cache.entries().await, &cache.bindings().await);

    if rows.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => println!("No cached images."),
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&rows),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Plain => {
            for row in &rows {
                println!("{}", row.url);
            }
        }
    }

    Ok(())
}

fn rows(entries: Vec<ContentEntry>, bindings: &[LogicalBinding]) -> Vec<EntryRow> {
    let mut rows: Vec<EntryRow> = entries
        .into_iter()
        .map(|entry| EntryRow {
            file: paths::content_key(&entry.content_url),
            keys: bindings
                .iter()
                .filter(|b| b.resolved_url == entry.content_url)
                .map(|b| b.logical_key.clone())
                .collect(),
            url: entry.content_url,
            refs: entry.reference_count,
            bytes: entry.byte_size,
            last_touch: entry.last_touch,
        })
        .collect();

    // Most recently used first
    rows.sort_by(|a, b| b.last_touch.cmp(&a.last_touch).then_with(|| a.url.cmp(&b.url)));
    rows
}

fn print_table(rows: &[EntryRow]) {
    println!(
        "{:<50} {:<5} {:<10} {:<17} {}",
        style("URL").bold(),
        style("REFS").bold(),
        style("SIZE").bold(),
        style("LAST USED").bold(),
        style("CACHE IDS").bold()
    );
    println!("{}", "-".repeat(100));

    for row in rows {
        let touched = DateTime::from_timestamp(row.last_touch, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<50} {:<5} {:<10} {:<17} {}",
            truncate(&row.url, 50),
            row.refs,
            format_bytes(row.bytes),
            touched,
            row.keys.join(", ")
        );
    }

    println!();
    println!("Total: {} entr{}", rows.len(), if rows.len() == 1 { "y" } else { "ies" });
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let head: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{head}...")
}
