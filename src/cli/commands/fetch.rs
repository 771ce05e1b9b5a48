//! Fetch command - load one image under a cache id

use crate::cache::{format_bytes, Cache, LoadState};
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::CacheResult;
use console::style;

/// Execute the fetch command
///
/// An image that cannot be obtained is reported as unloaded, not as an
/// error: the caller falls back to the original URL or a placeholder.
pub async fn execute(args: FetchArgs, config: &Config) -> CacheResult<()> {
    let cache = Cache::open(config).await?;
    let state = cache.fetch(&args.key, &args.url).await?;

    match state {
        LoadState::LoadedLocal(path) => {
            println!("{} {}", style("[LOADED]").green(), path.display());
            println!(
                "  usage {} of {}",
                format_bytes(cache.usage()),
                format_bytes(cache.budget_bytes())
            );
        }
        LoadState::Unloaded | LoadState::Loading => {
            println!("{} {}", style("[UNLOADED]").yellow(), args.url);
        }
    }

    Ok(())
}
