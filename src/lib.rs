//! imgcache - reference-counted disk cache for remote images
//!
//! Downloads images on demand, shares one file between every cache id that
//! resolves to the same URL and keeps the cache directory under a size
//! budget.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;

pub use error::{CacheError, CacheResult};
