//! CLI command implementations

pub mod clear;
pub mod config;
pub mod fetch;
pub mod list;
pub mod reconcile;
pub mod stats;

pub use clear::execute as clear;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use list::execute as list;
pub use reconcile::execute as reconcile;
pub use stats::execute as stats;
