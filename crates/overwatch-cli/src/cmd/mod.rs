pub mod config;
pub mod feed;
pub mod generate;
pub mod run;
pub mod serve;

use anyhow::Context;
use overwatch_core::Config;
use std::path::Path;

/// Load the config file (defaults when absent) with environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load(path).with_context(|| format!("failed to load config {}", path.display()))
}
