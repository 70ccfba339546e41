//! `arq config` – print the effective configuration.

use anyhow::Result;
use arq_core::config::{self, ArqConfig};

pub fn run_config(cfg: &ArqConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
