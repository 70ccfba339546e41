//! CLI for the ARQ request pipeline.

mod commands;

use anyhow::Result;
use arq_core::config;
use arq_core::queue::Priority;
use clap::{Parser, Subcommand, ValueEnum};

use commands::{run_completions, run_config, run_get, run_head, run_probe};

/// Top-level CLI for the ARQ request pipeline.
#[derive(Debug, Parser)]
#[command(name = "arq")]
#[command(about = "ARQ: resilient request pipeline (retry, cache, offline replay)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Dispatch priority on the request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::High => Priority::High,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Issue a GET request through the full pipeline.
    Get {
        /// Direct HTTP/HTTPS URL.
        url: String,

        /// Query parameter as NAME=VALUE; repeatable.
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,

        /// Cache the response for this many seconds.
        #[arg(long, value_name = "SECS")]
        cache_ttl: Option<u64>,

        /// Retries after the first attempt (default from config).
        #[arg(long, value_name = "N")]
        retries: Option<u32>,

        /// Disable retries entirely.
        #[arg(long)]
        no_retry: bool,

        #[arg(long, value_enum, default_value_t = PriorityArg::Normal)]
        priority: PriorityArg,

        /// Transport timeout in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Issue a HEAD request and print the response headers.
    Head {
        /// Direct HTTP/HTTPS URL.
        url: String,
    },

    /// Measure connection quality against the ping URL.
    Probe {
        /// Probe target (default: the configured ping URL).
        url: Option<String>,

        /// Number of probes to run.
        #[arg(long, default_value = "3", value_name = "N")]
        count: u32,
    },

    /// Print the effective configuration and its file path.
    Config,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // Completions need no config and must not create the default file.
        if let CliCommand::Completions { shell } = &cli.command {
            run_completions(*shell);
            return Ok(());
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                params,
                cache_ttl,
                retries,
                no_retry,
                priority,
                timeout,
            } => {
                run_get(
                    &cfg,
                    &url,
                    &params,
                    cache_ttl,
                    retries,
                    no_retry,
                    priority.into(),
                    timeout,
                )
                .await?
            }
            CliCommand::Head { url } => run_head(&cfg, &url).await?,
            CliCommand::Probe { url, count } => run_probe(&cfg, url.as_deref(), count).await?,
            CliCommand::Config => run_config(&cfg)?,
            CliCommand::Completions { .. } => unreachable!("handled above"),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
