//! `arq get` – fetch a URL through the full pipeline.

use std::time::Duration;

use anyhow::{Context, Result};
use arq_core::client::{ArqClient, RequestOptions};
use arq_core::config::ArqConfig;
use arq_core::queue::Priority;
use arq_core::transport::curl::CurlTransport;
use arq_core::transport::RequestDescriptor;

#[allow(clippy::too_many_arguments)]
pub async fn run_get(
    cfg: &ArqConfig,
    url: &str,
    params: &[String],
    cache_ttl: Option<u64>,
    retries: Option<u32>,
    no_retry: bool,
    priority: Priority,
    timeout: Option<u64>,
) -> Result<()> {
    let client = ArqClient::builder(CurlTransport::new())
        .config(cfg.clone())
        .build();

    let mut request = RequestDescriptor::get(url);
    for pair in params {
        let (name, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid --param {pair}, expected NAME=VALUE"))?;
        request = request.with_param(name, value);
    }

    let mut options = RequestOptions::new().priority(priority);
    if let Some(secs) = cache_ttl {
        options = options.cache_ttl(Duration::from_secs(secs));
    }
    if let Some(n) = retries {
        options = options.max_retries(n);
    }
    if no_retry {
        options = options.no_retry();
    }
    if let Some(secs) = timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    let response = client
        .request(request, options)
        .await
        .context("request failed")?;

    println!("HTTP {}", response.status);
    match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", response.text()),
    }
    Ok(())
}
