//! `arq head` – fetch response headers for a URL.

use anyhow::{Context, Result};
use arq_core::client::{ArqClient, RequestOptions};
use arq_core::config::ArqConfig;
use arq_core::transport::curl::CurlTransport;
use arq_core::transport::RequestDescriptor;

pub async fn run_head(cfg: &ArqConfig, url: &str) -> Result<()> {
    let client = ArqClient::builder(CurlTransport::new())
        .config(cfg.clone())
        .build();

    let response = client
        .request(RequestDescriptor::head(url), RequestOptions::new())
        .await
        .context("HEAD request failed")?;

    println!("HTTP {}", response.status);
    let mut headers: Vec<_> = response.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        println!("{name}: {value}");
    }
    Ok(())
}
