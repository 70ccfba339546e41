//! `arq probe` – measure connection quality against the ping URL.

use std::time::Duration;

use anyhow::Result;
use arq_core::config::ArqConfig;
use arq_core::monitor::NetworkMonitor;
use arq_core::transport::curl::CurlTransport;
use arq_core::transport::{RequestDescriptor, Transport};

pub async fn run_probe(cfg: &ArqConfig, url: Option<&str>, count: u32) -> Result<()> {
    let transport = CurlTransport::new();
    let monitor = NetworkMonitor::new();
    let target = url.unwrap_or(&cfg.monitor.ping_url);

    for i in 1..=count.max(1) {
        let request = RequestDescriptor::head(target).with_timeout(cfg.monitor.ping_timeout());
        let started = std::time::Instant::now();
        match transport.execute(&request).await {
            Ok(_) => {
                let rtt = started.elapsed();
                monitor.record_probe(Some(rtt));
                println!("probe {i}: {} ms", rtt.as_millis());
            }
            Err(err) => {
                monitor.record_probe(None);
                println!("probe {i}: failed ({err})");
            }
        }
        if i < count {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    let state = monitor.state();
    println!("status: {:?}", state.status);
    if let Some(avg) = monitor.average_ping() {
        println!("average: {} ms", avg.as_millis());
    }
    Ok(())
}
