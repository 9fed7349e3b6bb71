use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::exporter::{wait_for_shutdown, ReplicationMetrics};

/// Outcome of one poll of every target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
}

/// Polls the collectors' status endpoints and publishes what they return.
pub struct Poller {
    client: Client,
    targets: Vec<String>,
    interval: Duration,
    max_concurrent_fetches: Option<usize>,
    metrics: Arc<ReplicationMetrics>,
}

impl Poller {
    pub fn new(
        client: Client,
        targets: Vec<String>,
        interval: Duration,
        metrics: Arc<ReplicationMetrics>,
    ) -> Self {
        Self {
            client,
            targets,
            interval,
            max_concurrent_fetches: None,
            metrics,
        }
    }

    /// Caps the number of in-flight fetches per tick. `None` fetches every target at once.
    pub fn with_max_concurrent_fetches(mut self, limit: Option<usize>) -> Self {
        self.max_concurrent_fetches = limit.map(|limit| limit.max(1));
        self
    }

    /// Polls until shutdown is requested.
    ///
    /// The interval is slept after a tick's fetches have all resolved, so slow
    /// targets push later ticks back.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let report = tokio::select! {
                report = self.run_tick() => report,
                _ = wait_for_shutdown(&mut shutdown) => break,
            };
            debug!(
                attempted = report.attempted,
                published = report.published,
                failed = report.failed,
                "tick complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("poller stopped");
    }

    /// Fetches every target once and publishes each successful response as soon as it arrives.
    pub async fn run_tick(&self) -> TickReport {
        let scrapes: Vec<_> = self
            .targets
            .iter()
            .map(|url| self.scrape(url.clone()))
            .collect();

        let outcomes: Vec<bool> = match self.max_concurrent_fetches {
            Some(limit) => stream::iter(scrapes).buffer_unordered(limit).collect().await,
            None => join_all(scrapes).await,
        };

        let published = outcomes.iter().filter(|ok| **ok).count();
        TickReport {
            attempted: outcomes.len(),
            published,
            failed: outcomes.len() - published,
        }
    }

    async fn scrape(&self, url: String) -> bool {
        let result = fetch_status(&self.client, &url)
            .await
            .and_then(|body| self.metrics.publish(&body, &url));

        match result {
            Ok(()) => true,
            Err(ScrapeError::Status(status)) => {
                warn!(url = %url, status = status.as_u16(), "failed to fetch replication status");
                false
            }
            Err(err) => {
                warn!(url = %url, error = %err, "failed to scrape replication status");
                false
            }
        }
    }
}

/// GETs a collector status endpoint and parses the body as JSON.
///
/// Only a 200 counts as success. The declared content type is not checked,
/// collectors commonly send JSON as `text/plain`.
pub async fn fetch_status(client: &Client, url: &str) -> Result<Value, ScrapeError> {
    let response = client
        .get(url)
        .header(ACCEPT, "application/json")
        .send()
        .await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(ScrapeError::Status(status));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(ScrapeError::MalformedBody)
}

/// Trims the configured target list and drops empty entries. Duplicates are kept.
pub fn normalize_targets<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|target| target.as_ref().trim().to_string())
        .filter(|target| !target.is_empty())
        .collect()
}
