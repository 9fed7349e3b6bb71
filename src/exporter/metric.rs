use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use serde_json::Value;
use std::sync::Arc;
use tracing::error;

use crate::error::ScrapeError;
use crate::snapshot::ReplicationSnapshot;

/// Label names shared by every replication gauge
const LABELS: [&str; 2] = ["replset", "url"];

/// The gauges published for each collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationGauge {
    LogsGet,
    LogsRepl,
    LogsSuccess,
    Tps,
    ReplicationLatency,
    LsnUnix,
    LsnAckUnix,
    LsnCkptUnix,
}

impl ReplicationGauge {
    pub const ALL: [ReplicationGauge; 8] = [
        ReplicationGauge::LogsGet,
        ReplicationGauge::LogsRepl,
        ReplicationGauge::LogsSuccess,
        ReplicationGauge::Tps,
        ReplicationGauge::ReplicationLatency,
        ReplicationGauge::LsnUnix,
        ReplicationGauge::LsnAckUnix,
        ReplicationGauge::LsnCkptUnix,
    ];

    /// Exposed metric name
    pub fn name(self) -> &'static str {
        match self {
            ReplicationGauge::LogsGet => "mongoshake_logs_get",
            ReplicationGauge::LogsRepl => "mongoshake_logs_repl",
            ReplicationGauge::LogsSuccess => "mongoshake_logs_success",
            ReplicationGauge::Tps => "mongoshake_tps",
            ReplicationGauge::ReplicationLatency => "mongoshake_replication_latency",
            ReplicationGauge::LsnUnix => "mongoshake_lsn_seconds",
            ReplicationGauge::LsnAckUnix => "mongoshake_lsn_ack_seconds",
            ReplicationGauge::LsnCkptUnix => "mongoshake_lsn_ckpt_seconds",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            ReplicationGauge::LogsGet => "Number of logs (get)",
            ReplicationGauge::LogsRepl => "Number of logs (repl)",
            ReplicationGauge::LogsSuccess => "Number of successful logs",
            ReplicationGauge::Tps => "Transactions per second",
            ReplicationGauge::ReplicationLatency => "Replication_latency in seconds",
            ReplicationGauge::LsnUnix => "unix time in Log Sequence Number",
            ReplicationGauge::LsnAckUnix => "unix time in Acked Log Sequence Number",
            ReplicationGauge::LsnCkptUnix => "unix time in checkpointed Log Sequence Number",
        }
    }

    fn value_of(self, snapshot: &ReplicationSnapshot) -> f64 {
        match self {
            ReplicationGauge::LogsGet => snapshot.logs_get,
            ReplicationGauge::LogsRepl => snapshot.logs_repl,
            ReplicationGauge::LogsSuccess => snapshot.logs_success,
            ReplicationGauge::Tps => snapshot.tps,
            ReplicationGauge::ReplicationLatency => snapshot.replication_latency() as f64,
            ReplicationGauge::LsnUnix => snapshot.lsn_unix() as f64,
            ReplicationGauge::LsnAckUnix => snapshot.lsn_ack_unix() as f64,
            ReplicationGauge::LsnCkptUnix => snapshot.lsn_ckpt_unix() as f64,
        }
    }
}

/// Prometheus registry holding the MongoShake replication gauges
///
/// The registry is private to this struct, so no default process collectors
/// end up in the exposition.
#[derive(Debug, Clone)]
pub struct ReplicationMetrics {
    /// One gauge vector per [`ReplicationGauge`], in `ReplicationGauge::ALL` order
    gauges: Vec<GaugeVec>,
    /// Prometheus registry
    registry: Arc<Registry>,
}

impl ReplicationMetrics {
    /// Creates the registry and registers every replication gauge
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let mut gauges = Vec::with_capacity(ReplicationGauge::ALL.len());
        for gauge in ReplicationGauge::ALL {
            let vec = GaugeVec::new(Opts::new(gauge.name(), gauge.help()), &LABELS)?;
            registry.register(Box::new(vec.clone()))?;
            gauges.push(vec);
        }

        Ok(Self { gauges, registry })
    }

    /// Validates a status document fetched from `url` and publishes it.
    ///
    /// Nothing is written when validation fails.
    pub fn publish(&self, body: &Value, url: &str) -> Result<(), ScrapeError> {
        let snapshot = ReplicationSnapshot::from_value(body).map_err(ScrapeError::InvalidSnapshot)?;
        self.record(&snapshot, url);
        Ok(())
    }

    /// Overwrites all eight gauges labeled `(snapshot.replset, url)`
    pub fn record(&self, snapshot: &ReplicationSnapshot, url: &str) {
        let labels = [snapshot.replset.as_str(), url];
        for gauge in ReplicationGauge::ALL {
            self.gauges[gauge as usize]
                .with_label_values(&labels)
                .set(gauge.value_of(snapshot));
        }
    }

    /// Last published value for a label pair, `None` if it was never written
    pub fn value(&self, gauge: ReplicationGauge, replset: &str, url: &str) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == gauge.name())
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                metric.get_label().iter().all(|pair| match pair.get_name() {
                    "replset" => pair.get_value() == replset,
                    "url" => pair.get_value() == url,
                    _ => false,
                })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Gets metrics data in Prometheus text format
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder.encode_to_string(&metric_families).unwrap_or_else(|e| {
            error!(error = %e, "failed to encode metrics");
            String::new()
        })
    }
}

/// HTTP server to expose /metrics endpoint
pub mod http_server {
    use super::*;
    use anyhow::Context;
    use http_body_util::Full;
    use hyper::body::Bytes;
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::service_fn;
    use hyper::{Method, Request, Response, StatusCode};
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use hyper_util::server::conn::auto::Builder;
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;
    use tokio::sync::watch;
    use tracing::{debug, info, warn};

    use crate::exporter::wait_for_shutdown;

    /// Text exposition format 0.0.4, as written by `TextEncoder`
    pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

    const INDEX_PAGE: &str = r#"<html>
<head><title>MongoShake Exporter</title></head>
<body>
<h1>MongoShake Exporter</h1>
<p><a href='/metrics'>Metrics</a></p>
</body>
</html>"#;

    /// Binds the metrics listener. Failing here is a startup error.
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind metrics server on {}", addr))
    }

    /// Serves the registry until `shutdown` flips to true
    pub async fn serve(
        metrics: Arc<ReplicationMetrics>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let metrics = metrics.clone();

                            tokio::task::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    handle_request(req, metrics.clone())
                                });

                                if let Err(err) = Builder::new(TokioExecutor::new())
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!(%peer, error = %err, "error serving metrics connection");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to accept metrics connection");
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!("metrics server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_request(
        req: Request<hyper::body::Incoming>,
        metrics: Arc<ReplicationMetrics>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, "/metrics") => {
                respond(StatusCode::OK, METRICS_CONTENT_TYPE, metrics.gather())
            }
            (&Method::GET, "/") => respond(StatusCode::OK, "text/html", INDEX_PAGE),
            _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
        };
        Ok(response)
    }

    fn respond(
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(body.into()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        response
    }
}
