//! Prometheus exporter for MongoShake replication status.
//!
//! A [`Poller`](exporter::Poller) fetches the `/repl` JSON of every configured
//! collector on a fixed interval and feeds it to [`ReplicationMetrics`](exporter::ReplicationMetrics),
//! which is served on `/metrics` by [`http_server`](exporter::http_server).

pub mod error;
pub mod exporter;
pub mod snapshot;
