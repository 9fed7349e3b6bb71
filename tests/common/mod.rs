//! Fake MongoShake collector used by the integration tests.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// How long `/slow` takes to answer
pub const SLOW: Duration = Duration::from_millis(150);

pub const RS0_STATUS: &str = r#"{"replset":"rs0","lsn":{"unix":1000},"lsn_ack":{"unix":990},"logs_get":5,"logs_repl":4,"logs_success":4,"tps":2.5}"#;
const RS1_STATUS: &str = r#"{"replset":"rs1","lsn":{"unix":2000,"ts":"1"},"lsn_ack":{"unix":2005},"logs_get":10,"logs_repl":9,"logs_success":8,"tps":0}"#;

/// Routes:
/// - `/repl/rs0`, `/repl/rs1`: valid status, served without a content type
/// - `/slow`: rs0 status after [`SLOW`]
/// - `/accept`: rs0 status only when `Accept: application/json` is sent, 406 otherwise
/// - `/error`: 500
/// - `/garbage`: 200 with a body that is not JSON
/// - `/incomplete`: 200 with JSON missing most fields
pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Upstream {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let arrivals = Arc::new(Mutex::new(Vec::new()));

        let hits_for_server = hits.clone();
        let arrivals_for_server = arrivals.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let hits = hits_for_server.clone();
                let arrivals = arrivals_for_server.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        arrivals.lock().unwrap().push(Instant::now());
                        hits.fetch_add(1, Ordering::SeqCst);
                        respond(req)
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self { addr, hits, arrivals }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// When each request arrived, in arrival order
    pub fn arrivals(&self) -> Vec<Instant> {
        self.arrivals.lock().unwrap().clone()
    }
}

/// A URL nothing is listening on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/repl", addr)
}

async fn respond(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/repl/rs0" => plain(StatusCode::OK, RS0_STATUS),
        "/repl/rs1" => plain(StatusCode::OK, RS1_STATUS),
        "/slow" => {
            tokio::time::sleep(SLOW).await;
            plain(StatusCode::OK, RS0_STATUS)
        }
        "/accept" => {
            let wants_json = req
                .headers()
                .get(ACCEPT)
                .is_some_and(|value| value == "application/json");
            if wants_json {
                let mut response = plain(StatusCode::OK, RS0_STATUS);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, "application/json".parse().unwrap());
                response
            } else {
                plain(StatusCode::NOT_ACCEPTABLE, "")
            }
        }
        "/error" => plain(StatusCode::INTERNAL_SERVER_ERROR, "internal error"),
        "/garbage" => plain(StatusCode::OK, "<html>not json</html>"),
        "/incomplete" => plain(StatusCode::OK, r#"{"replset":"rs9"}"#),
        _ => plain(StatusCode::NOT_FOUND, ""),
    };
    Ok(response)
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
