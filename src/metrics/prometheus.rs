//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "klaudio_operator_reconciliations_total",
        "Total number of reconciliations",
        &["kind"]
    ).unwrap();

    /// Total number of reconciliation errors
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "klaudio_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "klaudio_operator_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Provisioner passes by outcome
    pub static ref PROVISIONS_TOTAL: CounterVec = register_counter_vec!(
        "klaudio_operator_provisions_total",
        "Total number of provisioner passes by outcome",
        &["outcome", "provisioner"]
    ).unwrap();

    /// Currently managed resources
    pub static ref MANAGED_RESOURCES: GaugeVec = register_gauge_vec!(
        "klaudio_operator_managed_resources",
        "Number of managed resources by kind",
        &["kind"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "klaudio_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Serve `/metrics`, `/healthz`, and `/readyz` on the given port
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(port, "metrics endpoint ready");

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let served = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(route))
                .await;
            if let Err(e) = served {
                error!(peer = %peer, "metrics connection error: {e}");
            }
        });
    }
}

// Health and readiness share one answer: the process is up once the server
// accepts connections, so both probes collapse into the same plain response.
async fn route(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    Ok(match req.uri().path() {
        "/metrics" => render_metrics(),
        "/healthz" | "/health" | "/readyz" | "/ready" => plain(StatusCode::OK, "ok"),
        _ => plain(StatusCode::NOT_FOUND, "not found"),
    })
}

fn render_metrics() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", encoder.format_type())
            .body(Full::new(Bytes::from(buffer)))
            .unwrap(),
        Err(e) => {
            error!("unable to encode metrics: {e}");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed")
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}
