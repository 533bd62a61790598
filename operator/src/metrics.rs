use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{Encoder, TextEncoder};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Serves the process-wide default Prometheus registry. Every
/// [`crate::util::metrics::ControllerMetrics`] instance registers itself
/// into this registry on construction, so `/metrics` reflects whichever
/// of the three controllers are currently leading without this module
/// needing to know about them.
async fn serve(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return Ok(Response::builder()
            .status(500)
            .body(Body::from("failed to encode metrics"))
            .unwrap());
    }
    Ok(Response::new(Body::from(buffer)))
}

pub async fn run_server(port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(serve)) });
    println!("metrics server listening on {addr}");
    if let Err(e) = Server::bind(&addr).serve(make_svc).await {
        eprintln!("metrics server error: {e}");
    }
}
