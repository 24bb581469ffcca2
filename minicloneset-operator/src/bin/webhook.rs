//! MiniCloneSet conversion webhook server.
//!
//! Serves `POST /convert` for the API server's CRD conversion calls, plus
//! `/healthz` and `/readyz`, over TLS.

use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use minicloneset_operator::crd::{SchemeRegistry, CONVERT_PATH};
use minicloneset_operator::webhook::{self, ConversionReview};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "minicloneset-webhook")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTPS port to listen on
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    port: u16,

    /// PEM certificate chain
    #[arg(long, env = "TLS_CERT_FILE", default_value = "/certs/tls.crt")]
    tls_cert: PathBuf,

    /// PEM private key
    #[arg(long, env = "TLS_KEY_FILE", default_value = "/certs/tls.key")]
    tls_key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("minicloneset_operator=info".parse()?)
                .add_directive("minicloneset_webhook=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        port = args.port,
        tls_cert = %args.tls_cert.display(),
        tls_key = %args.tls_key.display(),
        "Starting MiniCloneSet conversion webhook"
    );

    let cert_pem = fs::read(&args.tls_cert).await?;
    let key_pem = fs::read(&args.tls_key).await?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice()).collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", args.tls_key.display()))?;

    let mut tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    let tls_acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(tls_config));

    let registry = Arc::new(SchemeRegistry::new());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Webhook server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let acceptor = tls_acceptor.clone();
        let registry = registry.clone();

        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let io = hyper_util::rt::TokioIo::new(tls_stream);
            let service = hyper::service::service_fn(move |req| {
                let registry = registry.clone();
                async move { handle_request(&registry, req).await }
            });

            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                error!(peer = %peer, error = %e, "Connection error");
            }
        });
    }
}

async fn handle_request(
    registry: &SchemeRegistry,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::POST, CONVERT_PATH) => convert(registry, req).await,
        (&Method::GET, "/healthz") => build_response(StatusCode::OK, "OK"),
        (&Method::GET, "/readyz") => build_response(StatusCode::OK, "Ready"),
        _ => build_response(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

async fn convert(
    registry: &SchemeRegistry,
    req: Request<hyper::body::Incoming>,
) -> Response<Full<Bytes>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return build_response(StatusCode::BAD_REQUEST, "Failed to read request body");
        }
    };

    let review: ConversionReview = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            warn!(error = %e, "Failed to parse ConversionReview");
            return build_response(StatusCode::BAD_REQUEST, "Invalid ConversionReview");
        }
    };

    let answer = match webhook::review(registry, review) {
        Ok(answer) => answer,
        Err(e) => {
            warn!(error = %e, "Rejected ConversionReview");
            return build_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match serde_json::to_vec(&answer) {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(json)))
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build conversion response");
                build_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to build response")
            }),
        Err(e) => {
            error!(error = %e, "Failed to serialize ConversionReview");
            build_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to serialize response")
        }
    }
}

fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build response");
            Response::new(Full::new(Bytes::from("Internal Error")))
        })
}
