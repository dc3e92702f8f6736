//! Minimal HTTP/1 GET transport.
//!
//! Health probes and metric queries only ever issue a single bounded
//! GET and look at the status and body, so a raw hyper connection per
//! request is all that is needed. `https://` URIs are wrapped in rustls
//! with the Mozilla root store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use rustls::pki_types::ServerName;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

/// Result type alias for HTTP transport operations.
pub type HttpResult<T> = Result<T, HttpError>;

/// Transport-level failures. A non-2xx status is not an error here.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid uri {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("unsupported scheme in {0:?}: only http:// and https:// are supported")]
    UnsupportedScheme(String),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls config error: {0}")]
    TlsConfig(#[source] rustls::Error),

    #[error("tls handshake with {addr} failed: {source}")]
    Tls {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("failed to build request: {0}")]
    Build(#[from] http::Error),

    #[error("request failed: {0}")]
    Request(#[source] hyper::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Status and full body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Issue a GET against `uri`, bounded end to end by `timeout`.
pub async fn get(uri: &str, timeout: Duration) -> HttpResult<HttpResponse> {
    let target = Target::parse(uri)?;

    match tokio::time::timeout(timeout, send(&target)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%uri, ?timeout, "http request timed out");
            Err(HttpError::Timeout(timeout))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheme {
    Http,
    Https,
}

/// Connection details extracted from a URI.
#[derive(Debug, PartialEq, Eq)]
struct Target {
    scheme: Scheme,
    host: String,
    port: u16,
    authority: String,
    path_and_query: String,
}

impl Target {
    fn parse(uri: &str) -> HttpResult<Self> {
        let parsed: Uri = uri.parse().map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;

        let (scheme, default_port) = match parsed.scheme_str() {
            Some("http") => (Scheme::Http, 80),
            Some("https") => (Scheme::Https, 443),
            _ => return Err(HttpError::UnsupportedScheme(uri.to_string())),
        };

        let authority = parsed.authority().ok_or_else(|| HttpError::InvalidUri {
            uri: uri.to_string(),
            reason: "missing host".to_string(),
        })?;

        Ok(Self {
            scheme,
            host: authority.host().to_string(),
            port: authority.port_u16().unwrap_or(default_port),
            authority: authority.as_str().to_string(),
            path_and_query: parsed
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
        })
    }
}

async fn send(target: &Target) -> HttpResult<HttpResponse> {
    let addr = format!("{}:{}", target.host, target.port);
    let stream = TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| HttpError::Connect {
            addr: addr.clone(),
            source,
        })?;

    match target.scheme {
        Scheme::Http => exchange(stream, target, &addr).await,
        Scheme::Https => {
            let server_name = ServerName::try_from(target.host.as_str())
                .map_err(|e| HttpError::InvalidUri {
                    uri: addr.clone(),
                    reason: e.to_string(),
                })?
                .to_owned();
            let connector = TlsConnector::from(tls_config()?);
            let stream = connector
                .connect(server_name, stream)
                .await
                .map_err(|source| HttpError::Tls {
                    addr: addr.clone(),
                    source,
                })?;
            exchange(stream, target, &addr).await
        }
    }
}

fn tls_config() -> HttpResult<Arc<rustls::ClientConfig>> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config =
        rustls::ClientConfig::builder_with_provider(rustls::crypto::ring::default_provider().into())
            .with_safe_default_protocol_versions()
            .map_err(HttpError::TlsConfig)?
            .with_root_certificates(root_store)
            .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Run one GET over an established (plain or TLS) stream.
async fn exchange<S>(stream: S, target: &Target, addr: &str) -> HttpResult<HttpResponse>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(HttpError::Handshake)?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    let req = Request::builder()
        .method(Method::GET)
        .uri(target.path_and_query.as_str())
        .header(HOST, target.authority.as_str())
        .header(USER_AGENT, concat!("canary/", env!("CARGO_PKG_VERSION")))
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await.map_err(HttpError::Request)?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(HttpError::Request)?
        .to_bytes();

    debug!(%addr, %status, bytes = body.len(), "http response received");
    Ok(HttpResponse { status, body })
}
