//! Sends `DavRequest` values over HTTP/1.1 and normalizes the outcome.
//!
//! # Design
//! Every call opens its own connection on a single-threaded tokio runtime, so
//! nothing is pooled or shared between requests. The executor classifies
//! status codes itself so that a 4xx/5xx still hands the whole response back
//! to the caller inside `DavError::Status`. The reason phrase is the one the
//! server wrote on its status line.
//!
//! The response body is always read to the end in fixed-size chunks before
//! the connection is dropped. Each failed call emits exactly one `warn` event.
//!
//! `execute` blocks the calling thread and must not be called from inside
//! an async runtime.

use bytes::{Buf, Bytes};
use http::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::ext::ReasonPhrase;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::credentials::Credentials;
use crate::error::{DavError, TransportError};
use crate::http::{DavRequest, DavResponse};

/// Size of each read while draining a response body.
pub const CHUNK_SIZE: usize = 256;

/// Executes prepared requests synchronously.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Send `request`, drain the response and classify it.
    ///
    /// Blocks until the server responds, the timeout elapses or the
    /// connection fails. A 401 is answered once when the request's credential
    /// cache covers one of the offered challenges.
    pub fn execute(&self, request: &DavRequest) -> Result<DavResponse, DavError> {
        let result = round_trip(request);
        match &result {
            Ok(response) => debug!(
                method = %request.method,
                target = %request.target,
                status = response.status,
                body_len = response.body.len(),
                "request completed"
            ),
            Err(DavError::Status(response)) => warn!(
                method = %request.method,
                target = %request.target,
                status = response.status,
                reason = %response.reason,
                "server returned an error status"
            ),
            Err(e) => warn!(
                method = %request.method,
                target = %request.target,
                error = %e,
                "request failed"
            ),
        }
        result
    }
}

fn round_trip(request: &DavRequest) -> Result<DavResponse, DavError> {
    let origin = Origin::parse(&request.target)?;
    let runtime = new_runtime()?;

    let mut response = runtime.block_on(send(&origin, request, None))?;

    if response.status == 401 {
        if let Some(credentials) = answerable_challenge(request, &response) {
            debug!(target = %request.target, user = %credentials.user_principal(), "answering authentication challenge");
            let authorization = credentials.basic_authorization();
            response = runtime.block_on(send(&origin, request, Some(&authorization)))?;
        } else {
            debug!(target = %request.target, "no credentials answer the offered challenges");
        }
    }

    if response.is_error() {
        return Err(DavError::Status(Box::new(response)));
    }
    Ok(response)
}

fn new_runtime() -> Result<Runtime, DavError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TransportError::Runtime(e).into())
}

/// Where a target URI points: the socket address to dial, the `Host` header
/// and the origin-form path written on the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Origin {
    host: String,
    port: u16,
    authority: String,
    path: String,
}

impl Origin {
    fn parse(target: &str) -> Result<Self, DavError> {
        let uri: Uri = target
            .parse()
            .map_err(|e| DavError::InvalidRequest(format!("{target}: {e}")))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(DavError::InvalidRequest(format!("unsupported URI scheme: {other}")));
            }
            None => return Err(DavError::InvalidRequest(format!("{target}: not an absolute URI"))),
        }
        let authority = uri
            .authority()
            .ok_or_else(|| DavError::InvalidRequest(format!("{target}: missing host")))?;

        Ok(Self {
            host: authority.host().trim_start_matches('[').trim_end_matches(']').to_string(),
            port: authority.port_u16().unwrap_or(80),
            authority: authority.as_str().to_string(),
            path: uri.path_and_query().map_or("/", |p| p.as_str()).to_string(),
        })
    }
}

async fn send(origin: &Origin, request: &DavRequest, authorization: Option<&str>) -> Result<DavResponse, DavError> {
    match tokio::time::timeout(request.timeout, exchange(origin, request, authorization)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(request.timeout).into()),
    }
}

/// One connection, one request, one fully drained response.
async fn exchange(origin: &Origin, request: &DavRequest, authorization: Option<&str>) -> Result<DavResponse, DavError> {
    let method = http::Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| DavError::InvalidRequest(e.to_string()))?;

    let mut builder = http::Request::builder()
        .method(method)
        .uri(origin.path.as_str())
        .header(HOST, origin.authority.as_str())
        .header(USER_AGENT, request.user_agent.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(content_type) = &request.content_type {
        builder = builder.header(CONTENT_TYPE, content_type.as_str());
    }
    if let Some(content_length) = request.content_length() {
        builder = builder.header(CONTENT_LENGTH, content_length);
    }
    if let Some(cache_control) = request.cache_policy.cache_control() {
        builder = builder.header(CACHE_CONTROL, cache_control);
    }
    if let Some(authorization) = authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }
    let body = Full::new(Bytes::copy_from_slice(request.body().unwrap_or_default()));
    let wire_request = builder.body(body)?;

    let stream = TcpStream::connect((origin.host.as_str(), origin.port))
        .await
        .map_err(TransportError::Connect)?;
    let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(TransportError::Http)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let response = sender.send_request(wire_request).await.map_err(TransportError::Http)?;
    let (parts, body) = response.into_parts();
    let drained = drain(body).await.map_err(DavError::Body)?;
    debug!(reads = drained.reads, bytes = drained.bytes.len(), "response body drained");

    let reason = match parts.extensions.get::<ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => parts.status.canonical_reason().unwrap_or_default().to_string(),
    };

    Ok(DavResponse {
        status: parts.status.as_u16(),
        reason,
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body: String::from_utf8_lossy(&drained.bytes).into_owned(),
    })
}

/// Credentials from the request's cache that answer one of the response's
/// `WWW-Authenticate` challenges.
fn answerable_challenge<'a>(request: &'a DavRequest, response: &DavResponse) -> Option<&'a Credentials> {
    let cache = request.credentials.as_ref()?;
    response
        .header_values("www-authenticate")
        .flat_map(challenge_schemes)
        .find_map(|scheme| cache.lookup(&request.target, scheme))
}

/// Scheme names in one `WWW-Authenticate` value. Parameters (`realm=...`)
/// share the comma-separated list, so tokens containing `=` are skipped.
fn challenge_schemes(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').filter_map(|segment| {
        let token = segment.split_whitespace().next()?;
        (!token.contains('=')).then_some(token)
    })
}

#[derive(Debug, Default)]
struct Drained {
    bytes: Vec<u8>,
    reads: usize,
}

/// Read `body` to the end, copying at most `CHUNK_SIZE` bytes per read.
async fn drain<B>(mut body: B) -> Result<Drained, B::Error>
where
    B: Body + Unpin,
{
    let mut drained = Drained::default();
    while let Some(frame) = body.frame().await {
        let Ok(mut data) = frame?.into_data() else {
            continue;
        };
        while data.has_remaining() {
            let n = data.chunk().len().min(CHUNK_SIZE);
            drained.bytes.extend_from_slice(&data.chunk()[..n]);
            data.advance(n);
            drained.reads += 1;
        }
    }
    Ok(drained)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::credentials::{AuthScheme, CredentialCache};
    use crate::http::DavMethod;

    fn unauthorized(challenges: &[&str]) -> DavResponse {
        DavResponse {
            status: 401,
            reason: "Unauthorized".to_string(),
            headers: challenges
                .iter()
                .map(|c| ("www-authenticate".to_string(), c.to_string()))
                .collect(),
            body: String::new(),
        }
    }

    fn request_with_cache(scheme: AuthScheme) -> DavRequest {
        let mut req = DavRequest::new(DavMethod::Propfind, "http://host/dav/", "ua", Duration::from_secs(1));
        req.credentials = Some(CredentialCache::new(
            "http://host/dav/",
            scheme,
            Credentials::new("alice", "secret", ""),
        ));
        req
    }

    #[tokio::test]
    async fn ten_byte_body_drains_in_one_read() {
        let drained = drain(Full::new(Bytes::from_static(b"<d:prop/>\n"))).await.unwrap();
        assert_eq!(drained.bytes.len(), 10);
        assert_eq!(drained.reads, 1);
    }

    #[tokio::test]
    async fn large_body_drains_in_chunks() {
        let body = vec![b'x'; CHUNK_SIZE * 2 + 1];
        let drained = drain(Full::new(Bytes::from(body.clone()))).await.unwrap();
        assert_eq!(drained.bytes, body);
        assert_eq!(drained.reads, 3);
    }

    #[tokio::test]
    async fn empty_body_needs_no_reads() {
        let drained = drain(Full::new(Bytes::new())).await.unwrap();
        assert!(drained.bytes.is_empty());
        assert_eq!(drained.reads, 0);
    }

    #[test]
    fn origin_splits_host_port_and_path() {
        let origin = Origin::parse("http://dav.example.com:8880/docs/a.txt?rev=2").unwrap();
        assert_eq!(origin.host, "dav.example.com");
        assert_eq!(origin.port, 8880);
        assert_eq!(origin.authority, "dav.example.com:8880");
        assert_eq!(origin.path, "/docs/a.txt?rev=2");

        let origin = Origin::parse("http://[::1]/").unwrap();
        assert_eq!(origin.host, "::1");
        assert_eq!(origin.port, 80);
    }

    #[test]
    fn origin_defaults_to_root_path() {
        assert_eq!(Origin::parse("http://host").unwrap().path, "/");
    }

    #[test]
    fn origin_rejects_relative_and_tls_targets() {
        assert!(matches!(Origin::parse("/docs/"), Err(DavError::InvalidRequest(_))));
        assert!(matches!(Origin::parse("https://host/"), Err(DavError::InvalidRequest(_))));
        assert!(matches!(Origin::parse("not a uri"), Err(DavError::InvalidRequest(_))));
    }

    #[test]
    fn challenge_schemes_skip_parameters() {
        let schemes: Vec<&str> = challenge_schemes(r#"Negotiate, Basic realm="dav", charset="UTF-8""#).collect();
        assert_eq!(schemes, vec!["Negotiate", "Basic"]);
    }

    #[test]
    fn basic_challenge_is_answered_by_basic_cache() {
        let req = request_with_cache(AuthScheme::Basic);
        let resp = unauthorized(&["Negotiate", r#"Basic realm="dav""#]);
        let creds = answerable_challenge(&req, &resp).unwrap();
        assert_eq!(creds.username, "alice");
    }

    #[test]
    fn negotiate_cache_leaves_basic_challenge_unanswered() {
        let req = request_with_cache(AuthScheme::Negotiate);
        let resp = unauthorized(&["Negotiate", r#"Basic realm="dav""#]);
        assert!(answerable_challenge(&req, &resp).is_none());
    }

    #[test]
    fn request_without_cache_never_answers() {
        let req = DavRequest::new(DavMethod::Get, "http://host/dav/", "ua", Duration::from_secs(1));
        assert!(answerable_challenge(&req, &unauthorized(&["Basic"])).is_none());
    }
}
