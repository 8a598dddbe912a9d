//! WebDAV request and response types.
//!
//! # Design
//! These types describe requests and responses as plain data. The client
//! builds a `DavRequest` without touching the network, and the executor turns
//! it into a wire request. Keeping the two apart makes every verb's header and
//! body layout testable without a server.
//!
//! All fields use owned types (`String`, `Vec`) so a request can be moved to
//! another thread or kept around after the client is gone.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::credentials::CredentialCache;

/// Content type used for LOCK and PROPPATCH bodies.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// WebDAV verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Propfind,
    Proppatch,
    Mkcol,
    Get,
    Head,
    Put,
    Delete,
    Copy,
    Move,
    Lock,
    Unlock,
    Options,
}

impl DavMethod {
    pub const ALL: [DavMethod; 12] = [
        DavMethod::Propfind,
        DavMethod::Proppatch,
        DavMethod::Mkcol,
        DavMethod::Get,
        DavMethod::Head,
        DavMethod::Put,
        DavMethod::Delete,
        DavMethod::Copy,
        DavMethod::Move,
        DavMethod::Lock,
        DavMethod::Unlock,
        DavMethod::Options,
    ];

    /// The protocol name sent on the request line.
    pub fn as_str(&self) -> &'static str {
        match self {
            DavMethod::Propfind => "PROPFIND",
            DavMethod::Proppatch => "PROPPATCH",
            DavMethod::Mkcol => "MKCOL",
            DavMethod::Get => "GET",
            DavMethod::Head => "HEAD",
            DavMethod::Put => "PUT",
            DavMethod::Delete => "DELETE",
            DavMethod::Copy => "COPY",
            DavMethod::Move => "MOVE",
            DavMethod::Lock => "LOCK",
            DavMethod::Unlock => "UNLOCK",
            DavMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for DavMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a verb name is not one of the supported WebDAV methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown WebDAV method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for DavMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DavMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// Caching behaviour requested from intermediaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Default,
    /// Sent as `Cache-Control: no-store, no-cache`.
    NoCacheNoStore,
}

impl CachePolicy {
    /// Value of the `Cache-Control` header this policy adds, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CachePolicy::Default => None,
            CachePolicy::NoCacheNoStore => Some("no-store, no-cache"),
        }
    }
}

/// A WebDAV request described as plain data.
///
/// Built by `WebDavClient::build_*` methods and sent by `Executor::execute`.
/// The body and its length are only ever set together through
/// [`DavRequest::set_body`], so `content_length` always matches the payload.
#[derive(Debug, Clone)]
pub struct DavRequest {
    pub method: DavMethod,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub timeout: Duration,
    pub cache_policy: CachePolicy,
    pub user_agent: String,
    pub credentials: Option<CredentialCache>,
    body: Option<Vec<u8>>,
    content_length: Option<u64>,
}

impl DavRequest {
    pub fn new(method: DavMethod, target: &str, user_agent: &str, timeout: Duration) -> Self {
        Self {
            method,
            target: target.to_string(),
            headers: Vec::new(),
            content_type: None,
            timeout,
            cache_policy: CachePolicy::Default,
            user_agent: user_agent.to_string(),
            credentials: None,
            body: None,
            content_length: None,
        }
    }

    /// Append a header. Existing headers with the same name are kept.
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set the body to the UTF-8 encoding of `content` and record its length.
    pub fn set_body(&mut self, content: &str) {
        let bytes = content.as_bytes().to_vec();
        self.content_length = Some(bytes.len() as u64);
        self.body = Some(bytes);
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

/// A response described as plain data.
///
/// The body has already been drained and the connection released by the time
/// a caller sees this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl DavResponse {
    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of `name`, in the order the server sent them.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 4xx and 5xx statuses.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_round_trip_through_from_str() {
        for method in DavMethod::ALL {
            assert_eq!(method.as_str().parse::<DavMethod>().unwrap(), method);
        }
    }

    #[test]
    fn method_parsing_is_case_sensitive() {
        let err = "propfind".parse::<DavMethod>().unwrap_err();
        assert_eq!(err, UnknownMethod("propfind".to_string()));
        assert_eq!(err.to_string(), "unknown WebDAV method: propfind");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut req = DavRequest::new(DavMethod::Copy, "http://host/a", "ua", Duration::from_secs(1));
        req.add_header("Destination", "http://host/b");
        assert_eq!(req.header("destination"), Some("http://host/b"));
        assert_eq!(req.header("DESTINATION"), Some("http://host/b"));
        assert_eq!(req.header("Overwrite"), None);
    }

    #[test]
    fn set_body_records_utf8_length() {
        let mut req = DavRequest::new(DavMethod::Put, "http://host/a", "ua", Duration::from_secs(1));
        req.set_body("héllo");
        assert_eq!(req.content_length(), Some(6));
        assert_eq!(req.body(), Some("héllo".as_bytes()));
    }

    #[test]
    fn no_cache_policy_maps_to_cache_control() {
        assert_eq!(CachePolicy::Default.cache_control(), None);
        assert_eq!(CachePolicy::NoCacheNoStore.cache_control(), Some("no-store, no-cache"));
    }

    #[test]
    fn response_classification() {
        let mut resp = DavResponse {
            status: 207,
            reason: "Multi-Status".to_string(),
            headers: vec![("www-authenticate".to_string(), "Basic".to_string())],
            body: String::new(),
        };
        assert!(resp.is_success());
        assert!(!resp.is_error());
        assert_eq!(resp.header("WWW-Authenticate"), Some("Basic"));
        resp.status = 423;
        assert!(resp.is_error());
    }
}
