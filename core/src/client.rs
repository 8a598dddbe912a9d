//! WebDAV request builder and per-verb entry points.
//!
//! # Design
//! `WebDavClient` holds only read-only configuration: a credential provider,
//! the user agent, the default timeout and the auth scheme. Each verb is split
//! into a `build_*` method that produces a `DavRequest` as plain data and a
//! method named after the verb that builds and sends it through the
//! `Executor`. Keeping the builders pure makes the header and body layout of
//! every verb testable without a server.

use std::time::Duration;

use crate::config::{ClientConfig, Settings};
use crate::credentials::{AuthScheme, CredentialProvider, Credentials, StaticCredentials};
use crate::error::DavError;
use crate::executor::Executor;
use crate::http::{CachePolicy, DavMethod, DavRequest, DavResponse, XML_CONTENT_TYPE};

/// Timeout applied to LOCK requests.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(3600);

/// Synchronous WebDAV client.
///
/// Safe to share between threads: every call builds its own request and
/// connection, and nothing inside the client is mutated after construction.
#[derive(Debug, Clone)]
pub struct WebDavClient<P = StaticCredentials> {
    provider: P,
    config: ClientConfig,
    executor: Executor,
}

impl WebDavClient<StaticCredentials> {
    /// Client that presents `credentials` for every target.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_provider(StaticCredentials(credentials), ClientConfig::default())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_provider(StaticCredentials(settings.credentials.clone()), settings.client.clone())
    }
}

impl<P: CredentialProvider> WebDavClient<P> {
    pub fn with_provider(provider: P, config: ClientConfig) -> Self {
        Self {
            provider,
            config,
            executor: Executor::new(),
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        self.config.auth_scheme
    }

    /// Base request for `method`: user agent, credentials, default timeout and
    /// cache policy. No headers and no body.
    pub fn build_request(&self, target: &str, method: DavMethod) -> DavRequest {
        let mut request = DavRequest::new(method, target, &self.config.user_agent, self.config.timeout());
        request.credentials = Some(self.provider.credential_cache(target, self.config.auth_scheme));
        request
    }

    /// PROPFIND with a `Depth` header. `None` sends the header with an empty value.
    pub fn build_propfind(&self, target: &str, depth: Option<&str>, content: &str) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Propfind);
        request.set_body(content);
        request.add_header("Depth", depth.unwrap_or_default());
        request
    }

    pub fn build_mkcol(&self, target: &str, content: &str) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Mkcol);
        request.set_body(content);
        request
    }

    pub fn build_delete(&self, target: &str) -> DavRequest {
        self.build_request(target, DavMethod::Delete)
    }

    pub fn build_put(&self, target: &str, content: &str) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Put);
        request.set_body(content);
        request
    }

    pub fn build_copy(&self, target: &str, destination: &str, overwrite: bool) -> DavRequest {
        self.build_transfer(DavMethod::Copy, target, destination, overwrite)
    }

    pub fn build_move(&self, target: &str, destination: &str, overwrite: bool) -> DavRequest {
        self.build_transfer(DavMethod::Move, target, destination, overwrite)
    }

    fn build_transfer(&self, method: DavMethod, target: &str, destination: &str, overwrite: bool) -> DavRequest {
        let mut request = self.build_request(target, method);
        request.add_header("Destination", destination);
        request.add_header("Overwrite", overwrite_token(overwrite));
        request
    }

    /// Exclusive-scope LOCK on a single resource. `content` is the `lockinfo`
    /// document.
    pub fn build_lock(&self, target: &str, content: &str) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Lock);
        request.cache_policy = CachePolicy::NoCacheNoStore;
        request.content_type = Some(XML_CONTENT_TYPE.to_string());
        request.timeout = LOCK_TIMEOUT;
        request.add_header("Depth", "0");
        request.add_header("Pragma", "no-cache");
        request.set_body(content);
        request
    }

    /// UNLOCK. `lock_token` adds a `Lock-Token` header, bracketed if needed.
    pub fn build_unlock(&self, target: &str, lock_token: Option<&str>) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Unlock);
        if let Some(token) = lock_token {
            request.add_header("Lock-Token", &coded_url(token));
        }
        request
    }

    pub fn build_options(&self, target: &str) -> DavRequest {
        self.build_request(target, DavMethod::Options)
    }

    pub fn build_head(&self, target: &str) -> DavRequest {
        self.build_request(target, DavMethod::Head)
    }

    pub fn build_proppatch(&self, target: &str, content: &str) -> DavRequest {
        let mut request = self.build_request(target, DavMethod::Proppatch);
        request.content_type = Some(XML_CONTENT_TYPE.to_string());
        request.set_body(content);
        request
    }

    pub fn build_get(&self, target: &str) -> DavRequest {
        self.build_request(target, DavMethod::Get)
    }

    /// Send an already built request.
    pub fn execute(&self, request: &DavRequest) -> Result<DavResponse, DavError> {
        self.executor.execute(request)
    }

    pub fn propfind(&self, target: &str, depth: Option<&str>, content: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_propfind(target, depth, content))
    }

    pub fn mkcol(&self, target: &str, content: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_mkcol(target, content))
    }

    pub fn delete(&self, target: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_delete(target))
    }

    pub fn put(&self, target: &str, content: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_put(target, content))
    }

    pub fn copy(&self, target: &str, destination: &str, overwrite: bool) -> Result<DavResponse, DavError> {
        self.execute(&self.build_copy(target, destination, overwrite))
    }

    pub fn r#move(&self, target: &str, destination: &str, overwrite: bool) -> Result<DavResponse, DavError> {
        self.execute(&self.build_move(target, destination, overwrite))
    }

    pub fn lock(&self, target: &str, content: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_lock(target, content))
    }

    pub fn unlock(&self, target: &str, lock_token: Option<&str>) -> Result<DavResponse, DavError> {
        self.execute(&self.build_unlock(target, lock_token))
    }

    pub fn options(&self, target: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_options(target))
    }

    pub fn head(&self, target: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_head(target))
    }

    pub fn proppatch(&self, target: &str, content: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_proppatch(target, content))
    }

    pub fn get(&self, target: &str) -> Result<DavResponse, DavError> {
        self.execute(&self.build_get(target))
    }
}

fn overwrite_token(overwrite: bool) -> &'static str {
    if overwrite {
        "T"
    } else {
        "F"
    }
}

/// Lock tokens travel as Coded-URLs: `<opaquelocktoken:...>`.
fn coded_url(token: &str) -> String {
    let token = token.trim();
    if token.starts_with('<') && token.ends_with('>') {
        token.to_string()
    } else {
        format!("<{token}>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;

    const LOCKINFO: &str = r#"<?xml version="1.0" encoding="utf-8"?><D:lockinfo xmlns:D="DAV:"><D:lockscope><D:exclusive/></D:lockscope><D:locktype><D:write/></D:locktype></D:lockinfo>"#;

    fn client() -> WebDavClient {
        WebDavClient::new(Credentials::new("alice", "secret", "CORP"))
    }

    #[test]
    fn build_request_sets_common_properties_only() {
        let req = client().build_request("http://host/dav/", DavMethod::Options);
        assert_eq!(req.method.as_str(), "OPTIONS");
        assert_eq!(req.target, "http://host/dav/");
        assert_eq!(req.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(req.timeout, Duration::from_secs(100));
        assert_eq!(req.cache_policy, CachePolicy::Default);
        assert!(req.headers.is_empty());
        assert!(req.body().is_none());
        assert!(req.content_type.is_none());

        let cache = req.credentials.unwrap();
        assert_eq!(cache.uri_prefix, "http://host/dav/");
        assert_eq!(cache.scheme, AuthScheme::Negotiate);
        assert_eq!(cache.credentials, Credentials::new("alice", "secret", "CORP"));
    }

    #[test]
    fn every_verb_uses_its_protocol_name() {
        let c = client();
        let t = "http://host/r";
        let built = [
            (c.build_propfind(t, None, ""), "PROPFIND"),
            (c.build_mkcol(t, ""), "MKCOL"),
            (c.build_delete(t), "DELETE"),
            (c.build_put(t, ""), "PUT"),
            (c.build_copy(t, "http://host/c", false), "COPY"),
            (c.build_move(t, "http://host/m", false), "MOVE"),
            (c.build_lock(t, LOCKINFO), "LOCK"),
            (c.build_unlock(t, None), "UNLOCK"),
            (c.build_options(t), "OPTIONS"),
            (c.build_head(t), "HEAD"),
            (c.build_proppatch(t, "<x/>"), "PROPPATCH"),
            (c.build_get(t), "GET"),
        ];
        for (req, name) in built {
            assert_eq!(req.method.as_str(), name);
            assert_eq!(req.target, t);
        }
    }

    #[test]
    fn propfind_without_depth_sends_empty_depth_header() {
        let req = client().build_propfind("http://host/", None, "");
        assert_eq!(req.header("Depth"), Some(""));
        assert_eq!(req.content_length(), Some(0));
        assert!(req.content_type.is_none());
    }

    #[test]
    fn propfind_with_depth_and_body() {
        let body = r#"<D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        let req = client().build_propfind("http://host/", Some("1"), body);
        assert_eq!(req.header("Depth"), Some("1"));
        assert_eq!(req.body(), Some(body.as_bytes()));
        assert_eq!(req.content_length(), Some(body.len() as u64));
    }

    #[test]
    fn copy_and_move_use_single_letter_overwrite_tokens() {
        let c = client();
        for (req, expected) in [
            (c.build_copy("http://host/a", "http://host/b", true), "T"),
            (c.build_copy("http://host/a", "http://host/b", false), "F"),
            (c.build_move("http://host/a", "http://host/b", true), "T"),
            (c.build_move("http://host/a", "http://host/b", false), "F"),
        ] {
            assert_eq!(req.header("Overwrite"), Some(expected));
            assert_eq!(req.header("Destination"), Some("http://host/b"));
            assert!(req.body().is_none());
        }
    }

    #[test]
    fn destination_is_carried_verbatim() {
        let dest = "http://other.example/some%20dir/file.txt?x=1";
        let req = client().build_move("http://host/a", dest, false);
        assert_eq!(req.header("Destination"), Some(dest));
    }

    #[test]
    fn lock_sets_xml_body_depth_pragma_and_timeout() {
        let req = client().build_lock("http://host/res", "<lockinfo/>");
        assert_eq!(req.content_type.as_deref(), Some("text/xml; charset=\"utf-8\""));
        assert_eq!(req.content_length(), Some(11));
        assert_eq!(req.body(), Some("<lockinfo/>".as_bytes()));
        assert_eq!(req.header("Depth"), Some("0"));
        assert_eq!(req.header("Pragma"), Some("no-cache"));
        assert_eq!(req.cache_policy, CachePolicy::NoCacheNoStore);
        assert_eq!(req.timeout, LOCK_TIMEOUT);
    }

    #[test]
    fn proppatch_length_counts_utf8_bytes() {
        let content = "<D:displayname>Grüße</D:displayname>";
        let req = client().build_proppatch("http://host/res", content);
        assert_eq!(req.content_type.as_deref(), Some(XML_CONTENT_TYPE));
        assert_eq!(req.content_length(), Some(content.len() as u64));
        assert_ne!(req.content_length(), Some(content.chars().count() as u64));
        assert_eq!(req.body(), Some(content.as_bytes()));
        assert_eq!(req.cache_policy, CachePolicy::Default);
    }

    #[test]
    fn bodiless_verbs_carry_no_headers() {
        let c = client();
        for req in [
            c.build_delete("http://host/a"),
            c.build_options("http://host/a"),
            c.build_head("http://host/a"),
            c.build_get("http://host/a"),
            c.build_unlock("http://host/a", None),
        ] {
            assert!(req.headers.is_empty(), "{}", req.method);
            assert!(req.body().is_none(), "{}", req.method);
            assert!(req.content_length().is_none(), "{}", req.method);
        }
    }

    #[test]
    fn unlock_brackets_lock_token() {
        let c = client();
        let bare = c.build_unlock("http://host/a", Some("opaquelocktoken:1234"));
        assert_eq!(bare.header("Lock-Token"), Some("<opaquelocktoken:1234>"));
        let coded = c.build_unlock("http://host/a", Some("<opaquelocktoken:1234>"));
        assert_eq!(coded.header("Lock-Token"), Some("<opaquelocktoken:1234>"));
    }

    #[test]
    fn put_keeps_empty_body() {
        let req = client().build_put("http://host/empty.txt", "");
        assert_eq!(req.body(), Some(&[][..]));
        assert_eq!(req.content_length(), Some(0));
    }

    #[test]
    fn settings_drive_user_agent_timeout_and_scheme() {
        let settings = Settings::from_toml(
            r#"
            [client]
            user_agent = "dav-sync/2.0"
            timeout_ms = 500
            auth_scheme = "Basic"
            "#,
        )
        .unwrap();
        let c = WebDavClient::from_settings(&settings);
        let req = c.build_get("http://host/a");
        assert_eq!(req.user_agent, "dav-sync/2.0");
        assert_eq!(req.timeout, Duration::from_millis(500));
        assert_eq!(req.credentials.unwrap().scheme, AuthScheme::Basic);
        assert_eq!(c.build_lock("http://host/a", "<x/>").timeout, LOCK_TIMEOUT);
    }

    #[test]
    fn client_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WebDavClient>();
    }
}
