use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

const XML: &str = "text/xml; charset=\"utf-8\"";
const ALLOW: &str = "OPTIONS, GET, HEAD, PUT, DELETE, PROPFIND, PROPPATCH, MKCOL, COPY, MOVE, LOCK, UNLOCK";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Collection,
    File(Bytes),
}

/// A request as the server saw it. Header names are lowercase.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct MockState {
    resources: RwLock<BTreeMap<String, Resource>>,
    locks: RwLock<HashMap<String, String>>,
    requests: RwLock<Vec<RecordedRequest>>,
    authorization: Option<String>,
}

pub type Db = Arc<MockState>;

impl Default for MockState {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Empty tree containing only the root collection.
    pub fn new() -> Self {
        let mut resources = BTreeMap::new();
        resources.insert("/".to_string(), Resource::Collection);
        Self {
            resources: RwLock::new(resources),
            locks: RwLock::new(HashMap::new()),
            requests: RwLock::new(Vec::new()),
            authorization: None,
        }
    }

    /// Require HTTP Basic credentials. Unauthenticated requests get a 401
    /// offering both `Negotiate` and `Basic`.
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let raw = format!("{user}:{password}");
        self.authorization = Some(format!("Basic {}", STANDARD.encode(raw.as_bytes())));
        self
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Same as [`MockState::requests`] for callers outside the runtime.
    pub fn blocking_requests(&self) -> Vec<RecordedRequest> {
        self.requests.blocking_read().clone()
    }

    pub async fn resource(&self, path: &str) -> Option<Resource> {
        self.resources.read().await.get(&normalize(path)).cloned()
    }

    pub fn blocking_resource(&self, path: &str) -> Option<Resource> {
        self.resources.blocking_read().get(&normalize(path)).cloned()
    }

    pub fn blocking_insert(&self, path: &str, resource: Resource) {
        self.resources.blocking_write().insert(normalize(path), resource);
    }

    async fn record(&self, method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        self.requests.write().await.push(RecordedRequest {
            method: method.as_str().to_string(),
            path: uri.path().to_string(),
            headers,
            body: body.to_vec(),
        });
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.authorization {
            None => true,
            Some(expected) => headers
                .get(header::AUTHORIZATION)
                .is_some_and(|v| v.as_bytes() == expected.as_bytes()),
        }
    }

    /// 423 unless `path` is unlocked or the request carries its lock token.
    async fn check_lock(&self, path: &str, headers: &HeaderMap) -> Result<(), Response> {
        let locks = self.locks.read().await;
        let Some(token) = locks.get(path) else {
            return Ok(());
        };
        let presented = [header_str(headers, "if"), header_str(headers, "lock-token")]
            .into_iter()
            .flatten()
            .any(|v| v.contains(token.as_str()));
        if presented {
            Ok(())
        } else {
            Err(StatusCode::LOCKED.into_response())
        }
    }
}

pub fn app() -> Router {
    app_with_state(Arc::new(MockState::new()))
}

pub fn app_with_state(state: Db) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, state: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

async fn dispatch(
    State(db): State<Db>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    db.record(&method, &uri, &headers, &body).await;
    if !db.authorized(&headers) {
        return unauthorized();
    }

    let path = normalize(uri.path());
    debug!(method = %method, path = %path, "dav request");

    let result = match method.as_str() {
        "OPTIONS" => Ok(options()),
        "PROPFIND" => propfind(&db, &path, &headers).await,
        "PROPPATCH" => proppatch(&db, &path, &headers, &body).await,
        "MKCOL" => mkcol(&db, &path, &body).await,
        "GET" => get(&db, &path, false).await,
        "HEAD" => get(&db, &path, true).await,
        "PUT" => put(&db, &path, &headers, body).await,
        "DELETE" => delete(&db, &path, &headers).await,
        "COPY" => transfer(&db, &path, &headers, false).await,
        "MOVE" => transfer(&db, &path, &headers, true).await,
        "LOCK" => lock(&db, &path, &body).await,
        "UNLOCK" => unlock(&db, &path, &headers).await,
        _ => Err(StatusCode::METHOD_NOT_ALLOWED.into_response()),
    };
    result.unwrap_or_else(|response| response)
}

fn unauthorized() -> Response {
    let mut headers = HeaderMap::new();
    headers.append(header::WWW_AUTHENTICATE, HeaderValue::from_static("Negotiate"));
    headers.append(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"mock-server\""),
    );
    (StatusCode::UNAUTHORIZED, headers).into_response()
}

fn options() -> Response {
    (
        StatusCode::OK,
        [("dav", "1, 2"), ("allow", ALLOW), ("ms-author-via", "DAV")],
    )
        .into_response()
}

async fn propfind(db: &MockState, path: &str, headers: &HeaderMap) -> Result<Response, Response> {
    let resources = db.resources.read().await;
    if !resources.contains_key(path) {
        return Err(StatusCode::NOT_FOUND.into_response());
    }

    let depth = header_str(headers, "depth").unwrap_or_default();
    let prefix = child_prefix(path);
    let members = resources.iter().filter(|(k, _)| {
        k.as_str() == path
            || match depth {
                "0" => false,
                "1" => parent(k).as_deref() == Some(path),
                // Empty or "infinity": the whole subtree.
                _ => k.starts_with(&prefix),
            }
    });

    let mut body = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\n");
    for (href, resource) in members {
        let (resourcetype, length, href) = match resource {
            Resource::Collection => ("<D:collection/>", 0, child_prefix(href)),
            Resource::File(data) => ("", data.len(), href.clone()),
        };
        body.push_str(&format!(
            "<D:response><D:href>{href}</D:href><D:propstat><D:prop>\
             <D:resourcetype>{resourcetype}</D:resourcetype>\
             <D:getcontentlength>{length}</D:getcontentlength>\
             </D:prop><D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response>\n"
        ));
    }
    body.push_str("</D:multistatus>\n");
    Ok(xml(StatusCode::MULTI_STATUS, body))
}

async fn proppatch(db: &MockState, path: &str, headers: &HeaderMap, body: &Bytes) -> Result<Response, Response> {
    if !db.resources.read().await.contains_key(path) {
        return Err(StatusCode::NOT_FOUND.into_response());
    }
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into_response());
    }
    db.check_lock(path, headers).await?;
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:multistatus xmlns:D=\"DAV:\">\
         <D:response><D:href>{path}</D:href><D:propstat><D:prop/>\
         <D:status>HTTP/1.1 200 OK</D:status></D:propstat></D:response></D:multistatus>\n"
    );
    Ok(xml(StatusCode::MULTI_STATUS, body))
}

async fn mkcol(db: &MockState, path: &str, body: &Bytes) -> Result<Response, Response> {
    if !body.is_empty() {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response());
    }
    let mut resources = db.resources.write().await;
    if resources.contains_key(path) {
        return Err(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    require_parent_collection(&resources, path)?;
    resources.insert(path.to_string(), Resource::Collection);
    Ok(StatusCode::CREATED.into_response())
}

async fn get(db: &MockState, path: &str, head: bool) -> Result<Response, Response> {
    let data = match db.resources.read().await.get(path) {
        None => return Err(StatusCode::NOT_FOUND.into_response()),
        Some(Resource::Collection) => Bytes::new(),
        Some(Resource::File(data)) => data.clone(),
    };
    let length = data.len().to_string();
    let body = if head { Bytes::new() } else { data };
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream".to_string()), (header::CONTENT_LENGTH, length)],
        body,
    )
        .into_response())
}

async fn put(db: &MockState, path: &str, headers: &HeaderMap, body: Bytes) -> Result<Response, Response> {
    db.check_lock(path, headers).await?;
    let mut resources = db.resources.write().await;
    require_parent_collection(&resources, path)?;
    match resources.insert(path.to_string(), Resource::File(body)) {
        None => Ok(StatusCode::CREATED.into_response()),
        Some(Resource::File(_)) => Ok(StatusCode::NO_CONTENT.into_response()),
        Some(Resource::Collection) => {
            resources.insert(path.to_string(), Resource::Collection);
            Err(StatusCode::METHOD_NOT_ALLOWED.into_response())
        }
    }
}

async fn delete(db: &MockState, path: &str, headers: &HeaderMap) -> Result<Response, Response> {
    if path == "/" {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    db.check_lock(path, headers).await?;
    let mut resources = db.resources.write().await;
    if !resources.contains_key(path) {
        return Err(StatusCode::NOT_FOUND.into_response());
    }
    remove_subtree(&mut resources, path);
    db.locks.write().await.retain(|locked, _| !within(locked, path));
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// COPY and MOVE share destination and overwrite handling.
async fn transfer(db: &MockState, path: &str, headers: &HeaderMap, remove_source: bool) -> Result<Response, Response> {
    let destination = header_str(headers, "destination")
        .and_then(|d| d.parse::<Uri>().ok())
        .map(|uri| normalize(uri.path()))
        .ok_or_else(|| StatusCode::BAD_REQUEST.into_response())?;
    let overwrite = match header_str(headers, "overwrite") {
        None | Some("T") => true,
        Some("F") => false,
        Some(_) => return Err(StatusCode::BAD_REQUEST.into_response()),
    };
    if remove_source {
        db.check_lock(path, headers).await?;
    }

    let mut resources = db.resources.write().await;
    if !resources.contains_key(path) {
        return Err(StatusCode::NOT_FOUND.into_response());
    }
    if destination == path || within(&destination, path) {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    require_parent_collection(&resources, &destination)?;
    let existed = resources.contains_key(&destination);
    if existed && !overwrite {
        return Err(StatusCode::PRECONDITION_FAILED.into_response());
    }

    remove_subtree(&mut resources, &destination);
    let copied: Vec<(String, Resource)> = resources
        .iter()
        .filter(|(k, _)| within(k, path))
        .map(|(k, v)| (format!("{destination}{}", &k[path.len()..]), v.clone()))
        .collect();
    if remove_source {
        remove_subtree(&mut resources, path);
    }
    resources.extend(copied);

    let status = if existed { StatusCode::NO_CONTENT } else { StatusCode::CREATED };
    Ok(status.into_response())
}

async fn lock(db: &MockState, path: &str, body: &Bytes) -> Result<Response, Response> {
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into_response());
    }
    let mut resources = db.resources.write().await;
    let mut locks = db.locks.write().await;
    if locks.contains_key(path) {
        return Err(StatusCode::LOCKED.into_response());
    }

    let status = if resources.contains_key(path) {
        StatusCode::OK
    } else {
        require_parent_collection(&resources, path)?;
        resources.insert(path.to_string(), Resource::File(Bytes::new()));
        StatusCode::CREATED
    };

    let token = format!("opaquelocktoken:{}", Uuid::new_v4());
    locks.insert(path.to_string(), token.clone());
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<D:prop xmlns:D=\"DAV:\"><D:lockdiscovery><D:activelock>\
         <D:locktype><D:write/></D:locktype><D:lockscope><D:exclusive/></D:lockscope>\
         <D:depth>0</D:depth><D:locktoken><D:href>{token}</D:href></D:locktoken>\
         </D:activelock></D:lockdiscovery></D:prop>\n"
    );
    Ok((
        status,
        [(header::CONTENT_TYPE, XML.to_string()), (header::HeaderName::from_static("lock-token"), format!("<{token}>"))],
        body,
    )
        .into_response())
}

async fn unlock(db: &MockState, path: &str, headers: &HeaderMap) -> Result<Response, Response> {
    let token = header_str(headers, "lock-token")
        .map(|t| t.trim().trim_start_matches('<').trim_end_matches('>').to_string())
        .ok_or_else(|| StatusCode::BAD_REQUEST.into_response())?;
    let mut locks = db.locks.write().await;
    if locks.get(path) != Some(&token) {
        return Err(StatusCode::CONFLICT.into_response());
    }
    locks.remove(path);
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML)], body).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn require_parent_collection(resources: &BTreeMap<String, Resource>, path: &str) -> Result<(), Response> {
    match parent(path).and_then(|p| resources.get(&p)) {
        Some(Resource::Collection) => Ok(()),
        _ => Err(StatusCode::CONFLICT.into_response()),
    }
}

fn remove_subtree(resources: &mut BTreeMap<String, Resource>, path: &str) {
    resources.retain(|k, _| !within(k, path));
}

/// Canonical key: no trailing slash except for the root.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let (head, _) = path.rsplit_once('/')?;
    Some(if head.is_empty() { "/".to_string() } else { head.to_string() })
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{path}/")
    }
}

/// `candidate` is `path` itself or lies below it.
fn within(candidate: &str, path: &str) -> bool {
    candidate == path || candidate.starts_with(&child_prefix(path))
}
