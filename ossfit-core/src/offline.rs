//! Offline asset cache for the tutorial site.
//!
//! Cache-first serving with a network fallback. Installing pre-populates a
//! version-tagged store with the essential assets; activating drops stores
//! left behind by older versions. Storage and network access go through
//! traits so the same policy runs against memory, disk or a test stub.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_VERSION_TAG: &str = "chatgpt-oss-tutorial-v1";

/// Assets every version of the site needs offline.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/assets/styles/main.css",
    "/assets/scripts/main.js",
];

/// Served in place of any document that cannot be fetched.
pub const OFFLINE_FALLBACK_PATH: &str = "/index.html";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// What the requested resource will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestDestination {
    Document,
    Style,
    Script,
    Image,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub destination: RequestDestination,
}

impl Request {
    pub fn new(method: &str, path: &str, destination: RequestDestination) -> Self {
        Request {
            method: method.to_uppercase(),
            path: path.to_string(),
            destination,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new("GET", path, destination_for_path(path))
    }

    pub fn document(path: &str) -> Self {
        Self::new("GET", path, RequestDestination::Document)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// Guess a destination from the path extension.
pub fn destination_for_path(path: &str) -> RequestDestination {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        None | Some("html") | Some("htm") => RequestDestination::Document,
        Some("css") => RequestDestination::Style,
        Some("js") | Some("mjs") => RequestDestination::Script,
        Some("png") | Some("jpg") | Some("jpeg") | Some("gif") | Some("svg") | Some("webp")
        | Some("ico") => RequestDestination::Image,
        Some(_) => RequestDestination::Other,
    }
}

/// Whether a response came from the site's own origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    Basic,
    Cors,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub response_type: ResponseType,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Response {
            status: 200,
            response_type: ResponseType::Basic,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only complete same-origin responses are worth keeping.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.response_type == ResponseType::Basic
    }
}

// ---------------------------------------------------------------------------
// Storage and network seams
// ---------------------------------------------------------------------------

/// Named stores of path -> response.
pub trait CacheStorage {
    /// Create the store if it does not exist yet.
    fn open(&mut self, name: &str);

    /// Names of all stores.
    fn keys(&self) -> Vec<String>;

    /// Remove a store. Returns whether it existed.
    fn delete(&mut self, name: &str) -> bool;

    fn get(&self, name: &str, path: &str) -> Option<Response>;

    fn put(&mut self, name: &str, path: &str, response: Response) -> Result<(), CacheError>;

    /// Look the path up in every store, in key order.
    fn match_any(&self, path: &str) -> Option<Response> {
        self.keys().iter().find_map(|name| self.get(name, path))
    }
}

pub trait Network {
    fn fetch(&self, request: &Request) -> Result<Response, CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    stores: BTreeMap<String, BTreeMap<String, Response>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a store, if it exists.
    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.stores.get(name).map(|s| s.len())
    }

    /// Cached paths of a store, sorted.
    pub fn paths(&self, name: &str) -> Vec<String> {
        self.stores
            .get(name)
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&mut self, name: &str) {
        self.stores.entry(name.to_string()).or_default();
    }

    fn keys(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn delete(&mut self, name: &str) -> bool {
        self.stores.remove(name).is_some()
    }

    fn get(&self, name: &str, path: &str) -> Option<Response> {
        self.stores.get(name)?.get(path).cloned()
    }

    fn put(&mut self, name: &str, path: &str, response: Response) -> Result<(), CacheError> {
        let store = self
            .stores
            .get_mut(name)
            .ok_or_else(|| CacheError::Storage(format!("store '{name}' is not open")))?;
        store.insert(path.to_string(), response);
        Ok(())
    }
}

/// Blocking HTTP access to one origin.
pub struct HttpNetwork {
    origin: String,
    agent: ureq::Agent,
}

impl HttpNetwork {
    pub fn new(origin: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(10)))
            .http_status_as_error(false)
            .build();
        HttpNetwork {
            origin: origin.trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.origin, path)
        } else {
            format!("{}/{}", self.origin, path)
        }
    }

    fn origin_host(&self) -> Option<String> {
        self.origin
            .parse::<ureq::http::Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_string))
    }
}

impl Network for HttpNetwork {
    fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
        use ureq::ResponseExt;

        if !request.is_get() {
            return Err(CacheError::Network(format!(
                "unsupported method {}",
                request.method
            )));
        }

        let url = self.url_for(&request.path);
        let mut resp = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| CacheError::Network(format!("{url}: {e}")))?;

        // Redirects can land on another host
        let response_type = match (resp.get_uri().host(), self.origin_host()) {
            (Some(host), Some(origin)) if host != origin => ResponseType::Cors,
            _ => ResponseType::Basic,
        };
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .body_mut()
            .read_to_vec()
            .map_err(|e| CacheError::Network(format!("{url}: {e}")))?;

        Ok(Response {
            status,
            response_type,
            content_type,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Cache policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled by the cache (non-GET).
    Passthrough,
    Cached(Response),
    Network(Response),
    /// Network failed; the offline document was served instead.
    Fallback(Response),
    Unavailable(CacheError),
}

#[derive(Debug, Clone)]
pub struct OfflineCache {
    version_tag: String,
    precache: Vec<String>,
}

impl Default for OfflineCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_VERSION_TAG,
            DEFAULT_PRECACHE.iter().map(|p| p.to_string()).collect(),
        )
    }
}

impl OfflineCache {
    pub fn new(version_tag: &str, precache: Vec<String>) -> Self {
        OfflineCache {
            version_tag: version_tag.to_string(),
            precache,
        }
    }

    pub fn version_tag(&self) -> &str {
        &self.version_tag
    }

    pub fn precache(&self) -> &[String] {
        &self.precache
    }

    /// Fetch and store every precache asset. Any non-2xx response or storage
    /// failure leaves no store behind. Returns the number of assets cached.
    pub fn install<S, N>(&self, storage: &mut S, network: &N) -> Result<usize, CacheError>
    where
        S: CacheStorage,
        N: Network,
    {
        let mut fetched = Vec::with_capacity(self.precache.len());
        for path in &self.precache {
            let response = network.fetch(&Request::get(path))?;
            if !response.is_success() {
                return Err(CacheError::NotFound(format!(
                    "{path} returned status {}",
                    response.status
                )));
            }
            fetched.push((path, response));
        }

        storage.open(&self.version_tag);
        for (path, response) in fetched {
            if let Err(e) = storage.put(&self.version_tag, path, response) {
                storage.delete(&self.version_tag);
                tracing::warn!(
                    version = %self.version_tag,
                    "offline cache install rolled back: {}",
                    e
                );
                return Err(e);
            }
        }
        tracing::info!(
            version = %self.version_tag,
            assets = self.precache.len(),
            "offline cache installed"
        );
        Ok(self.precache.len())
    }

    /// Delete every store that does not belong to this version.
    pub fn activate<S: CacheStorage>(&self, storage: &mut S) -> Vec<String> {
        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| name != &self.version_tag)
            .collect();

        for name in &stale {
            if storage.delete(name) {
                tracing::debug!(store = %name, "deleted stale cache");
            }
        }
        stale
    }

    /// Serve a request cache-first, falling back to the network and storing
    /// successful same-origin responses on the way.
    pub fn handle_fetch<S, N>(&self, storage: &mut S, network: &N, request: &Request) -> FetchOutcome
    where
        S: CacheStorage,
        N: Network,
    {
        if !request.is_get() {
            return FetchOutcome::Passthrough;
        }

        if let Some(cached) = storage.match_any(&request.path) {
            tracing::trace!(path = %request.path, "cache hit");
            return FetchOutcome::Cached(cached);
        }

        match network.fetch(request) {
            Ok(response) => {
                if response.is_cacheable() {
                    storage.open(&self.version_tag);
                    if let Err(e) = storage.put(&self.version_tag, &request.path, response.clone())
                    {
                        tracing::warn!(path = %request.path, "failed to cache response: {}", e);
                    }
                }
                FetchOutcome::Network(response)
            }
            Err(e) => {
                tracing::debug!(path = %request.path, "network fetch failed: {}", e);
                if request.destination == RequestDestination::Document
                    && let Some(fallback) = storage.match_any(OFFLINE_FALLBACK_PATH)
                {
                    return FetchOutcome::Fallback(fallback);
                }
                FetchOutcome::Unavailable(e)
            }
        }
    }
}
