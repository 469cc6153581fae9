//! Requests and responses as the cache sees them.

use url::Url;

/// Why the resource is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    Cors,
    NoCors,
}

/// What the resource will be used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl Request {
    /// A same-origin GET.
    pub fn get(url: Url) -> Self {
        Request {
            method: "GET".to_string(),
            url,
            mode: RequestMode::SameOrigin,
            destination: Destination::Other,
        }
    }

    pub fn navigate(url: Url) -> Self {
        Request {
            mode: RequestMode::Navigate,
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn image(url: Url) -> Self {
        Request {
            destination: Destination::Image,
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Storage key: the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// Where a response came from, as far as the page is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Same-origin; fully readable.
    Basic,
    Cors,
    Opaque,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub kind: ResponseKind,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status: 200,
            kind: ResponseKind::Basic,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    /// The `503` answer for a resource that is neither cached nor reachable.
    pub fn offline_unavailable() -> Self {
        Response {
            status: 503,
            kind: ResponseKind::Basic,
            content_type: Some("text/plain".to_string()),
            body: b"Content not available offline".to_vec(),
        }
    }

    /// Only complete same-origin answers are stored.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}
