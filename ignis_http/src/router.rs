//! The router contract (spec.md §4.10): `find(method, path) → (handler,
//! binding) | no-endpoint`, plus an overridable `not_found`. Continues
//! `selenia_http::router::Router`'s segment-matching approach, generalized
//! to add method filtering and named-parameter regex via the `regex`
//! crate (the teacher's router has no regex support to continue, so this
//! is an ambient enrichment from the rest of the pack).

use std::collections::HashMap;

use regex::Regex;

use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid path pattern")]
pub struct PatternError;

enum Segment {
    Literal(String),
    Param { name: String, pattern: Option<Regex> },
    Wildcard(String),
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Segment::Literal(s) => write!(f, "Literal({s})"),
            Segment::Param { name, pattern } => write!(f, "Param({name}, has_regex={})", pattern.is_some()),
            Segment::Wildcard(name) => write!(f, "Wildcard({name})"),
        }
    }
}

/// A compiled `{name}` / `{name:regex}` / literal / `*rest` path pattern.
/// A trailing slash is always optional.
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim_start_matches('/').trim_end_matches('/');
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            for raw in trimmed.split('/') {
                if let Some(name) = raw.strip_prefix('*') {
                    segments.push(Segment::Wildcard(name.to_string()));
                    break;
                } else if raw.starts_with('{') && raw.ends_with('}') {
                    let inner = &raw[1..raw.len() - 1];
                    let (name, pattern) = match inner.split_once(':') {
                        Some((name, regex_src)) => {
                            let re = Regex::new(&format!("^(?:{regex_src})$")).map_err(|_| PatternError)?;
                            (name.to_string(), Some(re))
                        }
                        None => (inner.to_string(), None),
                    };
                    segments.push(Segment::Param { name, pattern });
                } else {
                    segments.push(Segment::Literal(raw.to_string()));
                }
            }
        }
        Ok(PathPattern { segments })
    }

    fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() { Vec::new() } else { trimmed.split('/').collect() };
        let mut bindings = HashMap::new();
        let mut i = 0;
        for seg in &self.segments {
            match seg {
                Segment::Wildcard(name) => {
                    bindings.insert(name.clone(), parts[i..].join("/"));
                    return Some(bindings);
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                    i += 1;
                }
                Segment::Param { name, pattern } => {
                    let value = *parts.get(i)?;
                    if let Some(re) = pattern {
                        if !re.is_match(value) {
                            return None;
                        }
                    }
                    bindings.insert(name.clone(), value.to_string());
                    i += 1;
                }
            }
        }
        if i == parts.len() {
            Some(bindings)
        } else {
            None
        }
    }
}

struct Endpoint<H> {
    methods: u16,
    pattern: PathPattern,
    handler: H,
    asynchronous: bool,
}

pub type Binding = HashMap<String, String>;

pub struct Router<H> {
    endpoints: Vec<Endpoint<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Router { endpoints: Vec::new() }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&mut self, methods: &[Method], pattern: &str, handler: H) -> Result<(), PatternError> {
        let mut bitset = 0u16;
        for m in methods {
            bitset |= m.bit();
        }
        self.endpoints.push(Endpoint { methods: bitset, pattern: PathPattern::parse(pattern)?, handler, asynchronous: false });
        Ok(())
    }

    /// Like [`Router::route`] but marks the endpoint `asynchronous` (spec.md
    /// §4.9): the runtime spawns a dedicated thread for it instead of using
    /// the bounded worker pool.
    pub fn route_async(&mut self, methods: &[Method], pattern: &str, handler: H) -> Result<(), PatternError> {
        let mut bitset = 0u16;
        for m in methods {
            bitset |= m.bit();
        }
        self.endpoints.push(Endpoint { methods: bitset, pattern: PathPattern::parse(pattern)?, handler, asynchronous: true });
        Ok(())
    }

    /// `find(method, path) → (handler, binding) | no-endpoint`. First
    /// registered match wins.
    pub fn find(&self, method: Method, path: &str) -> Option<(&H, Binding, bool)> {
        for endpoint in &self.endpoints {
            if endpoint.methods & method.bit() == 0 {
                continue;
            }
            if let Some(binding) = endpoint.pattern.matches(path) {
                return Some((&endpoint.handler, binding, endpoint.asynchronous));
            }
        }
        None
    }

    /// The default not-found response; callers needing a custom body can
    /// ignore this and build their own from `Disposition`.
    pub fn not_found(&self, _request: &Request) -> Response {
        Response::once(404, vec![("Content-Length".to_string(), "9".to_string())], b"not found".to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_path() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/health", "health-handler").unwrap();
        let (h, binding, _) = router.find(Method::Get, "/health").unwrap();
        assert_eq!(*h, "health-handler");
        assert!(binding.is_empty());
    }

    #[test]
    fn trailing_slash_is_optional() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/health", "h").unwrap();
        assert!(router.find(Method::Get, "/health/").is_some());
    }

    #[test]
    fn named_parameter_is_bound() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/users/{id}", "user").unwrap();
        let (_, binding, _) = router.find(Method::Get, "/users/42").unwrap();
        assert_eq!(binding.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn per_parameter_regex_constrains_the_match() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/users/{id:[0-9]+}", "user").unwrap();
        assert!(router.find(Method::Get, "/users/abc").is_none());
        assert!(router.find(Method::Get, "/users/42").is_some());
    }

    #[test]
    fn method_mismatch_is_no_endpoint() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/health", "h").unwrap();
        assert!(router.find(Method::Post, "/health").is_none());
    }

    #[test]
    fn wildcard_consumes_remaining_segments() {
        let mut router: Router<&'static str> = Router::new();
        router.route(&[Method::Get], "/static/*rest", "files").unwrap();
        let (_, binding, _) = router.find(Method::Get, "/static/css/app.css").unwrap();
        assert_eq!(binding.get("rest"), Some(&"css/app.css".to_string()));
    }
}
