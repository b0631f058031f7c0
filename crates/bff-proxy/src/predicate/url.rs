//! URL matcher over scheme, host, path, query and fragment.

use super::path_pattern::PathPattern;
use super::Condition;
use crate::context::ContextStore;
use crate::proxy::{ProxyRequest, ProxyResponse};
use hyper::header::HOST;
use hyper::{HeaderMap, Uri};

/// Host pattern, either exact or a leading `*.` wildcard. Case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    Suffix(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        match lower.strip_prefix("*.") {
            Some(rest) => HostPattern::Suffix(format!(".{rest}")),
            None => HostPattern::Exact(lower),
        }
    }

    /// `authority` is `host[:port]`; a pattern without a port ignores the port.
    fn matches(&self, authority: &str) -> bool {
        let authority = authority.to_ascii_lowercase();
        let pattern = match self {
            HostPattern::Exact(p) | HostPattern::Suffix(p) => p,
        };
        let candidate = if pattern.contains(':') {
            authority.as_str()
        } else {
            strip_port(&authority)
        };

        match self {
            HostPattern::Exact(p) => candidate == p,
            HostPattern::Suffix(suffix) => {
                candidate.len() > suffix.len() && candidate.ends_with(suffix.as_str())
            }
        }
    }
}

fn strip_port(authority: &str) -> &str {
    // bracketed IPv6 literals keep their colons
    if let Some(end) = authority.find(']') {
        return &authority[..=end];
    }
    authority
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(authority)
}

/// Matches request URLs; all configured parts must match.
///
/// A successful path match binds its parameters into the context. Bindings are
/// committed only once every other part matched as well.
///
/// `http::Uri` drops fragments while parsing, so a matcher configured with a
/// fragment never matches.
#[derive(Debug, Clone, Default)]
pub struct UrlMatcher {
    scheme: Option<String>,
    host: Option<HostPattern>,
    path: Option<PathPattern>,
    query: Option<String>,
    fragment: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl UrlMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = non_empty(&scheme.to_ascii_lowercase());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = non_empty(host).map(|h| HostPattern::parse(&h));
        self
    }

    pub fn path(mut self, pattern: PathPattern) -> Self {
        self.path = (!pattern.as_str().is_empty()).then_some(pattern);
        self
    }

    pub fn query(mut self, query: &str) -> Self {
        self.query = non_empty(query.trim_start_matches('?'));
        self
    }

    pub fn fragment(mut self, fragment: &str) -> Self {
        self.fragment = non_empty(fragment.trim_start_matches('#'));
        self
    }

    /// Evaluate against a URI, binding path parameters on a full match.
    pub fn matches(&self, uri: &Uri, headers: &HeaderMap, ctx: &mut dyn ContextStore) -> bool {
        if let Some(scheme) = &self.scheme {
            if !uri
                .scheme_str()
                .is_some_and(|s| s.eq_ignore_ascii_case(scheme))
            {
                return false;
            }
        }

        if let Some(host) = &self.host {
            let authority = uri
                .authority()
                .map(|a| a.as_str())
                .or_else(|| headers.get(HOST).and_then(|v| v.to_str().ok()));
            if !authority.is_some_and(|a| host.matches(a)) {
                return false;
            }
        }

        if let Some(query) = &self.query {
            if uri.query() != Some(query.as_str()) {
                return false;
            }
        }

        if self.fragment.is_some() {
            return false;
        }

        match &self.path {
            Some(pattern) => pattern.match_into(uri.path(), ctx),
            None => true,
        }
    }
}

impl Condition for UrlMatcher {
    fn match_request(&self, req: &ProxyRequest, ctx: &mut dyn ContextStore) -> bool {
        self.matches(req.uri(), req.headers(), ctx)
    }

    fn match_response(&self, res: &ProxyResponse, ctx: &mut dyn ContextStore) -> bool {
        let request = res.request();
        self.matches(&request.uri, &request.headers, ctx)
    }
}
