//! Per-request key/value context.
//!
//! The host runtime owns one context per request/response cycle and passes it
//! explicitly into every modifier call. Path parameters captured by a
//! [`PathPattern`](crate::predicate::PathPattern) are stored here so that later
//! stages of the same cycle can resolve `:name` placeholders.
//!
//! Verification failures are recorded here too, keyed by [`VerifierId`], so a
//! verifier shared by concurrent requests only ever sees its own cycle's
//! failures.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Namespace under which path parameters are stored.
pub const PARAM_NAMESPACE: &str = "url.param";

/// Set when a request-phase modifier answered the request itself.
pub const SKIP_ROUND_TRIP: &str = "proxy.skip_round_trip";

/// Set to keep the cycle out of the request/response log.
pub const SKIP_LOGGING: &str = "proxy.skip_logging";

/// Identity of one verifier instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerifierId(u64);

impl VerifierId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Key/value capability scoped to a single request/response cycle.
pub trait ContextStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: String);

    /// All entries currently held, in no particular order.
    fn entries(&self) -> Vec<(String, String)>;

    /// Record a verification failure for this cycle.
    fn record_failure(&mut self, verifier: VerifierId, message: String);

    /// Failures recorded by `verifier` in this cycle, oldest first.
    fn failures(&self, verifier: VerifierId) -> Vec<String>;

    fn clear_failures(&mut self, verifier: VerifierId);
}

/// Tell the host to answer from the response phase without an upstream call.
pub fn skip_round_trip(ctx: &mut dyn ContextStore) {
    ctx.set(SKIP_ROUND_TRIP, "true".to_string());
}

pub fn round_trip_skipped(ctx: &dyn ContextStore) -> bool {
    ctx.get(SKIP_ROUND_TRIP).as_deref() == Some("true")
}

pub fn skip_logging(ctx: &mut dyn ContextStore) {
    ctx.set(SKIP_LOGGING, "true".to_string());
}

pub fn logging_skipped(ctx: &dyn ContextStore) -> bool {
    ctx.get(SKIP_LOGGING).as_deref() == Some("true")
}

/// Context key for a path parameter name.
pub fn param_key(name: &str) -> String {
    format!("{PARAM_NAMESPACE}.{name}")
}

/// Look up a bound path parameter.
pub fn param(ctx: &dyn ContextStore, name: &str) -> Option<String> {
    ctx.get(&param_key(name))
}

static WHOLE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:([0-9A-Za-z_]+)$").expect("placeholder regex is valid"));

static INLINE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":([0-9A-Za-z_]+)").expect("placeholder regex is valid"));

/// Resolve a value of the exact form `:name` to its bound parameter.
///
/// Anything else, including an unbound placeholder, is returned unchanged.
pub fn resolve_placeholder(value: &str, ctx: &dyn ContextStore) -> String {
    WHOLE_PLACEHOLDER
        .captures(value)
        .and_then(|caps| param(ctx, &caps[1]))
        .unwrap_or_else(|| value.to_string())
}

/// Whether `value` is a whole-value placeholder such as `:id`.
pub fn is_placeholder(value: &str) -> bool {
    WHOLE_PLACEHOLDER.is_match(value)
}

/// Replace every bound `:name` token inside `template`.
pub fn expand_placeholders(template: &str, ctx: &dyn ContextStore) -> String {
    INLINE_PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            param(ctx, &caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// In-memory context used by the host and by fetch tasks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    values: HashMap<String, String>,
    failures: HashMap<VerifierId, Vec<String>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent copy of another store's entries.
    ///
    /// Verification failures are not copied; the snapshot starts clean.
    pub fn snapshot(store: &dyn ContextStore) -> Self {
        Self {
            values: store.entries().into_iter().collect(),
            failures: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ContextStore for RequestContext {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn record_failure(&mut self, verifier: VerifierId, message: String) {
        self.failures.entry(verifier).or_default().push(message);
    }

    fn failures(&self, verifier: VerifierId) -> Vec<String> {
        self.failures.get(&verifier).cloned().unwrap_or_default()
    }

    fn clear_failures(&mut self, verifier: VerifierId) {
        self.failures.remove(&verifier);
    }
}
