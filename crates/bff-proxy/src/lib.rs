//! Backend-for-frontend proxy core.
//!
//! Request and response modifiers that plug into a host proxy runtime:
//! conditional filters, JSON body patching, concurrent resource fan-out and
//! an error boundary that turns failures into a JSON error document.
//!
//! # Module Structure
//!
//! - `body` - JSON Pointer, JSON Patch, Merge Patch and the body patch modifiers
//! - `boundary` - Outermost error boundary
//! - `config` - Declarative pipeline configuration and its builder
//! - `context` - Per-request key/value store and placeholder resolution
//! - `error` - Modifier error types
//! - `fetch` - Auxiliary resource fetchers
//! - `filter` - Conditional dispatch on a [`predicate::Condition`]
//! - `modifier` - Modifier contracts, FIFO groups and logging
//! - `predicate` - Path patterns, URL and status matchers
//! - `proxy` - Message types and the upstream client
//! - `querystring` - Query string modifiers
//! - `verify` - Status verification

pub mod body;
pub mod boundary;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod modifier;
pub mod predicate;
pub mod proxy;
pub mod querystring;
pub mod verify;

pub use boundary::ErrorBoundary;
pub use config::{Builder, ConfigError, ModifierConfig, PipelineConfig};
pub use context::{ContextStore, RequestContext};
pub use error::{ModifierError, MultiError};
pub use modifier::{RequestModifier, RequestVerifier, ResponseModifier, ResponseVerifier, Stage};
pub use proxy::{HttpUpstream, ProxyRequest, ProxyResponse, RequestInfo, UpstreamClient};
