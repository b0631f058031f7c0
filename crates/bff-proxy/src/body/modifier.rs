//! Body patch modifiers.

use super::map_patch::apply_to_array_at;
use super::patch::{ApplyOptions, Operation, Patch};
use super::PatchError;
use crate::context::{is_placeholder, resolve_placeholder, ContextStore};
use crate::error::ModifierError;
use crate::modifier::{RequestModifier, ResponseModifier, Stage};
use crate::proxy::{ProxyRequest, ProxyResponse, ReplaceBody};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

fn has_placeholders(value: &Value) -> bool {
    match value {
        Value::String(s) => is_placeholder(s),
        Value::Array(items) => items.iter().any(has_placeholders),
        Value::Object(map) => map.values().any(has_placeholders),
        _ => false,
    }
}

fn resolve_placeholders(value: &Value, ctx: &dyn ContextStore) -> Value {
    match value {
        Value::String(s) if is_placeholder(s) => Value::String(resolve_placeholder(s, ctx)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_placeholders(item, ctx))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_placeholders(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A patch whose `":name"` string values are bound per request.
#[derive(Debug, Clone)]
struct BoundPatch {
    patch: Patch,
    placeholders: bool,
}

impl BoundPatch {
    fn new(patch: Patch) -> Self {
        let placeholders = patch.operations().iter().any(|op| match op {
            Operation::Add { value, .. }
            | Operation::Replace { value, .. }
            | Operation::Test { value, .. } => has_placeholders(value),
            _ => false,
        });
        Self {
            patch,
            placeholders,
        }
    }

    fn bind(&self, ctx: &dyn ContextStore) -> Cow<'_, Patch> {
        if !self.placeholders {
            return Cow::Borrowed(&self.patch);
        }
        Cow::Owned(self.patch.map_values(|v| resolve_placeholders(v, ctx)))
    }
}

/// Applies a JSON Patch to request and response bodies.
#[derive(Debug, Clone)]
pub struct JsonPatchModifier {
    patch: BoundPatch,
    options: ApplyOptions,
}

impl JsonPatchModifier {
    pub fn new(patch: Patch, options: ApplyOptions) -> Self {
        debug!("body.JSONPatch.New: {} operations", patch.operations().len());
        Self {
            patch: BoundPatch::new(patch),
            options,
        }
    }

    pub fn into_stage(self) -> Stage {
        let modifier = Arc::new(self);
        Stage::new()
            .with_request(modifier.clone())
            .with_response(modifier)
    }

    fn patch_body(&self, body: &[u8], ctx: &dyn ContextStore) -> Result<Bytes, PatchError> {
        let patch = self.patch.bind(ctx);
        patch.apply(body, &self.options).map(Bytes::from)
    }
}

#[async_trait]
impl RequestModifier for JsonPatchModifier {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!("body.JSONPatch.ModifyRequest: request: {}", req.uri());

        let modified = self.patch_body(req.body(), ctx)?;
        req.replace_body(modified);
        Ok(())
    }
}

#[async_trait]
impl ResponseModifier for JsonPatchModifier {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!(
            "body.JSONPatch.ModifyResponse: request: {}",
            res.request().uri
        );

        let modified = self.patch_body(res.body(), ctx)?;
        res.replace_body(modified);
        Ok(())
    }
}

/// Applies a JSON Patch to every element of an array inside the body.
#[derive(Debug, Clone)]
pub struct JsonMapPatchModifier {
    patch: BoundPatch,
    options: ApplyOptions,
    path: String,
}

impl JsonMapPatchModifier {
    pub fn new(patch: Patch, options: ApplyOptions, path: impl Into<String>) -> Self {
        let path = path.into();
        debug!(
            "body.JSONMapPatch.New: {} operations at {:?}",
            patch.operations().len(),
            path
        );
        Self {
            patch: BoundPatch::new(patch),
            options,
            path,
        }
    }

    pub fn into_stage(self) -> Stage {
        let modifier = Arc::new(self);
        Stage::new()
            .with_request(modifier.clone())
            .with_response(modifier)
    }

    fn patch_body(&self, body: &[u8], ctx: &dyn ContextStore) -> Result<Bytes, PatchError> {
        let doc: Value = serde_json::from_slice(body).map_err(PatchError::InvalidDocument)?;
        let patch = self.patch.bind(ctx);
        let patched = apply_to_array_at(&doc, &self.path, &patch, &self.options)?;
        serde_json::to_vec(&patched)
            .map(Bytes::from)
            .map_err(PatchError::InvalidDocument)
    }
}

#[async_trait]
impl RequestModifier for JsonMapPatchModifier {
    async fn modify_request(
        &self,
        req: &mut ProxyRequest,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!("body.JSONMapPatch.ModifyRequest: request: {}", req.uri());

        let modified = self.patch_body(req.body(), ctx)?;
        req.replace_body(modified);
        Ok(())
    }
}

#[async_trait]
impl ResponseModifier for JsonMapPatchModifier {
    async fn modify_response(
        &self,
        res: &mut ProxyResponse,
        ctx: &mut dyn ContextStore,
    ) -> Result<(), ModifierError> {
        debug!(
            "body.JSONMapPatch.ModifyResponse: request: {}",
            res.request().uri
        );

        let modified = self.patch_body(res.body(), ctx)?;
        res.replace_body(modified);
        Ok(())
    }
}
